//! Request handlers for sync endpoints.

use crate::config::CentralConfig;
use crate::error::{CentralError, CentralResult};
use crate::records::{CentralRecords, PullSnapshot};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use ticksync_protocol::{
    Ack, ChangeRecord, InitiatePullRequest, MarkErroredRequest, PullMetadata, PullRequest,
    PullResponse, PushAck, PushRequest, QueueStatus, SessionId, SessionRequest,
    StartSessionRequest, StartSessionResponse, PROTOCOL_VERSION,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle of a sync session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Open; accepts calls.
    Active,
    /// Ended by the facility.
    Completed,
    /// Abandoned, with the reason.
    Errored(String),
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Active => f.write_str("active"),
            SessionStatus::Completed => f.write_str("completed"),
            SessionStatus::Errored(message) => write!(f, "errored ({message})"),
        }
    }
}

#[derive(Debug)]
struct Session {
    device_id: String,
    started_at_tick: i64,
    last_activity: Instant,
    status: SessionStatus,
    pending_push: Vec<ChangeRecord>,
    pull: Option<PullSnapshot>,
}

impl Session {
    fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// Context for request handling.
pub struct HandlerContext {
    /// Central configuration.
    pub config: CentralConfig,
    /// Record store (shared across all handlers).
    pub records: Arc<CentralRecords>,
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: CentralConfig, records: Arc<CentralRecords>) -> Self {
        Self {
            config,
            records,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the number of active sessions.
    pub fn active_sessions(&self) -> usize {
        self.sessions.read().values().filter(|s| s.is_active()).count()
    }

    /// Returns the status of a session.
    pub fn session_status(&self, session_id: &SessionId) -> Option<SessionStatus> {
        self.sessions.read().get(session_id).map(|s| s.status.clone())
    }

    /// Returns the tick a session started at.
    pub fn session_start_tick(&self, session_id: &SessionId) -> Option<i64> {
        self.sessions.read().get(session_id).map(|s| s.started_at_tick)
    }

    /// Runs `f` against an active session and refreshes its activity time.
    fn with_active_session<T>(
        &self,
        session_id: &SessionId,
        f: impl FnOnce(&mut Session) -> CentralResult<T>,
    ) -> CentralResult<T> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| CentralError::UnknownSession(session_id.to_string()))?;
        if !session.is_active() {
            return Err(CentralError::SessionNotActive {
                session_id: session_id.to_string(),
                status: session.status.to_string(),
            });
        }
        session.last_activity = Instant::now();
        f(session)
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Opens a session, or reports why the device has to wait.
    pub fn handle_start_session(
        &self,
        request: StartSessionRequest,
    ) -> CentralResult<StartSessionResponse> {
        if request.protocol_version != PROTOCOL_VERSION {
            return Err(CentralError::ProtocolMismatch(format!(
                "device speaks {}, central speaks {}",
                request.protocol_version, PROTOCOL_VERSION
            )));
        }
        if request.device_id.is_empty() {
            return Err(CentralError::InvalidRequest("empty device id".into()));
        }

        let mut sessions = self.context.sessions.write();
        let timeout = self.context.config.session_timeout;
        for (id, session) in sessions.iter_mut() {
            if session.is_active()
                && session.device_id == request.device_id
                && session.last_activity.elapsed() >= timeout
            {
                warn!(session_id = %id, device_id = %session.device_id, "session timed out");
                session.status = SessionStatus::Errored("timed out".into());
                session.pending_push.clear();
                session.pull = None;
            }
        }

        if sessions
            .values()
            .any(|s| s.is_active() && s.device_id == request.device_id)
        {
            debug!(device_id = %request.device_id, "device already syncing");
            return Ok(StartSessionResponse::Queued {
                status: QueueStatus::ActiveSync,
            });
        }
        let active = sessions.values().filter(|s| s.is_active()).count();
        if active >= self.context.config.max_concurrent_sessions {
            debug!(device_id = %request.device_id, active, "session limit reached");
            return Ok(StartSessionResponse::Queued {
                status: QueueStatus::WaitingInQueue,
            });
        }

        let session_id = SessionId::new(Uuid::new_v4().to_string());
        let started_at_tick = self.context.records.tick_tock().tick;
        sessions.insert(
            session_id.clone(),
            Session {
                device_id: request.device_id.clone(),
                started_at_tick,
                last_activity: Instant::now(),
                status: SessionStatus::Active,
                pending_push: Vec::new(),
                pull: None,
            },
        );
        info!(
            session_id = %session_id,
            device_id = %request.device_id,
            started_at_tick,
            "sync session started"
        );
        Ok(StartSessionResponse::Started {
            session_id,
            started_at_tick,
        })
    }

    /// Freezes the set of records the session will pull.
    pub fn handle_initiate_pull(&self, request: InitiatePullRequest) -> CentralResult<PullMetadata> {
        // Validate first so an unknown session does not bump the clock.
        self.context.with_active_session(&request.session_id, |_| Ok(()))?;

        let snapshot = self
            .context
            .records
            .snapshot_since(request.since, Some(&request.session_id));
        let metadata = PullMetadata {
            total_to_pull: snapshot.records.len() as u64,
            pull_until: snapshot.pull_until,
        };
        self.context
            .with_active_session(&request.session_id, |session| {
                session.pull = Some(snapshot);
                Ok(())
            })?;

        debug!(
            session_id = %request.session_id,
            since = request.since,
            pull_until = metadata.pull_until,
            total = metadata.total_to_pull,
            "pull initiated"
        );
        Ok(metadata)
    }

    /// Returns one page of the frozen pull set.
    pub fn handle_pull(&self, request: PullRequest) -> CentralResult<PullResponse> {
        let limit = request.limit.min(self.context.config.max_pull_batch) as usize;
        self.context
            .with_active_session(&request.session_id, |session| {
                let snapshot = session.pull.as_ref().ok_or_else(|| {
                    CentralError::PullNotInitiated(request.session_id.to_string())
                })?;
                let records = usize::try_from(request.offset)
                    .ok()
                    .and_then(|offset| snapshot.records.get(offset..))
                    .unwrap_or_default()
                    .iter()
                    .take(limit)
                    .cloned()
                    .collect();
                Ok(PullResponse { records })
            })
    }

    /// Buffers pushed records until `complete_push`.
    pub fn handle_push(&self, request: PushRequest) -> CentralResult<PushAck> {
        let max = self.context.config.max_push_batch as usize;
        if request.records.len() > max {
            return Err(CentralError::InvalidRequest(format!(
                "too many records: {} > {}",
                request.records.len(),
                max
            )));
        }
        if let Some(record) = request
            .records
            .iter()
            .find(|r| !r.is_deleted && r.data.is_none())
        {
            return Err(CentralError::InvalidRequest(format!(
                "{}/{} has no data",
                record.record_type, record.record_id
            )));
        }

        let accepted = request.records.len() as u64;
        self.context
            .with_active_session(&request.session_id, |session| {
                session.pending_push.extend(request.records);
                Ok(())
            })?;
        Ok(PushAck { accepted })
    }

    /// Persists everything pushed in the session under one central tick.
    pub fn handle_complete_push(&self, request: SessionRequest) -> CentralResult<Ack> {
        let pending = self
            .context
            .with_active_session(&request.session_id, |session| {
                Ok(std::mem::take(&mut session.pending_push))
            })?;
        let count = pending.len();
        let tick = self
            .context
            .records
            .persist(pending, Some(&request.session_id));
        info!(session_id = %request.session_id, count, tick, "push persisted");
        Ok(Ack {})
    }

    /// Closes a session.
    pub fn handle_end_session(&self, request: SessionRequest) -> CentralResult<Ack> {
        self.context
            .with_active_session(&request.session_id, |session| {
                session.status = SessionStatus::Completed;
                session.pull = None;
                if !session.pending_push.is_empty() {
                    warn!(
                        count = session.pending_push.len(),
                        "session ended with unpersisted pushes"
                    );
                    session.pending_push.clear();
                }
                Ok(())
            })?;
        info!(session_id = %request.session_id, "sync session ended");
        Ok(Ack {})
    }

    /// Abandons a session and discards what it pushed but did not persist.
    pub fn handle_mark_errored(&self, request: MarkErroredRequest) -> CentralResult<Ack> {
        let mut sessions = self.context.sessions.write();
        let session = sessions
            .get_mut(&request.session_id)
            .ok_or_else(|| CentralError::UnknownSession(request.session_id.to_string()))?;
        if session.status == SessionStatus::Completed {
            return Err(CentralError::SessionNotActive {
                session_id: request.session_id.to_string(),
                status: session.status.to_string(),
            });
        }
        warn!(
            session_id = %request.session_id,
            message = %request.message,
            "sync session errored"
        );
        session.status = SessionStatus::Errored(request.message);
        session.pending_push.clear();
        session.pull = None;
        Ok(Ack {})
    }
}
