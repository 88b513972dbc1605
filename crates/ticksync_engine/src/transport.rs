//! Central node abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use ticksync_protocol::{
    ChangeDirection, ChangeRecord, InitiatePullRequest, MarkErroredRequest, PullMetadata,
    PullRequest, PullResponse, PushAck, PushRequest, QueueStatus, SessionId, SessionRequest,
    StartSessionRequest, StartSessionResponse,
};

/// The central node's RPC surface as seen by a facility.
///
/// Every call after [`CentralServer::start_sync_session`] names the session
/// it belongs to. Implementations cover HTTP, in-process servers and mocks.
pub trait CentralServer: Send + Sync {
    /// Opens a session, or reports why none was opened.
    fn start_sync_session(&self, request: &StartSessionRequest) -> SyncResult<StartSessionResponse>;

    /// Prepares the incoming change set and reports its size.
    fn initiate_pull(&self, request: &InitiatePullRequest) -> SyncResult<PullMetadata>;

    /// Fetches one page of incoming changes.
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse>;

    /// Sends one batch of outgoing changes.
    fn push(&self, request: &PushRequest) -> SyncResult<PushAck>;

    /// Signals that every outgoing batch was sent.
    fn complete_push(&self, request: &SessionRequest) -> SyncResult<()>;

    /// Closes a session that finished.
    fn end_sync_session(&self, request: &SessionRequest) -> SyncResult<()>;

    /// Reports that the facility abandoned a session.
    fn mark_session_errored(&self, request: &MarkErroredRequest) -> SyncResult<()>;
}

/// A call on the central surface, as recorded by [`MockCentral`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CentralCall {
    /// `start_sync_session`.
    StartSyncSession,
    /// `initiate_pull`.
    InitiatePull,
    /// `pull`.
    Pull,
    /// `push`.
    Push,
    /// `complete_push`.
    CompletePush,
    /// `end_sync_session`.
    EndSyncSession,
    /// `mark_session_errored`.
    MarkSessionErrored,
}

type Hook = Box<dyn FnMut() + Send>;

/// A scripted central node for testing.
pub struct MockCentral {
    connected: AtomicBool,
    tick: AtomicI64,
    last_started_tick: AtomicI64,
    sessions: AtomicU64,
    calls: Mutex<Vec<CentralCall>>,
    failing: Mutex<HashSet<CentralCall>>,
    queue_status: Mutex<Option<QueueStatus>>,
    incoming: Mutex<Vec<ChangeRecord>>,
    pushed: Mutex<Vec<ChangeRecord>>,
    errored: Mutex<Vec<(SessionId, String)>>,
    start_gate: Mutex<Option<Receiver<()>>>,
    on_initiate_pull: Mutex<Option<Hook>>,
}

impl MockCentral {
    /// Creates a connected mock whose clock starts at tick 10.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            tick: AtomicI64::new(10),
            last_started_tick: AtomicI64::new(10),
            sessions: AtomicU64::new(0),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            queue_status: Mutex::new(None),
            incoming: Mutex::new(Vec::new()),
            pushed: Mutex::new(Vec::new()),
            errored: Mutex::new(Vec::new()),
            start_gate: Mutex::new(None),
            on_initiate_pull: Mutex::new(None),
        }
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Sets the tick the next session starts at.
    pub fn set_tick(&self, tick: i64) {
        self.tick.store(tick, Ordering::SeqCst);
    }

    /// Makes every later `call` fail with a retryable transport error.
    pub fn fail_on(&self, call: CentralCall) {
        self.failing.lock().insert(call);
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    /// Answers session starts with `Queued` until cleared with `None`.
    pub fn set_queue_status(&self, status: Option<QueueStatus>) {
        *self.queue_status.lock() = status;
    }

    /// Sets the records served by pulls.
    pub fn set_incoming(&self, records: Vec<ChangeRecord>) {
        *self.incoming.lock() = records;
    }

    /// Blocks each session start until a message arrives on `gate`, or the
    /// sender is dropped.
    pub fn gate_session_starts(&self, gate: Receiver<()>) {
        *self.start_gate.lock() = Some(gate);
    }

    /// Runs `hook` at the start of every `initiate_pull`.
    pub fn on_initiate_pull(&self, hook: impl FnMut() + Send + 'static) {
        *self.on_initiate_pull.lock() = Some(Box::new(hook));
    }

    /// Calls received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<CentralCall> {
        self.calls.lock().clone()
    }

    /// Number of times `call` was received.
    #[must_use]
    pub fn call_count(&self, call: CentralCall) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }

    /// Every record pushed so far.
    #[must_use]
    pub fn pushed(&self) -> Vec<ChangeRecord> {
        self.pushed.lock().clone()
    }

    /// Sessions reported as errored, with their messages.
    #[must_use]
    pub fn errored_sessions(&self) -> Vec<(SessionId, String)> {
        self.errored.lock().clone()
    }

    fn enter(&self, call: CentralCall) -> SyncResult<()> {
        self.calls.lock().push(call);
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("not connected"));
        }
        if self.failing.lock().contains(&call) {
            return Err(SyncError::transport_retryable(format!(
                "injected failure on {call:?}"
            )));
        }
        Ok(())
    }
}

impl Default for MockCentral {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockCentral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockCentral")
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .field("tick", &self.tick.load(Ordering::SeqCst))
            .field("calls", &self.calls.lock().len())
            .finish_non_exhaustive()
    }
}

impl CentralServer for MockCentral {
    fn start_sync_session(&self, _request: &StartSessionRequest) -> SyncResult<StartSessionResponse> {
        if let Some(gate) = self.start_gate.lock().as_ref() {
            let _ = gate.recv();
        }
        self.enter(CentralCall::StartSyncSession)?;
        if let Some(status) = *self.queue_status.lock() {
            return Ok(StartSessionResponse::Queued { status });
        }
        let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at_tick = self.tick.fetch_add(2, Ordering::SeqCst);
        self.last_started_tick.store(started_at_tick, Ordering::SeqCst);
        Ok(StartSessionResponse::Started {
            session_id: SessionId::new(format!("mock-session-{n}")),
            started_at_tick,
        })
    }

    fn initiate_pull(&self, _request: &InitiatePullRequest) -> SyncResult<PullMetadata> {
        if let Some(hook) = self.on_initiate_pull.lock().as_mut() {
            hook();
        }
        self.enter(CentralCall::InitiatePull)?;
        Ok(PullMetadata {
            total_to_pull: self.incoming.lock().len() as u64,
            pull_until: self.last_started_tick.load(Ordering::SeqCst),
        })
    }

    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.enter(CentralCall::Pull)?;
        let records = self
            .incoming
            .lock()
            .iter()
            .skip(usize::try_from(request.offset).unwrap_or(usize::MAX))
            .take(request.limit as usize)
            .cloned()
            .map(|r| r.with_direction(ChangeDirection::Incoming))
            .collect();
        Ok(PullResponse { records })
    }

    fn push(&self, request: &PushRequest) -> SyncResult<PushAck> {
        self.enter(CentralCall::Push)?;
        self.pushed.lock().extend(request.records.iter().cloned());
        Ok(PushAck {
            accepted: request.records.len() as u64,
        })
    }

    fn complete_push(&self, _request: &SessionRequest) -> SyncResult<()> {
        self.enter(CentralCall::CompletePush)
    }

    fn end_sync_session(&self, _request: &SessionRequest) -> SyncResult<()> {
        self.enter(CentralCall::EndSyncSession)
    }

    fn mark_session_errored(&self, request: &MarkErroredRequest) -> SyncResult<()> {
        self.enter(CentralCall::MarkSessionErrored)?;
        self.errored
            .lock()
            .push((request.session_id.clone(), request.message.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticksync_protocol::PROTOCOL_VERSION;

    fn start(central: &MockCentral) -> StartSessionResponse {
        central
            .start_sync_session(&StartSessionRequest {
                device_id: "facility-test".into(),
                protocol_version: PROTOCOL_VERSION,
            })
            .unwrap()
    }

    #[test]
    fn mock_central_connection() {
        let central = MockCentral::new();
        central.set_connected(false);
        let err = central
            .end_sync_session(&SessionRequest {
                session_id: SessionId::new("s"),
            })
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(central.calls(), vec![CentralCall::EndSyncSession]);
    }

    #[test]
    fn sessions_advance_the_clock() {
        let central = MockCentral::new();
        central.set_tick(40);
        match start(&central) {
            StartSessionResponse::Started {
                session_id,
                started_at_tick,
            } => {
                assert_eq!(session_id.as_str(), "mock-session-1");
                assert_eq!(started_at_tick, 40);
            }
            other => panic!("unexpected response: {other:?}"),
        }
        assert!(matches!(
            start(&central),
            StartSessionResponse::Started { started_at_tick: 42, .. }
        ));

        central.set_queue_status(Some(QueueStatus::WaitingInQueue));
        assert!(matches!(start(&central), StartSessionResponse::Queued { .. }));
    }

    #[test]
    fn pull_pages_by_offset() {
        let central = MockCentral::new();
        central.set_incoming(
            (0..5)
                .map(|i| ChangeRecord::deleted(ChangeDirection::Outgoing, "t", format!("r{i}")))
                .collect(),
        );
        let page = central
            .pull(&PullRequest {
                session_id: SessionId::new("s"),
                offset: 3,
                limit: 10,
            })
            .unwrap();
        assert_eq!(page.records.len(), 2);
        assert!(page
            .records
            .iter()
            .all(|r| r.direction == ChangeDirection::Incoming));
    }

    #[test]
    fn injected_failures() {
        let central = MockCentral::new();
        central.fail_on(CentralCall::Push);
        let request = PushRequest {
            session_id: SessionId::new("s"),
            records: Vec::new(),
        };
        assert!(central.push(&request).is_err());
        central.clear_failures();
        assert_eq!(central.push(&request).unwrap().accepted, 0);
        assert_eq!(central.call_count(CentralCall::Push), 2);
    }
}
