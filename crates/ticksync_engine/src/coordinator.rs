//! Sync coordinator: single-flight runs of push then pull.
//!
//! ## Run sequence
//!
//! 1. Discard and recreate staging.
//! 2. Open a session with central.
//! 3. Roll the local clock forward: the old `currentTick` becomes the
//!    session-start tick that bounds the push snapshot, and `currentTick`
//!    moves past it (and to at least central's start tick).
//! 4. Push local changes since the push watermark.
//! 5. Pull and apply central's changes since the pull watermark.
//! 6. Close the session.
//!
//! A failure after step 2 reports the session as errored and leaves the
//! watermarks of unfinished phases untouched.

use crate::config::SyncConfig;
use crate::context::SyncContext;
use crate::error::{ErrorCategory, SyncError, SyncResult};
use crate::pull::{pull_changes, PullOutcome};
use crate::push::{push_changes, PushOutcome};
use crate::registry::ModelRegistry;
use crate::staging::StagingSchema;
use crate::state::{CoordinatorState, SyncReport, SyncRunOutcome, SyncStats, TriggerOutcome};
use crate::transport::CentralServer;
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use ticksync_protocol::{
    MarkErroredRequest, SessionId, SessionRequest, StartSessionRequest, StartSessionResponse,
    PROTOCOL_VERSION,
};
use ticksync_store::{Store, Tick, CURRENT_TICK};
use tracing::{debug, error, info, warn};

#[derive(Debug)]
struct RunStatus {
    state: CoordinatorState,
    queued: bool,
}

struct Inner<C: CentralServer> {
    store: Arc<Store>,
    central: Arc<C>,
    registry: ModelRegistry,
    staging: StagingSchema,
    base_config: SyncConfig,
    config: RwLock<SyncConfig>,
    status: Mutex<RunStatus>,
    idle: Condvar,
    stats: RwLock<SyncStats>,
    run_lock: Mutex<()>,
}

struct SessionPhases {
    session_start_tick: Tick,
    push: PushOutcome,
    pull: PullOutcome,
}

/// Drives sync runs against one central node.
///
/// Cloning is cheap; clones share state.
pub struct SyncCoordinator<C: CentralServer + 'static> {
    inner: Arc<Inner<C>>,
}

impl<C: CentralServer + 'static> Clone for SyncCoordinator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: CentralServer + 'static> SyncCoordinator<C> {
    /// Creates a coordinator and makes sure every model has a table.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for out-of-range settings, or a store error
    /// if tables cannot be created.
    pub fn new(
        store: Arc<Store>,
        central: Arc<C>,
        registry: ModelRegistry,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        config.validate()?;
        registry.ensure_tables(&store)?;
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                central,
                registry,
                staging: StagingSchema::new(),
                base_config: config.clone(),
                config: RwLock::new(config),
                status: Mutex::new(RunStatus {
                    state: CoordinatorState::Idle,
                    queued: false,
                }),
                idle: Condvar::new(),
                stats: RwLock::new(SyncStats::default()),
                run_lock: Mutex::new(()),
            }),
        })
    }

    /// Returns the local store.
    pub fn store(&self) -> &Arc<Store> {
        &self.inner.store
    }

    /// Returns the central node.
    pub fn central(&self) -> &Arc<C> {
        &self.inner.central
    }

    /// Returns the model registry.
    pub fn registry(&self) -> &ModelRegistry {
        &self.inner.registry
    }

    /// Returns the effective configuration.
    pub fn config(&self) -> SyncConfig {
        self.inner.config.read().clone()
    }

    /// Replaces the effective configuration until [`restore_config`].
    ///
    /// [`restore_config`]: SyncCoordinator::restore_config
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for out-of-range settings; the current
    /// configuration is kept.
    pub fn override_config(&self, config: SyncConfig) -> SyncResult<()> {
        config.validate()?;
        *self.inner.config.write() = config;
        Ok(())
    }

    /// Goes back to the configuration given at construction.
    pub fn restore_config(&self) {
        *self.inner.config.write() = self.inner.base_config.clone();
    }

    /// Returns whether a background run is in progress.
    pub fn state(&self) -> CoordinatorState {
        self.inner.status.lock().state
    }

    /// Returns whether a rerun is queued behind the current run.
    pub fn is_queued(&self) -> bool {
        self.inner.status.lock().queued
    }

    /// Returns run statistics.
    pub fn stats(&self) -> SyncStats {
        self.inner.stats.read().clone()
    }

    /// Requests a run without waiting for it.
    ///
    /// While a run is in progress, any number of triggers collapse into a
    /// single rerun that starts after the current one finishes.
    ///
    /// # Errors
    ///
    /// Returns `Worker` if the background thread cannot be spawned.
    pub fn trigger_sync(&self, reason: &str) -> SyncResult<TriggerOutcome> {
        if !self.inner.config.read().enabled {
            debug!(reason, "sync disabled; ignoring trigger");
            return Ok(TriggerOutcome::Disabled);
        }

        {
            let mut status = self.inner.status.lock();
            if status.state == CoordinatorState::Running {
                if status.queued {
                    return Ok(TriggerOutcome::AlreadyQueued);
                }
                status.queued = true;
                debug!(reason, "sync in progress; queued one rerun");
                return Ok(TriggerOutcome::Queued);
            }
            status.state = CoordinatorState::Running;
        }

        let inner = Arc::clone(&self.inner);
        let reason = reason.to_string();
        let spawned = thread::Builder::new()
            .name("ticksync-worker".into())
            .spawn(move || inner.work(reason));
        if let Err(err) = spawned {
            self.inner.finish_worker();
            return Err(err.into());
        }
        Ok(TriggerOutcome::Started)
    }

    /// Blocks until no background run is in progress. Returns false on
    /// timeout.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut status = self.inner.status.lock();
        while status.state == CoordinatorState::Running {
            if self
                .inner
                .idle
                .wait_until(&mut status, deadline)
                .timed_out()
            {
                return status.state == CoordinatorState::Idle;
            }
        }
        true
    }

    /// Runs one sync on the calling thread.
    ///
    /// Serialized with background runs: if one is in progress, this call
    /// waits for it to finish first.
    ///
    /// # Errors
    ///
    /// Returns `Disabled` when sync is switched off, before any network or
    /// transaction work, and otherwise the first error of the run.
    pub fn run_sync(&self) -> SyncResult<SyncRunOutcome> {
        self.inner.run_once("direct call")
    }
}

impl<C: CentralServer + 'static> Inner<C> {
    fn work(&self, mut reason: String) {
        loop {
            // Outcome is already logged and counted in stats.
            let _outcome = self.run_once(&reason);

            let mut status = self.status.lock();
            if status.queued {
                status.queued = false;
                reason = "queued trigger".to_string();
                continue;
            }
            status.state = CoordinatorState::Idle;
            self.idle.notify_all();
            return;
        }
    }

    fn finish_worker(&self) {
        let mut status = self.status.lock();
        status.state = CoordinatorState::Idle;
        status.queued = false;
        self.idle.notify_all();
    }

    fn run_once(&self, reason: &str) -> SyncResult<SyncRunOutcome> {
        let _serial = self.run_lock.lock();
        let config = self.config.read().clone();
        if !config.enabled {
            debug!(reason, "sync disabled; skipping run");
            return Err(SyncError::Disabled);
        }

        let started = Instant::now();
        self.stats.write().runs_started += 1;
        let result = config
            .validate()
            .and_then(|()| self.run_with(&config, started, reason));

        match &result {
            Ok(SyncRunOutcome::Completed(report)) => {
                info!(
                    session_id = %report.session_id,
                    pushed = report.pushed,
                    pulled = report.pulled,
                    duration_ms = report.duration.as_millis() as u64,
                    "sync run completed"
                );
                self.stats.write().record_completed(report);
            }
            Ok(SyncRunOutcome::Queued { status }) => {
                info!(?status, "central queued the session; will retry on next trigger");
                self.stats.write().runs_queued += 1;
            }
            Err(err) => {
                log_failure(err);
                self.stats
                    .write()
                    .record_failed(err.to_string(), err.category());
            }
        }
        result
    }

    fn run_with(
        &self,
        config: &SyncConfig,
        started: Instant,
        reason: &str,
    ) -> SyncResult<SyncRunOutcome> {
        info!(reason, "sync run starting");
        self.staging.reset();

        let device_id = self.store.device_id()?;
        let response = self.central.start_sync_session(&StartSessionRequest {
            device_id,
            protocol_version: PROTOCOL_VERSION,
        })?;
        let (session_id, started_at_tick) = match response {
            StartSessionResponse::Started {
                session_id,
                started_at_tick,
            } => (session_id, Tick::new(started_at_tick)),
            StartSessionResponse::Queued { status } => {
                return Ok(SyncRunOutcome::Queued { status });
            }
        };

        match self.run_session(config, &session_id, started_at_tick) {
            Ok(phases) => {
                self.central.end_sync_session(&SessionRequest {
                    session_id: session_id.clone(),
                })?;
                Ok(SyncRunOutcome::Completed(SyncReport {
                    session_id,
                    session_start_tick: phases.session_start_tick,
                    pushed: phases.push.pushed,
                    pulled: phases.pull.pulled,
                    pull_until: phases.pull.pull_until,
                    duration: started.elapsed(),
                }))
            }
            Err(err) => {
                let request = MarkErroredRequest {
                    session_id: session_id.clone(),
                    message: err.to_string(),
                };
                if let Err(mark_err) = self.central.mark_session_errored(&request) {
                    warn!(
                        session_id = %session_id,
                        error = %mark_err,
                        "could not report errored session to central"
                    );
                }
                Err(err)
            }
        }
    }

    fn run_session(
        &self,
        config: &SyncConfig,
        session_id: &SessionId,
        started_at_tick: Tick,
    ) -> SyncResult<SessionPhases> {
        let session_start_tick = self.roll_clock(started_at_tick)?;
        let ctx = SyncContext {
            store: &self.store,
            registry: &self.registry,
            central: self.central.as_ref(),
            staging: &self.staging,
            config,
        };
        let push = push_changes(&ctx, session_id, session_start_tick)?;
        let pull = pull_changes(&ctx, session_id, session_start_tick)?;
        Ok(SessionPhases {
            session_start_tick,
            push,
            pull,
        })
    }

    /// Returns the tick that bounds this session's push snapshot.
    fn roll_clock(&self, started_at_tick: Tick) -> SyncResult<Tick> {
        self.store.transaction(|txn| {
            let current = txn.commit_tick()?;
            let next = started_at_tick.max(current.advanced(1));
            txn.set_tick(CURRENT_TICK, next);
            debug!(
                session_start_tick = %current,
                current_tick = %next,
                "rolled local clock"
            );
            Ok::<_, SyncError>(current)
        })
    }
}

fn log_failure(err: &SyncError) {
    match err.category() {
        ErrorCategory::Conflict => error!(
            category = "conflict",
            error = %err,
            "sync run aborted: pulled records would overwrite local edits"
        ),
        ErrorCategory::Transport => warn!(
            category = "transport",
            retryable = err.is_retryable(),
            error = %err,
            "sync run failed talking to central; will retry on next trigger"
        ),
        category => error!(category = %category, error = %err, "sync run failed"),
    }
}
