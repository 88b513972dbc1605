//! Coordinator state, run outcomes and statistics.

use crate::error::ErrorCategory;
use std::time::{Duration, SystemTime};
use ticksync_protocol::{QueueStatus, SessionId};
use ticksync_store::Tick;

/// Whether a run is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No run in progress.
    Idle,
    /// A run is in progress.
    Running,
}

impl CoordinatorState {
    /// Returns true if a run is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, CoordinatorState::Running)
    }
}

/// What a trigger did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Sync is disabled; nothing happens.
    Disabled,
    /// A run was started in the background.
    Started,
    /// A run is in progress; one more will follow it.
    Queued,
    /// A run is in progress and a rerun is already queued.
    AlreadyQueued,
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Session the run used.
    pub session_id: SessionId,
    /// Local tick the push snapshot was bounded by.
    pub session_start_tick: Tick,
    /// Records sent to central.
    pub pushed: u64,
    /// Records received from central.
    pub pulled: u64,
    /// Central tick the pull covered up to.
    pub pull_until: Tick,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

/// Result of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRunOutcome {
    /// The run pushed and pulled.
    Completed(SyncReport),
    /// Central did not open a session.
    Queued {
        /// Reason given by central.
        status: QueueStatus,
    },
}

/// Statistics about sync runs.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Runs started.
    pub runs_started: u64,
    /// Runs that pushed and pulled.
    pub runs_completed: u64,
    /// Runs that failed.
    pub runs_failed: u64,
    /// Runs central asked to retry later.
    pub runs_queued: u64,
    /// Total records pushed.
    pub records_pushed: u64,
    /// Total records pulled.
    pub records_pulled: u64,
    /// Duration of the last completed run.
    pub last_duration: Option<Duration>,
    /// When the last run completed.
    pub last_completed_at: Option<SystemTime>,
    /// Last error message.
    pub last_error: Option<String>,
    /// Category of the last error.
    pub last_error_category: Option<ErrorCategory>,
}

impl SyncStats {
    pub(crate) fn record_completed(&mut self, report: &SyncReport) {
        self.runs_completed += 1;
        self.records_pushed += report.pushed;
        self.records_pulled += report.pulled;
        self.last_duration = Some(report.duration);
        self.last_completed_at = Some(SystemTime::now());
        self.last_error = None;
        self.last_error_category = None;
    }

    pub(crate) fn record_failed(&mut self, message: String, category: ErrorCategory) {
        self.runs_failed += 1;
        self.last_error = Some(message);
        self.last_error_category = Some(category);
    }
}
