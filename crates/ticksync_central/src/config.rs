//! Central node configuration.

use std::time::Duration;

/// Configuration for the reference central node.
#[derive(Debug, Clone)]
pub struct CentralConfig {
    /// Sessions that may be active at once; later starts are queued.
    pub max_concurrent_sessions: usize,
    /// Maximum records returned by one pull page.
    pub max_pull_batch: u32,
    /// Maximum records accepted by one push call.
    pub max_push_batch: u32,
    /// Active sessions idle for longer than this are marked errored when
    /// the same device starts again.
    pub session_timeout: Duration,
    /// Clock value at startup.
    pub initial_tick: i64,
}

impl CentralConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            max_concurrent_sessions: 8,
            max_pull_batch: 1000,
            max_push_batch: 1000,
            session_timeout: Duration::from_secs(600),
            initial_tick: 0,
        }
    }

    /// Sets the number of concurrently active sessions.
    pub fn with_max_concurrent_sessions(mut self, max: usize) -> Self {
        self.max_concurrent_sessions = max;
        self
    }

    /// Sets the maximum pull page size.
    pub fn with_max_pull_batch(mut self, size: u32) -> Self {
        self.max_pull_batch = size;
        self
    }

    /// Sets the maximum push batch size.
    pub fn with_max_push_batch(mut self, size: u32) -> Self {
        self.max_push_batch = size;
        self
    }

    /// Sets the session timeout.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Sets the starting clock value.
    pub fn with_initial_tick(mut self, tick: i64) -> Self {
        self.initial_tick = tick;
        self
    }
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self::new()
    }
}
