//! Periodic sync trigger.

use crate::coordinator::SyncCoordinator;
use crate::error::{SyncError, SyncResult};
use crate::transport::CentralServer;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Background task that triggers a sync every `sync_interval`.
///
/// Triggers go through [`SyncCoordinator::trigger_sync`], so a slow run
/// never stacks up more than one rerun.
#[derive(Debug)]
pub struct SyncScheduler {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl SyncScheduler {
    /// Starts the schedule with the coordinator's configured interval.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `Disabled` if sync is switched off.
    pub fn spawn<C: CentralServer + 'static>(coordinator: SyncCoordinator<C>) -> SyncResult<Self> {
        let config = coordinator.config();
        if !config.enabled {
            return Err(SyncError::Disabled);
        }
        Self::spawn_with_interval(coordinator, config.sync_interval)
    }

    /// Starts the schedule with an explicit interval.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero interval.
    pub fn spawn_with_interval<C: CentralServer + 'static>(
        coordinator: SyncCoordinator<C>,
        interval: Duration,
    ) -> SyncResult<Self> {
        if interval.is_zero() {
            return Err(SyncError::invalid_config("sync_interval must be positive"));
        }

        let (shutdown, mut stop) = watch::channel(false);
        info!(interval_ms = interval.as_millis() as u64, "starting sync scheduler");
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match coordinator.trigger_sync("scheduled") {
                            Ok(outcome) => debug!(?outcome, "scheduled trigger"),
                            Err(err) => warn!(error = %err, "scheduled trigger failed"),
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("sync scheduler stopped");
        });

        Ok(Self { handle, shutdown })
    }

    /// Stops the schedule and waits for the task to exit. A run already in
    /// progress keeps going on its worker thread.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::registry::ModelRegistry;
    use crate::transport::{CentralCall, MockCentral};
    use std::sync::Arc;
    use ticksync_store::Store;

    fn coordinator(config: SyncConfig) -> SyncCoordinator<MockCentral> {
        SyncCoordinator::new(
            Arc::new(Store::open_in_memory()),
            Arc::new(MockCentral::new()),
            ModelRegistry::default(),
            config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn scheduler_triggers_runs() {
        let coordinator = coordinator(SyncConfig::new().with_sync_interval(Duration::from_millis(20)));
        let scheduler = SyncScheduler::spawn(coordinator.clone()).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.shutdown().await;
        assert!(coordinator.wait_until_idle(Duration::from_secs(10)));

        assert!(
            coordinator
                .central()
                .call_count(CentralCall::StartSyncSession)
                >= 1
        );
    }

    #[tokio::test]
    async fn disabled_sync_has_no_schedule() {
        let coordinator = coordinator(SyncConfig::disabled());
        assert!(matches!(
            SyncScheduler::spawn(coordinator),
            Err(SyncError::Disabled)
        ));
    }
}
