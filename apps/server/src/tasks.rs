//! Periodic background tasks with cooperative shutdown.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// One unit of periodic work.
#[async_trait]
pub trait Poller: Send + 'static {
    fn name(&self) -> &'static str;

    async fn tick(&mut self);
}

/// Handle to a spawned poller loop.
pub struct ScheduledTask {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Run `poller` every `period`, starting immediately. Ticks missed while
    /// a slow tick runs are skipped.
    pub fn spawn<P: Poller>(mut poller: P, period: Duration) -> Self {
        let name = poller.name();
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(task = name, period_secs = period.as_secs(), "Task started");

            loop {
                tokio::select! {
                    _ = interval.tick() => poller.tick().await,
                    _ = shutdown_rx.changed() => break,
                }
            }

            info!(task = name, "Task stopped");
        });

        Self {
            name,
            shutdown,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the loop to stop and wait up to `grace` for the current tick
    /// to finish. The task is aborted after that.
    pub async fn stop(self, grace: Duration) {
        let _ = self.shutdown.send(true);
        let abort = self.handle.abort_handle();

        if tokio::time::timeout(grace, self.handle).await.is_err() {
            warn!(task = self.name, "Task did not stop in time, aborting");
            abort.abort();
        }
    }
}
