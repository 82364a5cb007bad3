//! Background probe loop

use async_trait::async_trait;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Something that can be probed for one service
#[async_trait]
pub trait ProbeTarget: Send + Sync + 'static {
    async fn probe(&self, service: &str);
}

/// Probe `service` every `interval` until cancelled or the target is dropped.
///
/// The first probe runs one interval after spawning.
pub fn spawn_probe_loop<T: ProbeTarget>(
    target: Weak<T>,
    service: String,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        debug!(service = %service, ?interval, "health probe started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(target) = target.upgrade() else {
                break;
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = target.probe(&service) => {}
            }
        }
        debug!(service = %service, "health probe stopped");
    })
}
