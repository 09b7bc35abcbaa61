//! Periodic pruning of unused host resources.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::provisioner::Provisioner;

/// Spawn a task that prunes every `period` until `cancel` fires.
///
/// The first run happens one full period after start-up.
pub fn spawn(
    provisioner: Arc<Provisioner>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("housekeeping stopped");
                    break;
                }
                _ = ticker.tick() => {
                    match provisioner.prune_unused().await {
                        Ok(report) => info!(
                            containers = %report.containers.trim(),
                            images = %report.images.trim(),
                            networks = %report.networks.trim(),
                            "pruned unused resources"
                        ),
                        Err(e) => warn!(error = %e, "prune failed"),
                    }
                }
            }
        }
    })
}
