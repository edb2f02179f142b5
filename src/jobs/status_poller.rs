use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::app::connection::ConnectionManager;

const MIN_INTERVAL_MS: u64 = 1;

/// Samples `is_connected` on a fixed interval and publishes changes. Runs
/// until the task is aborted.
pub async fn run(connection: ConnectionManager, status: Arc<watch::Sender<bool>>, every: Duration) {
    debug!(interval = ?every, "connection status poller started");
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(MIN_INTERVAL_MS)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if publish_status(&status, connection.is_connected()) {
            debug!(connected = *status.borrow(), "connection status changed");
        }
    }
}

/// Returns whether the published value changed.
pub fn publish_status(status: &watch::Sender<bool>, connected: bool) -> bool {
    status.send_if_modified(|current| {
        if *current == connected {
            false
        } else {
            *current = connected;
            true
        }
    })
}
