use std::time::Duration;

use crate::correlator::Correlator;
use crate::signals::ControlSignals;

/// Periodic sweep that ages silent responders and settles their requests.
///
/// Without it a request whose responders never answer stays pending
/// forever. Exits on shutdown.
pub async fn timeout_monitor(correlator: Correlator, signals: ControlSignals, interval: Duration) {
    let cancel = signals.shutdown_token();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Timeout monitor shutting down");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                let settled = correlator.sweep(signals.is_paused());
                if settled > 0 {
                    tracing::debug!(settled, "Timeout sweep settled requests");
                }
            }
        }
    }
}
