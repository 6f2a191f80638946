use std::sync::Arc;
use std::time::Duration;

use athwatch_engine::{run_cycle, ControlSignals, Dispatcher, PageScraper};
use chrono::{DateTime, DurationRound, TimeDelta, Utc};

/// The first instant strictly after `now` whose seconds field equals
/// `second`. Fires once per minute.
pub fn next_fire(now: DateTime<Utc>, second: u32) -> DateTime<Utc> {
    let minute = now.duration_trunc(TimeDelta::minutes(1)).unwrap_or(now);
    let candidate = minute + TimeDelta::seconds(i64::from(second.min(59)));
    if candidate > now {
        candidate
    } else {
        candidate + TimeDelta::minutes(1)
    }
}

/// Run a scrape-and-dispatch cycle at `second` past every minute until
/// shutdown. Cycles never overlap: a slow cycle delays the next fire.
pub async fn scrape_scheduler(
    scraper: Arc<dyn PageScraper>,
    dispatcher: Dispatcher,
    signals: ControlSignals,
    second: u32,
) {
    let cancel = signals.shutdown_token();

    loop {
        let now = Utc::now();
        let wait = (next_fire(now, second) - now)
            .to_std()
            .unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Scrape scheduler shutting down");
                break;
            }
            _ = tokio::time::sleep(wait) => {
                if signals.is_paused() {
                    tracing::debug!("Paused, scrape cycle skipped");
                    continue;
                }
                run_cycle(scraper.as_ref(), &dispatcher).await;
            }
        }
    }
}
