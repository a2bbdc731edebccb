//! Fixed-cadence scan loop for `run` mode.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

use crate::scanner::MarketScanner;

/// Runs a cycle immediately, then once per `every`, until `shutdown` resolves.
///
/// A failed cycle is logged and the loop carries on. Ticks missed while a slow
/// cycle was running are dropped rather than replayed.
pub async fn run_polling_loop<F>(scanner: &MarketScanner, every: Duration, shutdown: F) -> usize
where
    F: Future<Output = ()>,
{
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(every_secs = every.as_secs(), "market poller started");

    tokio::pin!(shutdown);
    let mut cycles = 0usize;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                cycles += 1;
                match scanner.run_cycle(Utc::now()).await {
                    Ok(report) if report.failed > 0 => {
                        warn!(cycle = cycles, failed = report.failed, errors = ?report.errors, "cycle finished with failures");
                    }
                    Ok(_) => {}
                    Err(e) => error!(cycle = cycles, error = ?e, "scan cycle failed"),
                }
            }
            _ = &mut shutdown => {
                info!(cycles, "shutdown signal received");
                return cycles;
            }
        }
    }
}
