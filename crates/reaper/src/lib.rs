//! `reaper` — the standalone process that sweeps for workflow runs whose
//! heartbeat has lapsed, fixes the rare FAILED-workflow/all-tasks-DONE
//! inconsistency, and expunges stale distributor instances. Runs forever
//! on a configurable interval; every sweep endpoint it calls is
//! idempotent, so a crash mid-sweep just means the next tick repeats it.

pub mod error;
pub mod gateway;
pub mod notify;
pub mod sweep;

pub use error::ReaperError;
pub use gateway::Gateway;
pub use notify::{NoopNotifier, Notifier, TracingNotifier};
pub use sweep::{Sweep, SweepReport};

use std::time::Duration;

pub struct ReaperLoop {
    gateway: Gateway,
    notifier: Box<dyn Notifier>,
    fix_status_step: i64,
}

impl ReaperLoop {
    pub fn new(gateway: Gateway, notifier: Box<dyn Notifier>, fix_status_step: i64) -> Self {
        Self { gateway, notifier, fix_status_step }
    }

    /// Run `Sweep::run_once` on `interval` forever, carrying the
    /// `fix_status_inconsistency` cursor across ticks so each sweep picks
    /// up where the last one left off rather than rescanning every
    /// workflow every time.
    pub async fn run_forever(&self, interval: Duration) {
        let mut cursor = 0i64;
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let sweep = Sweep::new(&self.gateway, self.notifier.as_ref(), self.fix_status_step);
            match sweep.run_once(cursor).await {
                Ok((report, next_cursor)) => {
                    cursor = next_cursor;
                    if report.reaped > 0 || report.fixed > 0 || report.expunged > 0 {
                        tracing::info!(
                            reaped = report.reaped,
                            fixed = report.fixed,
                            expunged = report.expunged,
                            "reaper sweep complete"
                        );
                    }
                }
                Err(e) => tracing::warn!(error = %e, "reaper sweep failed, retrying next interval"),
            }
        }
    }
}
