//! One reaper sweep: find lost workflow runs and reap them, fix any
//! workflow left in FAILED with every task DONE, and expunge distributor
//! instances that stopped heartbeating.

use crate::error::ReaperError;
use crate::gateway::Gateway;
use crate::notify::Notifier;

pub struct Sweep<'a> {
    gateway: &'a Gateway,
    notifier: &'a dyn Notifier,
    fix_status_step: i64,
}

/// Summary counts for one sweep — logged by the caller, asserted on in
/// tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub reaped: usize,
    pub fixed: usize,
    pub expunged: usize,
}

impl<'a> Sweep<'a> {
    pub fn new(gateway: &'a Gateway, notifier: &'a dyn Notifier, fix_status_step: i64) -> Self {
        Self { gateway, notifier, fix_status_step }
    }

    pub async fn run_once(&self, fix_status_cursor: i64) -> Result<(SweepReport, i64), ReaperError> {
        let mut report = SweepReport::default();

        let lost = self.gateway.get_lost_workflow_runs().await?;
        for run in &lost {
            let resp = self.gateway.reap_workflow_run(run.id).await?;
            if resp.reaped_at.is_some() {
                report.reaped += 1;
                self.notifier.workflow_run_reaped(run.id, "ERROR").await;
            }
        }

        let fix_resp = self
            .gateway
            .fix_status_inconsistency(fix_status_cursor, self.fix_status_step)
            .await?;
        report.fixed = fix_resp.fixed.len();

        let expunged = self.gateway.sweep_expunged_distributors().await?;
        report.expunged = expunged.len();

        Ok((report, fix_resp.next_start_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_report_defaults_to_zero() {
        assert_eq!(SweepReport::default(), SweepReport { reaped: 0, fixed: 0, expunged: 0 });
    }
}
