//! Polls a cluster backend for outcomes of instances it's tracking, and
//! classifies any instance the server has moved to TRIAGING — mirroring
//! `DistributorTaskInstance.transition_to_{error,unknown_error,resource_error}`.

use nodes::{ClusterDriver, ExitInfo};

use db::models::TaskInstanceStatus;

use crate::error::DistributorError;
use crate::gateway::Gateway;

pub struct Poller<'a> {
    gateway: &'a Gateway,
    driver: &'a dyn ClusterDriver,
    distributor_instance_id: i64,
}

impl<'a> Poller<'a> {
    pub fn new(gateway: &'a Gateway, driver: &'a dyn ClusterDriver, distributor_instance_id: i64) -> Self {
        Self { gateway, driver, distributor_instance_id }
    }

    /// Poll the backend for every instance still reported active and log
    /// terminal outcomes the backend already knows about. Returns how
    /// many instances reached a terminal classification this tick.
    pub async fn poll_active(&self) -> Result<usize, DistributorError> {
        let active = self.gateway.get_active_instances(self.distributor_instance_id).await?;
        if active.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = active.iter().map(|a| a.distributor_id.clone()).collect();
        let outcomes = self.driver.poll(&ids).await?;

        let mut classified = 0;
        for instance in &active {
            if let Some(outcome) = outcomes.get(&instance.distributor_id) {
                if self.classify(instance.task_instance_id, outcome).await? {
                    classified += 1;
                }
            }
        }

        Ok(classified)
    }

    /// Classify every instance the server has moved into TRIAGING against
    /// the backend's own accounting, in case its heartbeat lapsed for a
    /// reason the backend can explain (OOM kill, walltime kill, vanished).
    pub async fn triage(&self) -> Result<usize, DistributorError> {
        let triaging = self.gateway.get_triaging_instances(self.distributor_instance_id).await?;
        if triaging.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = triaging.iter().filter_map(|t| t.distributor_id.clone()).collect();
        let outcomes = self.driver.poll(&ids).await?;

        let mut resolved = 0;
        for ti in &triaging {
            let Some(distributor_id) = &ti.distributor_id else { continue };
            let outcome = outcomes.get(distributor_id).cloned().unwrap_or(ExitInfo::UnknownError);
            if self.classify(ti.id, &outcome).await? {
                resolved += 1;
            }
        }

        Ok(resolved)
    }

    /// Log a terminal outcome for one instance. Returns `false` for
    /// outcomes that don't represent a terminal state yet (still running).
    async fn classify(&self, task_instance_id: i64, outcome: &ExitInfo) -> Result<bool, DistributorError> {
        match outcome {
            ExitInfo::Done => {
                self.gateway.complete_task_instance(task_instance_id).await?;
                Ok(true)
            }
            ExitInfo::Error { exit_code, message } => {
                self.gateway
                    .log_known_error(
                        task_instance_id,
                        TaskInstanceStatus::Error,
                        &format!("exit code {exit_code}: {message}"),
                    )
                    .await?;
                Ok(true)
            }
            ExitInfo::ResourceError { message } => {
                self.gateway
                    .log_known_error(task_instance_id, TaskInstanceStatus::ResourceError, message)
                    .await?;
                Ok(true)
            }
            ExitInfo::Killed => {
                self.gateway
                    .log_known_error(task_instance_id, TaskInstanceStatus::KillSelf, "killed on request")
                    .await?;
                Ok(true)
            }
            ExitInfo::UnknownError => {
                self.gateway
                    .log_unknown_error(task_instance_id, "backend has no record of this job")
                    .await?;
                Ok(true)
            }
        }
    }
}
