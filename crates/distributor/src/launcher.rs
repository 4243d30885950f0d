//! Claims unclaimed batches for this cluster and submits them through a
//! `ClusterDriver`, mirroring `Batch`'s `prepare_task_instance_batch_for_launch`
//! / `transition_to_launched` / `log_distributor_ids` sequence.
//!
//! Each batch's submission is independent of every other's, so a tick's
//! worth of launches runs through `queue::run_tick` rather than one at a
//! time — one slow `submit_array` call shouldn't hold up the rest.

use std::collections::HashMap;
use std::sync::Arc;

use nodes::{ArrayStepCommand, ClusterDriver, ResourceRequest};
use queue::DistributorCommand;

use crate::error::DistributorError;
use crate::gateway::Gateway;

pub struct Launcher {
    gateway: Gateway,
    driver: Arc<dyn ClusterDriver>,
    distributor_instance_id: i64,
}

impl Launcher {
    pub fn new(gateway: Gateway, driver: Arc<dyn ClusterDriver>, distributor_instance_id: i64) -> Self {
        Self { gateway, driver, distributor_instance_id }
    }

    /// Claim and submit every batch currently unclaimed on `workflow_run_id`,
    /// running up to `concurrency` submissions at once. Returns how many
    /// batches launched successfully; a batch whose submission errors is
    /// logged and left unclaimed for the next tick to retry.
    pub async fn launch_ready_batches(
        &self,
        workflow_run_id: i64,
        concurrency: usize,
    ) -> Result<usize, DistributorError> {
        let batches = self.gateway.get_unclaimed_batches(workflow_run_id).await?;
        let total = batches.len();
        if total == 0 {
            return Ok(0);
        }

        let commands: Vec<DistributorCommand> = batches
            .into_iter()
            .map(|batch| {
                let gateway = self.gateway.clone();
                let driver = self.driver.clone();
                let distributor_instance_id = self.distributor_instance_id;
                Box::pin(async move {
                    launch_batch(&gateway, driver.as_ref(), distributor_instance_id, &batch)
                        .await
                        .map_err(|e| queue::QueueError::Command(e.to_string()))
                }) as DistributorCommand
            })
            .collect();

        let failed = queue::run_tick(commands, concurrency).await;
        Ok(total - failed)
    }
}

async fn launch_batch(
    gateway: &Gateway,
    driver: &dyn ClusterDriver,
    distributor_instance_id: i64,
    batch: &db::models::BatchRow,
) -> Result<(), DistributorError> {
    let array = gateway.get_array(batch.array_id).await?;
    let resources = gateway.get_task_resources(batch.task_resources_id).await?;
    let steps = gateway.get_batch_steps(batch.id).await?;

    let submission_name = batch.submission_name(&array.name);
    let commands: Vec<ArrayStepCommand> = steps
        .iter()
        .map(|s| ArrayStepCommand { array_step_id: s.array_step_id, command: s.command.clone() })
        .collect();
    let request = ResourceRequest { queue: resources.queue, requested_resources: resources.requested_resources };

    let ids_by_step = driver.submit_array(&submission_name, &commands, &request).await?;
    let updates = zip_distributor_ids(&steps, &ids_by_step)?;

    gateway.log_distributor_ids(updates).await?;
    gateway.transition_batch_to_launched(batch.id, distributor_instance_id).await?;

    Ok(())
}

/// Match each step's backend-assigned id back to the task instance it
/// belongs to. A step the backend didn't return an id for is a submission
/// bug, not a retryable condition — the caller should surface it loudly
/// rather than silently drop the instance.
fn zip_distributor_ids(
    steps: &[crate::gateway::BatchStep],
    ids_by_step: &HashMap<i32, String>,
) -> Result<Vec<(i64, String)>, DistributorError> {
    steps
        .iter()
        .map(|s| {
            ids_by_step
                .get(&s.array_step_id)
                .cloned()
                .map(|id| (s.task_instance_id, id))
                .ok_or(DistributorError::MissingDistributorId(s.array_step_id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::BatchStep;

    fn step(array_step_id: i32, task_instance_id: i64) -> BatchStep {
        BatchStep { task_instance_id, array_step_id, command: "echo hi".into() }
    }

    #[test]
    fn zips_each_step_to_its_backend_id() {
        let steps = vec![step(0, 100), step(1, 101)];
        let ids: HashMap<i32, String> = [(0, "job.0".to_string()), (1, "job.1".to_string())].into();
        let updates = zip_distributor_ids(&steps, &ids).unwrap();
        assert_eq!(updates.len(), 2);
        assert!(updates.contains(&(100, "job.0".to_string())));
        assert!(updates.contains(&(101, "job.1".to_string())));
    }

    #[test]
    fn missing_backend_id_is_an_error() {
        let steps = vec![step(0, 100)];
        let ids: HashMap<i32, String> = HashMap::new();
        assert!(zip_distributor_ids(&steps, &ids).is_err());
    }
}
