//! Resource Adjuster — the fourth of the swarm's cooperating services.
//! Reacts to tasks the server has moved to `ADJUSTING_RESOURCES`: scales
//! their requested resources, binds (or reuses) a new TaskResources row,
//! re-points the task at it, and queues the task again.

use client::Requester;
use db::models::{TaskResourcesRow, TaskStatus};
use engine::resource_scale::{resources_hash, scale_resources};
use serde::Serialize;

use crate::error::SwarmError;
use crate::state::{StateUpdate, SwarmState};
use crate::swarm_task::SwarmTask;

pub struct ResourceAdjuster {
    requester: Requester,
}

#[derive(Serialize)]
struct BindTaskResourcesBody<'a> {
    queue: &'a str,
    requested_resources: serde_json::Value,
    hash: &'a str,
}

#[derive(Serialize)]
struct RepointTaskResourcesBody {
    new_task_resources_id: i64,
}

#[derive(Serialize)]
struct TaskUpdateStatusesBody {
    task_ids: Vec<i64>,
    valid_source_statuses: Vec<TaskStatus>,
    target_status: TaskStatus,
    bulk: bool,
}

impl ResourceAdjuster {
    pub fn new(requester: Requester) -> Self {
        Self { requester }
    }

    /// One adjustment pass: scale and re-point every task currently in
    /// `ADJUSTING_RESOURCES`, then queue them in one bulk request.
    pub async fn tick(&self, state: &SwarmState) -> Result<StateUpdate, SwarmError> {
        let mut adjusted = Vec::new();
        for task in state.tasks_with_status(TaskStatus::AdjustingResources) {
            self.adjust_one(task).await?;
            adjusted.push(task.task_id);
        }

        if adjusted.is_empty() {
            return Ok(StateUpdate::empty());
        }

        self.requester
            .put(
                "/api/v1/fsm/task/status",
                &TaskUpdateStatusesBody {
                    task_ids: adjusted.clone(),
                    valid_source_statuses: vec![TaskStatus::AdjustingResources],
                    target_status: TaskStatus::Queued,
                    bulk: true,
                },
            )
            .await?;

        let mut update = StateUpdate::empty();
        for task_id in adjusted {
            update.task_statuses.insert(task_id, TaskStatus::Queued);
        }
        Ok(update)
    }

    async fn adjust_one(&self, task: &SwarmTask) -> Result<(), SwarmError> {
        let route = format!("/api/v1/fsm/task_resources/{}", task.task_resources_id);
        let (_, content) = self.requester.get(&route, &[]).await?;
        let current: TaskResourcesRow = serde_json::from_value(content)
            .map_err(|e| SwarmError::MalformedResponse(e.to_string()))?;

        let step = (task.num_attempts.max(1) - 1) as usize;
        let scaled = scale_resources(&current.requested_resources, &task.resource_scales, step);
        let hash = resources_hash(&current.queue, &scaled);

        let (_, content) = self
            .requester
            .post(
                "/api/v1/fsm/task_resources",
                &BindTaskResourcesBody { queue: &current.queue, requested_resources: scaled, hash: &hash },
            )
            .await?;
        let new_resources: TaskResourcesRow = serde_json::from_value(content)
            .map_err(|e| SwarmError::MalformedResponse(e.to_string()))?;

        let route = format!("/api/v1/fsm/task/{}/task_resources", task.task_id);
        self.requester
            .put(&route, &RepointTaskResourcesBody { new_task_resources_id: new_resources.id })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn adjusting_task(id: i64, task_resources_id: i64, num_attempts: i32) -> SwarmTask {
        SwarmTask {
            task_id: id,
            array_id: 1,
            status: TaskStatus::AdjustingResources,
            max_attempts: 3,
            num_attempts,
            task_resources_id,
            resource_scales: serde_json::json!({"memory": 0.5}),
            downstream: vec![],
            num_upstreams: 0,
            num_upstreams_done: 0,
        }
    }

    #[test]
    fn state_surfaces_only_tasks_in_adjusting_resources() {
        let tasks = vec![adjusting_task(1, 10, 1)];
        let state = SwarmState::new(tasks, HashMap::new(), 10);
        let found: Vec<i64> =
            state.tasks_with_status(TaskStatus::AdjustingResources).map(|t| t.task_id).collect();
        assert_eq!(found, vec![1]);
        assert!(state.tasks_with_status(TaskStatus::Queued).next().is_none());
    }
}
