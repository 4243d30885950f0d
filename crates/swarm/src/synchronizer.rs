//! Pulls task status updates from the server and requests triage of any
//! task instance whose heartbeat has lapsed. Callers merge the returned
//! `StateUpdate` into `SwarmState` themselves.

use client::Requester;
use db::models::TaskStatus;
use serde::Deserialize;

use crate::error::SwarmError;
use crate::state::StateUpdate;

pub struct Synchronizer {
    requester: Requester,
    workflow_run_id: i64,
}

#[derive(Deserialize)]
struct TaskStatusRow {
    id: i64,
    status: TaskStatus,
}

impl Synchronizer {
    pub fn new(requester: Requester, workflow_run_id: i64) -> Self {
        Self { requester, workflow_run_id }
    }

    /// One sync tick: request triage of overdue task instances, then
    /// fetch whatever task status changes the caller's task set cares
    /// about. `task_ids` scopes the result to tasks this swarm knows
    /// about; unrecognised ids from the server are dropped rather than
    /// surfaced as an error, since a concurrent resume may have rebound
    /// the workflow under a new run.
    pub async fn tick(&self, task_ids: &[i64]) -> Result<StateUpdate, SwarmError> {
        self.request_triage().await?;
        self.get_task_updates(task_ids).await
    }

    async fn request_triage(&self) -> Result<(), SwarmError> {
        let route = format!(
            "/api/v1/fsm/workflow_run/{}/request_triage",
            self.workflow_run_id
        );
        self.requester.post(&route, &serde_json::json!({})).await?;
        Ok(())
    }

    async fn get_task_updates(&self, task_ids: &[i64]) -> Result<StateUpdate, SwarmError> {
        let route = format!("/api/v1/cli/workflow_run/{}/task_statuses", self.workflow_run_id);
        let (_, content) = self.requester.get(&route, &[]).await?;

        let rows: Vec<TaskStatusRow> = serde_json::from_value(content).unwrap_or_default();
        let known: std::collections::HashSet<i64> = task_ids.iter().copied().collect();

        let mut update = StateUpdate::empty();
        for row in rows {
            if known.contains(&row.id) {
                update.task_statuses.insert(row.id, row.status);
            }
        }
        Ok(update)
    }
}
