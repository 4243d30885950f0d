//! Thin wrapper over `client::Requester` for the distributor's own
//! routes — one method per server call, no retry/backoff logic of its
//! own since `Requester` already owns that.

use client::Requester;
use db::models::{ArrayRow, BatchRow, DistributorInstanceRow, TaskInstanceRow, TaskResourcesRow};
use serde::{Deserialize, Serialize};

use crate::error::DistributorError;

#[derive(Clone)]
pub struct Gateway {
    requester: Requester,
}

#[derive(Deserialize)]
pub struct BatchStep {
    pub task_instance_id: i64,
    pub array_step_id: i32,
    pub command: String,
}

#[derive(Deserialize)]
pub struct ActiveInstance {
    pub task_instance_id: i64,
    pub distributor_id: String,
}

#[derive(Serialize)]
struct RegisterDto {
    cluster_id: i64,
    workflow_run_id: Option<i64>,
    report_by_increment: f64,
}

#[derive(Serialize)]
struct HeartbeatDto {
    next_report_increment: f64,
}

#[derive(Serialize)]
struct LogDistributorIdDto {
    task_instance_id: i64,
    distributor_id: String,
}

#[derive(Serialize)]
struct LogDistributorIdsDto {
    updates: Vec<LogDistributorIdDto>,
}

#[derive(Serialize)]
struct TransitionLaunchedDto {
    distributor_instance_id: i64,
}

#[derive(Serialize)]
struct LogErrorDto<'a> {
    status: db::models::TaskInstanceStatus,
    description: &'a str,
}

impl Gateway {
    pub fn new(requester: Requester) -> Self {
        Self { requester }
    }

    pub async fn register(
        &self,
        cluster_id: i64,
        workflow_run_id: Option<i64>,
        report_by_increment: f64,
    ) -> Result<DistributorInstanceRow, DistributorError> {
        let (_, content) = self
            .requester
            .post("/api/v1/fsm/distributor_instance", &RegisterDto { cluster_id, workflow_run_id, report_by_increment })
            .await?;
        parse(content)
    }

    pub async fn heartbeat(&self, id: i64, next_report_increment: f64) -> Result<(), DistributorError> {
        let route = format!("/api/v1/fsm/distributor_instance/{id}/heartbeat");
        self.requester.post(&route, &HeartbeatDto { next_report_increment }).await?;
        Ok(())
    }

    pub async fn get_unclaimed_batches(&self, workflow_run_id: i64) -> Result<Vec<BatchRow>, DistributorError> {
        let route = format!("/api/v1/fsm/workflow_run/{workflow_run_id}/batches/unclaimed");
        let (_, content) = self.requester.get(&route, &[]).await?;
        parse(content)
    }

    pub async fn get_array(&self, array_id: i64) -> Result<ArrayRow, DistributorError> {
        let route = format!("/api/v1/fsm/array/{array_id}");
        let (_, content) = self.requester.get(&route, &[]).await?;
        parse(content)
    }

    pub async fn get_task_resources(&self, id: i64) -> Result<TaskResourcesRow, DistributorError> {
        let route = format!("/api/v1/fsm/task_resources/{id}");
        let (_, content) = self.requester.get(&route, &[]).await?;
        parse(content)
    }

    pub async fn get_batch_steps(&self, batch_id: i64) -> Result<Vec<BatchStep>, DistributorError> {
        let route = format!("/api/v1/fsm/batch/{batch_id}/steps");
        let (_, content) = self.requester.get(&route, &[]).await?;
        parse(content)
    }

    pub async fn log_distributor_ids(
        &self,
        updates: Vec<(i64, String)>,
    ) -> Result<(), DistributorError> {
        let updates = updates
            .into_iter()
            .map(|(task_instance_id, distributor_id)| LogDistributorIdDto { task_instance_id, distributor_id })
            .collect();
        self.requester
            .post("/api/v1/fsm/task_instance/distributor_ids", &LogDistributorIdsDto { updates })
            .await?;
        Ok(())
    }

    pub async fn transition_batch_to_launched(
        &self,
        batch_id: i64,
        distributor_instance_id: i64,
    ) -> Result<(), DistributorError> {
        let route = format!("/api/v1/fsm/batch/{batch_id}/launched");
        self.requester
            .put(&route, &TransitionLaunchedDto { distributor_instance_id })
            .await?;
        Ok(())
    }

    pub async fn get_active_instances(&self, distributor_instance_id: i64) -> Result<Vec<ActiveInstance>, DistributorError> {
        let route = format!("/api/v1/fsm/distributor_instance/{distributor_instance_id}/active_instances");
        let (_, content) = self.requester.get(&route, &[]).await?;
        parse(content)
    }

    pub async fn get_triaging_instances(&self, distributor_instance_id: i64) -> Result<Vec<TaskInstanceRow>, DistributorError> {
        let route = format!("/api/v1/fsm/distributor_instance/{distributor_instance_id}/triaging_instances");
        let (_, content) = self.requester.get(&route, &[]).await?;
        parse(content)
    }

    pub async fn complete_task_instance(&self, task_instance_id: i64) -> Result<(), DistributorError> {
        let route = format!("/api/v1/fsm/task_instance/{task_instance_id}/complete");
        self.requester.post(&route, &serde_json::json!({})).await?;
        Ok(())
    }

    pub async fn log_known_error(&self, task_instance_id: i64, status: db::models::TaskInstanceStatus, description: &str) -> Result<(), DistributorError> {
        let route = format!("/api/v1/fsm/task_instance/{task_instance_id}/log_error");
        self.requester.post(&route, &LogErrorDto { status, description }).await?;
        Ok(())
    }

    pub async fn log_unknown_error(&self, task_instance_id: i64, description: &str) -> Result<(), DistributorError> {
        let route = format!("/api/v1/fsm/task_instance/{task_instance_id}/log_unknown_error");
        #[derive(Serialize)]
        struct Dto<'a> { description: &'a str }
        self.requester.post(&route, &Dto { description }).await?;
        Ok(())
    }
}

fn parse<T: serde::de::DeserializeOwned>(content: serde_json::Value) -> Result<T, DistributorError> {
    serde_json::from_value(content).map_err(|e| DistributorError::MalformedResponse(e.to_string()))
}
