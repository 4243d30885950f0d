//! Thin wrapper over `client::Requester` for the reaper's own routes.

use client::Requester;
use db::models::WorkflowRunRow;
use serde::{Deserialize, Serialize};

use crate::error::ReaperError;

pub struct Gateway {
    requester: Requester,
}

#[derive(Deserialize)]
pub struct ReapResponse {
    pub reaped_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Serialize)]
struct FixStatusInconsistencyDto {
    start_id: i64,
    step: i64,
}

#[derive(Deserialize)]
pub struct FixStatusInconsistencyResponse {
    pub fixed: Vec<i64>,
    pub next_start_id: i64,
}

impl Gateway {
    pub fn new(requester: Requester) -> Self {
        Self { requester }
    }

    pub async fn get_lost_workflow_runs(&self) -> Result<Vec<WorkflowRunRow>, ReaperError> {
        let (_, content) = self.requester.get("/api/v1/reaper/workflow_run/lost", &[]).await?;
        parse(content)
    }

    pub async fn reap_workflow_run(&self, id: i64) -> Result<ReapResponse, ReaperError> {
        let route = format!("/api/v1/reaper/workflow_run/{id}/reap");
        let (_, content) = self.requester.post(&route, &serde_json::json!({})).await?;
        parse(content)
    }

    pub async fn fix_status_inconsistency(
        &self,
        start_id: i64,
        step: i64,
    ) -> Result<FixStatusInconsistencyResponse, ReaperError> {
        let (_, content) = self
            .requester
            .post("/api/v1/reaper/workflow/fix_status_inconsistency", &FixStatusInconsistencyDto { start_id, step })
            .await?;
        parse(content)
    }

    pub async fn sweep_expunged_distributors(&self) -> Result<Vec<i64>, ReaperError> {
        let (_, content) = self
            .requester
            .post("/api/v1/reaper/distributor_instance/sweep_expunged", &serde_json::json!({}))
            .await?;
        parse(content)
    }
}

fn parse<T: serde::de::DeserializeOwned>(content: serde_json::Value) -> Result<T, ReaperError> {
    serde_json::from_value(content).map_err(|e| ReaperError::MalformedResponse(e.to_string()))
}
