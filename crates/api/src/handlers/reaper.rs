//! Reaper API — the handful of endpoints the standalone reaper process
//! calls on its sweep loop. Every one of these is idempotent: calling it
//! twice on an already-handled row is a no-op.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use db::repository::{distributor_instances, workflow_runs, workflows};

use crate::error::ApiError;
use crate::AppState;

pub async fn get_lost_workflow_runs(
    State(state): State<AppState>,
) -> Result<Json<Vec<db::models::WorkflowRunRow>>, ApiError> {
    Ok(Json(workflow_runs::get_lost_workflow_runs(&state.pool).await?))
}

#[derive(Serialize)]
pub struct ReapWorkflowRunResponse {
    pub reaped_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub async fn reap_workflow_run(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<ReapWorkflowRunResponse>, ApiError> {
    let reaped_at = workflow_runs::reap_workflow_run(&state.pool, id).await?;
    Ok(Json(ReapWorkflowRunResponse { reaped_at }))
}

#[derive(Deserialize)]
pub struct FixStatusInconsistencyDto {
    pub start_id: i64,
    pub step: i64,
}

#[derive(Serialize)]
pub struct FixStatusInconsistencyResponse {
    pub fixed: Vec<i64>,
    pub next_start_id: i64,
}

pub async fn fix_status_inconsistency(
    State(state): State<AppState>,
    Json(dto): Json<FixStatusInconsistencyDto>,
) -> Result<Json<FixStatusInconsistencyResponse>, ApiError> {
    let (fixed, next_start_id) =
        workflows::fix_status_inconsistency(&state.pool, dto.start_id, dto.step).await?;
    Ok(Json(FixStatusInconsistencyResponse { fixed, next_start_id }))
}

pub async fn sweep_expunged_distributors(
    State(state): State<AppState>,
) -> Result<Json<Vec<i64>>, ApiError> {
    Ok(Json(distributor_instances::sweep_expunged(&state.pool).await?))
}
