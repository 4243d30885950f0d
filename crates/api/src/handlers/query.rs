//! CLI/Query API — read-only lookups the `jobmon` CLI and the swarm's
//! resume path use; no status is ever mutated here.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use db::repository::{batches, tasks, task_instances, workflow_runs, workflows};

use crate::error::ApiError;
use crate::AppState;

#[derive(Serialize)]
pub struct TaskStatusRow {
    pub id: i64,
    pub status: db::models::TaskStatus,
}

pub async fn task_statuses_for_workflow_run(
    Path(workflow_run_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Vec<TaskStatusRow>>, ApiError> {
    let run = workflow_runs::get_workflow_run(&state.pool, workflow_run_id).await?;
    let rows = tasks::get_statuses_for_workflow(&state.pool, run.workflow_id).await?;
    Ok(Json(
        rows.into_iter().map(|(id, status)| TaskStatusRow { id, status }).collect(),
    ))
}

pub async fn get_workflow(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<db::models::WorkflowRow>, ApiError> {
    Ok(Json(workflows::get_workflow(&state.pool, id).await?))
}

pub async fn get_workflow_run(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<db::models::WorkflowRunRow>, ApiError> {
    Ok(Json(workflow_runs::get_workflow_run(&state.pool, id).await?))
}

pub async fn get_task(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<db::models::TaskRow>, ApiError> {
    Ok(Json(tasks::get_task(&state.pool, id).await?))
}

pub async fn get_task_instance(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<db::models::TaskInstanceRow>, ApiError> {
    Ok(Json(task_instances::get_task_instance(&state.pool, id).await?))
}

pub async fn task_dependencies_down(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Vec<i64>>, ApiError> {
    Ok(Json(tasks::tasks_recursive_down(&state.pool, id).await?))
}

pub async fn task_dependencies_up(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Vec<i64>>, ApiError> {
    Ok(Json(tasks::tasks_recursive_up(&state.pool, id).await?))
}

/// Every task bound under a workflow — what a swarm loads, once, to build
/// its in-memory task graph before the scheduling loop starts.
pub async fn list_tasks_for_workflow(
    Path(workflow_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Vec<db::models::TaskRow>>, ApiError> {
    Ok(Json(batches::list_tasks_for_workflow(&state.pool, workflow_id).await?))
}

pub async fn list_arrays_for_workflow(
    Path(workflow_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Vec<db::models::ArrayRow>>, ApiError> {
    Ok(Json(batches::list_arrays_for_workflow(&state.pool, workflow_id).await?))
}
