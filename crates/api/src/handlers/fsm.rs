//! FSM API — everything a client binding a workflow, or a swarm/distributor
//! driving one, calls to mutate state. Mirrors the route grouping the
//! routes/fsm directory uses: tool namespace, dag/node, workflow,
//! workflow_run, task/batch, task_instance, distributor_instance.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use db::models::{TaskInstanceStatus, TaskStatus};
use db::repository::{
    batches, distributor_instances, task_instances, task_resources, tasks, tool, workflow_runs,
    workflows,
};

use crate::error::ApiError;
use crate::AppState;

// ---------------------------------------------------------------------------
// Tool / ToolVersion
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct BindToolDto {
    pub name: String,
}

pub async fn bind_tool(
    State(state): State<AppState>,
    Json(dto): Json<BindToolDto>,
) -> Result<Json<db::models::ToolRow>, ApiError> {
    Ok(Json(tool::bind_tool(&state.pool, &dto.name).await?))
}

#[derive(Deserialize)]
pub struct BindToolVersionDto {
    pub tool_id: i64,
}

pub async fn bind_tool_version(
    State(state): State<AppState>,
    Json(dto): Json<BindToolVersionDto>,
) -> Result<Json<db::models::ToolVersionRow>, ApiError> {
    Ok(Json(tool::bind_tool_version(&state.pool, dto.tool_id).await?))
}

#[derive(Deserialize)]
pub struct BindTaskTemplateDto {
    pub tool_version_id: i64,
    pub name: String,
}

pub async fn bind_task_template(
    State(state): State<AppState>,
    Json(dto): Json<BindTaskTemplateDto>,
) -> Result<Json<db::models::TaskTemplateRow>, ApiError> {
    let row = tool::bind_task_template(&state.pool, dto.tool_version_id, &dto.name).await?;
    Ok(Json(row))
}

#[derive(Deserialize)]
pub struct BindTaskTemplateVersionDto {
    pub task_template_id: i64,
    pub command_template: String,
    pub arg_mapping_hash: String,
}

pub async fn bind_task_template_version(
    State(state): State<AppState>,
    Json(dto): Json<BindTaskTemplateVersionDto>,
) -> Result<Json<db::models::TaskTemplateVersionRow>, ApiError> {
    let row = tool::bind_task_template_version(
        &state.pool,
        dto.task_template_id,
        &dto.command_template,
        &dto.arg_mapping_hash,
    )
    .await?;
    Ok(Json(row))
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct BindWorkflowDto {
    pub tool_version_id: i64,
    pub dag_id: i64,
    pub workflow_args_hash: String,
    pub task_hash: String,
    pub name: Option<String>,
    pub max_concurrently_running: i32,
}

pub async fn bind_workflow(
    State(state): State<AppState>,
    Json(dto): Json<BindWorkflowDto>,
) -> Result<Json<db::models::WorkflowRow>, ApiError> {
    let row = workflows::bind_workflow(
        &state.pool,
        dto.tool_version_id,
        dto.dag_id,
        &dto.workflow_args_hash,
        &dto.task_hash,
        dto.name.as_deref(),
        dto.max_concurrently_running,
    )
    .await?;
    Ok(Json(row))
}

pub async fn ready_to_link(
    Path(workflow_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<bool>, ApiError> {
    Ok(Json(workflows::ready_to_link(&state.pool, workflow_id).await?))
}

// ---------------------------------------------------------------------------
// WorkflowRun
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateWorkflowRunDto {
    pub workflow_id: i64,
    pub jobmon_server_version: String,
}

pub async fn create_workflow_run(
    State(state): State<AppState>,
    Json(dto): Json<CreateWorkflowRunDto>,
) -> Result<Json<db::models::WorkflowRunRow>, ApiError> {
    let row = workflow_runs::create_workflow_run(
        &state.pool,
        dto.workflow_id,
        &dto.jobmon_server_version,
    )
    .await?;
    Ok(Json(row))
}

pub async fn link_workflow_run(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<db::models::WorkflowRunRow>, ApiError> {
    Ok(Json(workflow_runs::link_workflow_run(&state.pool, id).await?))
}

#[derive(Deserialize)]
pub struct HeartbeatDto {
    pub next_report_increment: f64,
}

#[derive(Serialize)]
pub struct HeartbeatResponse {
    pub status: db::models::WorkflowRunStatus,
}

/// Logging a heartbeat also hands back the run's current status, so a
/// swarm's `HeartbeatService` learns about a server-issued pause/resume
/// without a separate poll.
pub async fn log_workflow_run_heartbeat(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(dto): Json<HeartbeatDto>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    workflow_runs::log_heartbeat(&state.pool, id, dto.next_report_increment).await?;
    let row = workflow_runs::get_workflow_run(&state.pool, id).await?;
    Ok(Json(HeartbeatResponse { status: row.status }))
}

#[derive(Deserialize)]
pub struct BindTaskResourcesDto {
    pub queue: String,
    pub requested_resources: serde_json::Value,
    pub hash: String,
}

pub async fn bind_task_resources(
    State(state): State<AppState>,
    Json(dto): Json<BindTaskResourcesDto>,
) -> Result<Json<db::models::TaskResourcesRow>, ApiError> {
    let row = task_resources::bind_task_resources(
        &state.pool,
        &dto.queue,
        dto.requested_resources,
        &dto.hash,
    )
    .await?;
    Ok(Json(row))
}

#[derive(Deserialize)]
pub struct RepointTaskResourcesDto {
    pub new_task_resources_id: i64,
}

pub async fn repoint_task_resources(
    Path(task_id): Path<i64>,
    State(state): State<AppState>,
    Json(dto): Json<RepointTaskResourcesDto>,
) -> Result<(), ApiError> {
    task_resources::repoint_task_resources(&state.pool, task_id, dto.new_task_resources_id).await?;
    Ok(())
}

/// Resume protocol step 4: bump resources for every task whose most
/// recent TaskInstance landed in RESOURCE_ERROR, before the new
/// WorkflowRun starts. Shares its scaling math with the live Resource
/// Adjuster (`engine::resource_scale`) even though this runs once, up
/// front, for a whole workflow rather than per-tick.
pub async fn increase_resources(
    Path(workflow_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<usize>, ApiError> {
    let tasks = tasks::get_tasks_with_latest_ti_status(
        &state.pool,
        workflow_id,
        TaskInstanceStatus::ResourceError,
    )
    .await?;

    let mut adjusted = 0;
    for task in tasks {
        let current = task_resources::get_task_resources(&state.pool, task.task_resources_id).await?;
        let step = (task.num_attempts.max(1) - 1) as usize;
        let scaled =
            engine::resource_scale::scale_resources(&current.requested_resources, &task.resource_scales, step);
        let hash = engine::resource_scale::resources_hash(&current.queue, &scaled);

        let new_resources =
            task_resources::bind_task_resources(&state.pool, &current.queue, scaled, &hash).await?;
        task_resources::repoint_task_resources(&state.pool, task.id, new_resources.id).await?;
        adjusted += 1;
    }

    Ok(Json(adjusted))
}

// ---------------------------------------------------------------------------
// Array
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct BindArrayDto {
    pub workflow_id: i64,
    pub task_template_version_id: i64,
    pub name: String,
    pub max_concurrently_running: Option<i32>,
}

pub async fn bind_array(
    State(state): State<AppState>,
    Json(dto): Json<BindArrayDto>,
) -> Result<Json<db::models::ArrayRow>, ApiError> {
    let row = batches::bind_array(
        &state.pool,
        dto.workflow_id,
        dto.task_template_version_id,
        &dto.name,
        dto.max_concurrently_running,
    )
    .await?;
    Ok(Json(row))
}

// ---------------------------------------------------------------------------
// Task / Batch
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct NewTaskDto {
    pub node_id: i64,
    pub array_id: i64,
    pub task_args_hash: String,
    pub command: String,
    pub max_attempts: i32,
    pub task_resources_id: i64,
    pub resource_scales: serde_json::Value,
}

#[derive(Deserialize)]
pub struct BindTasksDto {
    pub workflow_id: i64,
    pub tasks: Vec<NewTaskDto>,
}

pub async fn bind_tasks(
    State(state): State<AppState>,
    Json(dto): Json<BindTasksDto>,
) -> Result<Json<Vec<db::models::TaskRow>>, ApiError> {
    let new_tasks: Vec<tasks::NewTask> = dto
        .tasks
        .into_iter()
        .map(|t| tasks::NewTask {
            node_id: t.node_id,
            array_id: t.array_id,
            task_args_hash: t.task_args_hash,
            command: t.command,
            max_attempts: t.max_attempts,
            task_resources_id: t.task_resources_id,
            resource_scales: t.resource_scales,
        })
        .collect();

    let rows = tasks::bind_tasks(&state.pool, dto.workflow_id, &new_tasks).await?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
pub struct QueueTaskBatchDto {
    pub array_id: i64,
    pub task_resources_id: i64,
    pub workflow_run_id: i64,
    pub task_ids: Vec<i64>,
}

#[derive(Serialize)]
pub struct QueueTaskBatchResponse {
    pub batch: db::models::BatchRow,
    pub task_instances: Vec<db::models::TaskInstanceRow>,
}

pub async fn queue_task_batch(
    State(state): State<AppState>,
    Json(dto): Json<QueueTaskBatchDto>,
) -> Result<Json<QueueTaskBatchResponse>, ApiError> {
    let (batch, task_instances) = tasks::queue_task_batch(
        &state.pool,
        dto.array_id,
        dto.task_resources_id,
        dto.workflow_run_id,
        &dto.task_ids,
    )
    .await?;
    Ok(Json(QueueTaskBatchResponse { batch, task_instances }))
}

#[derive(Deserialize)]
pub struct TransitionBatchLaunchedDto {
    pub distributor_instance_id: i64,
}

pub async fn transition_batch_to_launched(
    Path(batch_id): Path<i64>,
    State(state): State<AppState>,
    Json(dto): Json<TransitionBatchLaunchedDto>,
) -> Result<(), ApiError> {
    tasks::transition_batch_to_launched(&state.pool, batch_id, dto.distributor_instance_id).await?;
    Ok(())
}

#[derive(Deserialize)]
pub struct TaskUpdateStatusesDto {
    pub task_ids: Vec<i64>,
    pub valid_source_statuses: Vec<TaskStatus>,
    pub target_status: TaskStatus,
    pub bulk: bool,
}

pub async fn task_update_statuses(
    State(state): State<AppState>,
    Json(dto): Json<TaskUpdateStatusesDto>,
) -> Result<Json<db::repository::TransitionOutcome<i64>>, ApiError> {
    let lock_policy = if dto.bulk {
        db::repository::LockPolicy::SkipLocked
    } else {
        db::repository::LockPolicy::Nowait
    };

    let outcome = tasks::task_update_statuses(
        &state.pool,
        &dto.task_ids,
        &dto.valid_source_statuses,
        dto.target_status,
        lock_policy,
    )
    .await?;
    Ok(Json(outcome))
}

// ---------------------------------------------------------------------------
// TaskInstance
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct LogDistributorIdDto {
    pub task_instance_id: i64,
    pub distributor_id: String,
}

#[derive(Deserialize)]
pub struct LogDistributorIdsDto {
    pub updates: Vec<LogDistributorIdDto>,
}

pub async fn log_distributor_ids(
    State(state): State<AppState>,
    Json(dto): Json<LogDistributorIdsDto>,
) -> Result<(), ApiError> {
    let updates: Vec<task_instances::DistributorIdUpdate> = dto
        .updates
        .into_iter()
        .map(|u| task_instances::DistributorIdUpdate {
            task_instance_id: u.task_instance_id,
            distributor_id: u.distributor_id,
        })
        .collect();

    task_instances::log_distributor_ids(&state.pool, &updates).await?;
    Ok(())
}

pub async fn log_ti_heartbeat(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(dto): Json<HeartbeatDto>,
) -> Result<(), ApiError> {
    task_instances::log_ti_heartbeat(&state.pool, id, dto.next_report_increment).await?;
    Ok(())
}

pub async fn request_triage(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<(), ApiError> {
    task_instances::request_triage(&state.pool, id).await?;
    Ok(())
}

/// Bulk form a swarm's `Synchronizer` calls once per sync tick: every
/// task instance on this run whose heartbeat has lapsed moves to
/// TRIAGING in one request instead of one round-trip per instance.
pub async fn request_triage_for_workflow_run(
    Path(workflow_run_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<usize>, ApiError> {
    let overdue = task_instances::get_timed_out_task_instances(&state.pool, workflow_run_id).await?;
    for ti in &overdue {
        task_instances::request_triage(&state.pool, ti.id).await?;
    }
    Ok(Json(overdue.len()))
}

#[derive(Deserialize)]
pub struct LogErrorDto {
    pub status: TaskInstanceStatus,
    pub description: String,
}

pub async fn complete_task_instance(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<(), ApiError> {
    task_instances::complete_task_instance(&state.pool, id).await?;
    Ok(())
}

pub async fn log_known_error(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(dto): Json<LogErrorDto>,
) -> Result<Json<db::models::TaskInstanceErrorLogRow>, ApiError> {
    let row = task_instances::log_known_error(
        &state.pool,
        id,
        dto.status,
        &dto.description,
        engine::fsm::task_status_for_ti,
    )
    .await?;
    Ok(Json(row))
}

#[derive(Deserialize)]
pub struct LogUnknownErrorDto {
    pub description: String,
}

pub async fn log_unknown_error(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(dto): Json<LogUnknownErrorDto>,
) -> Result<Json<db::models::TaskInstanceErrorLogRow>, ApiError> {
    let row = task_instances::log_unknown_error(
        &state.pool,
        id,
        &dto.description,
        engine::fsm::task_status_for_ti,
    )
    .await?;
    Ok(Json(row))
}

// ---------------------------------------------------------------------------
// DistributorInstance
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RegisterDistributorDto {
    pub cluster_id: i64,
    pub workflow_run_id: Option<i64>,
    pub report_by_increment: f64,
}

pub async fn register_distributor_instance(
    State(state): State<AppState>,
    Json(dto): Json<RegisterDistributorDto>,
) -> Result<Json<db::models::DistributorInstanceRow>, ApiError> {
    let row = distributor_instances::register(
        &state.pool,
        dto.cluster_id,
        dto.workflow_run_id,
        dto.report_by_increment,
    )
    .await?;
    Ok(Json(row))
}

pub async fn log_distributor_instance_heartbeat(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(dto): Json<HeartbeatDto>,
) -> Result<(), ApiError> {
    distributor_instances::log_heartbeat(&state.pool, id, dto.next_report_increment).await?;
    Ok(())
}

#[derive(Deserialize)]
pub struct GetActiveDistributorQuery {
    pub workflow_run_id: i64,
}

pub async fn get_active_distributor_instance(
    Path(cluster_id): Path<i64>,
    State(state): State<AppState>,
    axum::extract::Query(q): axum::extract::Query<GetActiveDistributorQuery>,
) -> Result<Json<db::models::DistributorInstanceRow>, ApiError> {
    let row = distributor_instances::get_active(&state.pool, cluster_id, q.workflow_run_id).await?;
    Ok(Json(row))
}

// ---------------------------------------------------------------------------
// Batch discovery — what the distributor's submission loop polls.
// ---------------------------------------------------------------------------

pub async fn get_unclaimed_batches(
    Path(workflow_run_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Vec<db::models::BatchRow>>, ApiError> {
    let rows = batches::get_unclaimed_batches(&state.pool, workflow_run_id).await?;
    Ok(Json(rows))
}

pub async fn get_array(
    Path(array_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<db::models::ArrayRow>, ApiError> {
    Ok(Json(batches::get_array(&state.pool, array_id).await?))
}

pub async fn get_task_resources(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<db::models::TaskResourcesRow>, ApiError> {
    Ok(Json(batches::get_task_resources(&state.pool, id).await?))
}

pub async fn get_batch_steps(
    Path(batch_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Vec<batches::BatchStep>>, ApiError> {
    Ok(Json(batches::get_batch_steps(&state.pool, batch_id).await?))
}

#[derive(Serialize)]
pub struct ActiveInstance {
    pub task_instance_id: i64,
    pub distributor_id: String,
}

pub async fn get_active_instances(
    Path(distributor_instance_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Vec<ActiveInstance>>, ApiError> {
    let rows = batches::get_active_instances_for_distributor(&state.pool, distributor_instance_id)
        .await?;
    Ok(Json(
        rows.into_iter()
            .map(|(task_instance_id, distributor_id)| ActiveInstance { task_instance_id, distributor_id })
            .collect(),
    ))
}

pub async fn get_triaging_instances(
    Path(distributor_instance_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Vec<db::models::TaskInstanceRow>>, ApiError> {
    let rows = batches::get_triaging_instances(&state.pool, distributor_instance_id).await?;
    Ok(Json(rows))
}
