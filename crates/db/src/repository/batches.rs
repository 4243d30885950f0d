//! Batch-level read queries the distributor needs to find work and to
//! build the backend submission for what it finds, plus the array/task
//! lookups a swarm needs to build its in-memory task graph.

use serde::Serialize;
use sqlx::PgPool;

use crate::{
    models::{ArrayRow, BatchRow, TaskInstanceRow, TaskInstanceStatus, TaskResourcesRow, TaskRow, TaskStatus},
    DbError,
};

/// One array step's worth of submission material: the task/instance ids
/// plus the rendered command, ready to hand to a `ClusterDriver`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchStep {
    pub task_instance_id: i64,
    pub array_step_id: i32,
    pub command: String,
}

/// Batches queued on this workflow run that no distributor has claimed
/// yet — `distributor_instance_id IS NULL` on the batch itself, joined
/// through `task_instance` since batch carries no `workflow_run_id`.
pub async fn get_unclaimed_batches(
    pool: &PgPool,
    workflow_run_id: i64,
) -> Result<Vec<BatchRow>, DbError> {
    let rows = sqlx::query_as!(
        BatchRow,
        r#"
        SELECT DISTINCT b.id, b.array_id, b.task_resources_id, b.distributor_instance_id
        FROM batch b
        JOIN task_instance ti ON ti.batch_id = b.id
        WHERE ti.workflow_run_id = $1 AND b.distributor_instance_id IS NULL
        "#,
        workflow_run_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Idempotent lookup/insert of an Array by `(workflow_id, task_template_version_id)`,
/// the same find-or-create shape `tool::bind_task_template` uses.
pub async fn bind_array(
    pool: &PgPool,
    workflow_id: i64,
    task_template_version_id: i64,
    name: &str,
    max_concurrently_running: Option<i32>,
) -> Result<ArrayRow, DbError> {
    sqlx::query!(
        r#"
        INSERT INTO array (workflow_id, task_template_version_id, name, max_concurrently_running)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (workflow_id, task_template_version_id) DO NOTHING
        "#,
        workflow_id,
        task_template_version_id,
        name,
        max_concurrently_running,
    )
    .execute(pool)
    .await?;

    let row = sqlx::query_as!(
        ArrayRow,
        r#"
        SELECT id, workflow_id, task_template_version_id, name, max_concurrently_running
        FROM array
        WHERE workflow_id = $1 AND task_template_version_id = $2
        "#,
        workflow_id,
        task_template_version_id,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// All arrays bound under a workflow — what a swarm loads to learn each
/// array's concurrency limit before building its ready queue.
pub async fn list_arrays_for_workflow(pool: &PgPool, workflow_id: i64) -> Result<Vec<ArrayRow>, DbError> {
    let rows = sqlx::query_as!(
        ArrayRow,
        r#"
        SELECT id, workflow_id, task_template_version_id, name, max_concurrently_running
        FROM array
        WHERE workflow_id = $1
        "#,
        workflow_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Every task bound under a workflow — the full rows a swarm needs to
/// build its in-memory `SwarmTask` graph, not just `(id, status)`.
pub async fn list_tasks_for_workflow(pool: &PgPool, workflow_id: i64) -> Result<Vec<TaskRow>, DbError> {
    let rows = sqlx::query_as!(
        TaskRow,
        r#"
        SELECT id, workflow_id, node_id, array_id, task_args_hash, command,
               num_attempts, max_attempts, task_resources_id, resource_scales,
               status as "status: TaskStatus", status_date
        FROM task
        WHERE workflow_id = $1
        "#,
        workflow_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn get_array(pool: &PgPool, array_id: i64) -> Result<ArrayRow, DbError> {
    let row = sqlx::query_as!(
        ArrayRow,
        r#"SELECT id, workflow_id, task_template_version_id, name, max_concurrently_running
           FROM array WHERE id = $1"#,
        array_id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

pub async fn get_task_resources(pool: &PgPool, id: i64) -> Result<TaskResourcesRow, DbError> {
    let row = sqlx::query_as!(
        TaskResourcesRow,
        r#"SELECT id, queue, requested_resources, hash FROM task_resources WHERE id = $1"#,
        id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Every step of a batch, command rendered from the owning task, in
/// `array_step_id` order so submission order matches what `queue_task_batch`
/// assigned.
pub async fn get_batch_steps(pool: &PgPool, batch_id: i64) -> Result<Vec<BatchStep>, DbError> {
    let rows = sqlx::query_as!(
        BatchStep,
        r#"
        SELECT ti.id as task_instance_id, ti.array_step_id, t.command
        FROM task_instance ti
        JOIN task t ON t.id = ti.task_id
        WHERE ti.batch_id = $1
        ORDER BY ti.array_step_id
        "#,
        batch_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Every `(task_instance_id, distributor_id)` still attributed to a
/// distributor instance and not yet terminal — what a poll loop tracks.
pub async fn get_active_instances_for_distributor(
    pool: &PgPool,
    distributor_instance_id: i64,
) -> Result<Vec<(i64, String)>, DbError> {
    let rows = sqlx::query!(
        r#"
        SELECT ti.id, ti.distributor_id
        FROM task_instance ti
        JOIN batch b ON b.id = ti.batch_id
        WHERE b.distributor_instance_id = $1
          AND ti.status IN ('O', 'R')
          AND ti.distributor_id IS NOT NULL
        "#,
        distributor_instance_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().filter_map(|r| r.distributor_id.map(|d| (r.id, d))).collect())
}

/// Task instances this distributor owns that the server has moved to
/// TRIAGING — ones the distributor must classify against its backend
/// (resource error, unknown error, or a recoverable one) before the
/// workflow's scheduler can act on them.
pub async fn get_triaging_instances(
    pool: &PgPool,
    distributor_instance_id: i64,
) -> Result<Vec<TaskInstanceRow>, DbError> {
    let rows = sqlx::query_as!(
        TaskInstanceRow,
        r#"
        SELECT ti.id, ti.task_id, ti.workflow_run_id, ti.batch_id, ti.array_step_id,
               ti.distributor_id, ti.status as "status: TaskInstanceStatus", ti.status_date,
               ti.submitted_date, ti.report_by_date, ti.stdout, ti.stderr, ti.wallclock, ti.maxrss
        FROM task_instance ti
        JOIN batch b ON b.id = ti.batch_id
        WHERE b.distributor_instance_id = $1 AND ti.status = 'T'
        "#,
        distributor_instance_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
