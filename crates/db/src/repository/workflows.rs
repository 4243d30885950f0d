//! Workflow repository functions.
//!
//! `bind_workflow` is find-or-create on `(tool_version_id,
//! workflow_args_hash)` — resuming with the same workflow args returns
//! the existing row so the caller (the Workflow-Run Factory,
//! `swarm::factory`) can decide whether a resume is needed.

use sqlx::PgPool;

use crate::{
    models::{WorkflowRow, WorkflowStatus},
    DbError,
};

/// Find-or-create a Workflow by `(tool_version_id, workflow_args_hash)`.
/// Does not enforce resume rules — see `swarm::factory::bind_and_resume`.
pub async fn bind_workflow(
    pool: &PgPool,
    tool_version_id: i64,
    dag_id: i64,
    workflow_args_hash: &str,
    task_hash: &str,
    name: Option<&str>,
    max_concurrently_running: i32,
) -> Result<WorkflowRow, DbError> {
    let mut tx = pool.begin().await?;

    let existing = sqlx::query_as!(
        WorkflowRow,
        r#"
        SELECT id, tool_version_id, dag_id, workflow_args_hash, task_hash, name,
               max_concurrently_running, status as "status: WorkflowStatus", status_date
        FROM workflow
        WHERE tool_version_id = $1 AND workflow_args_hash = $2
        "#,
        tool_version_id,
        workflow_args_hash,
    )
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(row) = existing {
        tx.commit().await?;
        return Ok(row);
    }

    let row = sqlx::query_as!(
        WorkflowRow,
        r#"
        INSERT INTO workflow
            (tool_version_id, dag_id, workflow_args_hash, task_hash, name, max_concurrently_running)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, tool_version_id, dag_id, workflow_args_hash, task_hash, name,
                  max_concurrently_running, status as "status: WorkflowStatus", status_date
        "#,
        tool_version_id,
        dag_id,
        workflow_args_hash,
        task_hash,
        name,
        max_concurrently_running,
    )
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row)
}

pub async fn get_workflow(pool: &PgPool, id: i64) -> Result<WorkflowRow, DbError> {
    let row = sqlx::query_as!(
        WorkflowRow,
        r#"
        SELECT id, tool_version_id, dag_id, workflow_args_hash, task_hash, name,
               max_concurrently_running, status as "status: WorkflowStatus", status_date
        FROM workflow WHERE id = $1
        "#,
        id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

pub async fn set_workflow_status(
    pool: &PgPool,
    id: i64,
    status: WorkflowStatus,
) -> Result<(), DbError> {
    sqlx::query!(
        r#"UPDATE workflow SET status = $1, status_date = now() WHERE id = $2"#,
        status as WorkflowStatus,
        id,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// `workflow.ready_to_link`: false while a current WorkflowRun is
/// QUEUED/RUNNING/DONE, which prevents a second run from linking against
/// a workflow that's already in flight or finished.
pub async fn ready_to_link(pool: &PgPool, workflow_id: i64) -> Result<bool, DbError> {
    let blocking = sqlx::query_scalar!(
        r#"
        SELECT count(*) FROM workflow_run
        WHERE workflow_id = $1 AND status IN ('Q', 'R', 'D')
        "#,
        workflow_id,
    )
    .fetch_one(pool)
    .await?
    .unwrap_or(0);

    Ok(blocking == 0)
}

/// `fix_status_inconsistency`: workflows stuck in FAILED whose tasks are
/// all DONE get flipped to DONE. Guards against the FSM race between a
/// task's error path and the workflow-level rollup. `start_id`/`step`
/// page through the workflow table so a reaper tick doesn't scan it in
/// full each time.
pub async fn fix_status_inconsistency(
    pool: &PgPool,
    start_id: i64,
    step: i64,
) -> Result<(Vec<i64>, i64), DbError> {
    let max_id = sqlx::query_scalar!(r#"SELECT max(id) FROM workflow"#)
        .fetch_one(pool)
        .await?
        .unwrap_or(0);

    let mut next_start = start_id + step;
    if next_start > max_id {
        next_start = 0;
    }

    let candidates: Vec<i64> = sqlx::query_scalar!(
        r#"
        SELECT w.id
        FROM workflow w
        WHERE w.id > $1 AND w.id <= $1 + $2 AND w.status = 'F'
          AND EXISTS (SELECT 1 FROM task t WHERE t.workflow_id = w.id)
          AND NOT EXISTS (
              SELECT 1 FROM task t WHERE t.workflow_id = w.id AND t.status <> 'D'
          )
        "#,
        start_id,
        step,
    )
    .fetch_all(pool)
    .await?;

    if !candidates.is_empty() {
        sqlx::query!(
            r#"UPDATE workflow SET status = 'D', status_date = now() WHERE id = ANY($1)"#,
            &candidates,
        )
        .execute(pool)
        .await?;
    }

    Ok((candidates, next_start))
}
