//! WorkflowRun repository functions.
//!
//! A WorkflowRun is the single live claim on a Workflow's tasks.
//! `link_workflow_run` carries the LINKING race-guard: only one
//! concurrent run may reach RUNNING, the rest are told to terminate.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    models::{WorkflowRunRow, WorkflowRunStatus},
    DbError,
};

pub async fn create_workflow_run(
    pool: &PgPool,
    workflow_id: i64,
    jobmon_server_version: &str,
) -> Result<WorkflowRunRow, DbError> {
    let row = sqlx::query_as!(
        WorkflowRunRow,
        r#"
        INSERT INTO workflow_run (workflow_id, jobmon_server_version)
        VALUES ($1, $2)
        RETURNING id, workflow_id, jobmon_server_version,
                  status as "status: WorkflowRunStatus", status_date, heartbeat_date
        "#,
        workflow_id,
        jobmon_server_version,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_workflow_run(pool: &PgPool, id: i64) -> Result<WorkflowRunRow, DbError> {
    let row = sqlx::query_as!(
        WorkflowRunRow,
        r#"
        SELECT id, workflow_id, jobmon_server_version,
               status as "status: WorkflowRunStatus", status_date, heartbeat_date
        FROM workflow_run WHERE id = $1
        "#,
        id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Attempt to move this run from REGISTERED to LINKING, and terminate any
/// other run on the same workflow that is still in an earlier, non-terminal
/// state — hot and cold resumes of the same workflow cannot both win.
pub async fn link_workflow_run(pool: &PgPool, id: i64) -> Result<WorkflowRunRow, DbError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as!(
        WorkflowRunRow,
        r#"
        SELECT id, workflow_id, jobmon_server_version,
               status as "status: WorkflowRunStatus", status_date, heartbeat_date
        FROM workflow_run WHERE id = $1 FOR UPDATE NOWAIT
        "#,
        id,
    )
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    sqlx::query!(
        r#"
        UPDATE workflow_run SET status = 'T', status_date = now()
        WHERE workflow_id = $1 AND id <> $2 AND status IN ('G', 'L', 'B', 'I')
        "#,
        row.workflow_id,
        id,
    )
    .execute(&mut *tx)
    .await?;

    let linked = sqlx::query_as!(
        WorkflowRunRow,
        r#"
        UPDATE workflow_run SET status = 'L', status_date = now()
        WHERE id = $1
        RETURNING id, workflow_id, jobmon_server_version,
                  status as "status: WorkflowRunStatus", status_date, heartbeat_date
        "#,
        id,
    )
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(linked)
}

pub async fn set_workflow_run_status(
    pool: &PgPool,
    id: i64,
    status: WorkflowRunStatus,
) -> Result<(), DbError> {
    sqlx::query!(
        r#"UPDATE workflow_run SET status = $1, status_date = now() WHERE id = $2"#,
        status as WorkflowRunStatus,
        id,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a heartbeat from the swarm's `HeartbeatService`, pushing
/// `heartbeat_date` forward so this run doesn't get reaped.
pub async fn log_heartbeat(
    pool: &PgPool,
    id: i64,
    next_report_increment: f64,
) -> Result<(), DbError> {
    sqlx::query!(
        r#"
        UPDATE workflow_run
        SET heartbeat_date = now() + make_interval(secs => $2)
        WHERE id = $1
        "#,
        id,
        next_report_increment,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Runs whose heartbeat has lapsed while still claiming to be live —
/// candidates for the reaper's lost-workflow-run sweep.
pub async fn get_lost_workflow_runs(pool: &PgPool) -> Result<Vec<WorkflowRunRow>, DbError> {
    let rows = sqlx::query_as!(
        WorkflowRunRow,
        r#"
        SELECT id, workflow_id, jobmon_server_version,
               status as "status: WorkflowRunStatus", status_date, heartbeat_date
        FROM workflow_run
        WHERE status IN ('L', 'B', 'I', 'O', 'R') AND heartbeat_date < now()
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Transition a lost run to ERROR and its workflow back to a resumable
/// state, mirroring the reaper's `_transition_lost_workflow_runs` handler.
pub async fn reap_workflow_run(
    pool: &PgPool,
    id: i64,
) -> Result<Option<DateTime<Utc>>, DbError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query!(
        r#"
        SELECT status FROM workflow_run WHERE id = $1 FOR UPDATE NOWAIT
        "#,
        id,
    )
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        tx.commit().await?;
        return Ok(None);
    };

    if !matches!(row.status.as_str(), "L" | "B" | "I" | "O" | "R") {
        tx.commit().await?;
        return Ok(None);
    }

    sqlx::query!(
        r#"UPDATE workflow_run SET status = 'E', status_date = now() WHERE id = $1"#,
        id,
    )
    .execute(&mut *tx)
    .await?;

    let reaped_at = sqlx::query_scalar!(r#"SELECT now()"#)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(reaped_at)
}
