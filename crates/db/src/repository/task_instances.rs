//! TaskInstance repository functions — the distributor/worker report path.

use sqlx::PgPool;

use super::WRITE_CHUNK_SIZE;
use crate::{
    models::{TaskInstanceErrorLogRow, TaskInstanceRow, TaskInstanceStatus, TaskStatus},
    DbError,
};

pub async fn get_task_instance(pool: &PgPool, id: i64) -> Result<TaskInstanceRow, DbError> {
    let row = sqlx::query_as!(
        TaskInstanceRow,
        r#"
        SELECT id, task_id, workflow_run_id, batch_id, array_step_id, distributor_id,
               status as "status: TaskInstanceStatus", status_date, submitted_date,
               report_by_date, stdout, stderr, wallclock, maxrss
        FROM task_instance WHERE id = $1
        "#,
        id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// One `(task_instance_id, distributor_id)` pair reported back by the
/// distributor after a successful `qsub`/`sbatch`-equivalent submission.
pub struct DistributorIdUpdate {
    pub task_instance_id: i64,
    pub distributor_id: String,
}

/// Record backend job ids for a whole batch, chunked so no single
/// transaction holds the `task_instance` rows locked for too long.
pub async fn log_distributor_ids(
    pool: &PgPool,
    updates: &[DistributorIdUpdate],
) -> Result<(), DbError> {
    for chunk in updates.chunks(WRITE_CHUNK_SIZE) {
        let mut tx = pool.begin().await?;
        for u in chunk {
            sqlx::query!(
                r#"
                UPDATE task_instance
                SET distributor_id = $1, status = 'O', status_date = now(), submitted_date = now()
                WHERE id = $2 AND status IN ('Q', 'I')
                "#,
                u.distributor_id,
                u.task_instance_id,
            )
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
    }

    Ok(())
}

/// Extend `report_by_date` on a liveness heartbeat from a running worker.
/// `next_report_increment` is `interval * report_by_buffer`.
pub async fn log_ti_heartbeat(
    pool: &PgPool,
    task_instance_id: i64,
    next_report_increment: f64,
) -> Result<(), DbError> {
    sqlx::query!(
        r#"
        UPDATE task_instance
        SET report_by_date = now() + make_interval(secs => $2), status = 'R', status_date = now()
        WHERE id = $1
        "#,
        task_instance_id,
        next_report_increment,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark a task instance DONE and carry its task to DONE with it. One
/// instance per task per launch attempt in this design, so "the instance
/// finished" and "the task finished" coincide.
pub async fn complete_task_instance(pool: &PgPool, task_instance_id: i64) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query!(
        r#"UPDATE task_instance SET status = 'D', status_date = now() WHERE id = $1"#,
        task_instance_id,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query!(
        r#"
        UPDATE task SET status = 'D', status_date = now()
        WHERE id = (SELECT task_id FROM task_instance WHERE id = $1)
        "#,
        task_instance_id,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Task instances whose `report_by_date` has lapsed while still claiming
/// to be alive — candidates for triage.
pub async fn get_timed_out_task_instances(
    pool: &PgPool,
    workflow_run_id: i64,
) -> Result<Vec<TaskInstanceRow>, DbError> {
    let rows = sqlx::query_as!(
        TaskInstanceRow,
        r#"
        SELECT id, task_id, workflow_run_id, batch_id, array_step_id, distributor_id,
               status as "status: TaskInstanceStatus", status_date, submitted_date,
               report_by_date, stdout, stderr, wallclock, maxrss
        FROM task_instance
        WHERE workflow_run_id = $1
          AND status IN ('O', 'R')
          AND report_by_date < now()
        "#,
        workflow_run_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Move a task instance into TRIAGING so the distributor can classify why
/// it stopped heartbeating before deciding retry vs. resource-error vs.
/// unknown-error.
pub async fn request_triage(pool: &PgPool, task_instance_id: i64) -> Result<(), DbError> {
    sqlx::query!(
        r#"UPDATE task_instance SET status = 'T', status_date = now() WHERE id = $1 AND status IN ('O', 'R')"#,
        task_instance_id,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Log a known (recoverable or fatal) error for a task instance, and in
/// the same transaction drive the owning task's status with it —
/// `classify` is the server's authoritative `(ti_status, num_attempts,
/// max_attempts)` decision (normally `engine::fsm::task_status_for_ti`;
/// taken as a parameter rather than a direct call since `db` can't
/// depend on `engine`, which itself depends on `db` for the status
/// enums). The task row is locked for the read so a concurrent report
/// on a sibling instance can't race the classification.
pub async fn log_known_error(
    pool: &PgPool,
    task_instance_id: i64,
    status: TaskInstanceStatus,
    description: &str,
    classify: impl Fn(TaskInstanceStatus, i32, i32) -> TaskStatus,
) -> Result<TaskInstanceErrorLogRow, DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query!(
        r#"UPDATE task_instance SET status = $1, status_date = now() WHERE id = $2"#,
        status as TaskInstanceStatus,
        task_instance_id,
    )
    .execute(&mut *tx)
    .await?;

    let task = sqlx::query!(
        r#"
        SELECT id, num_attempts, max_attempts FROM task
        WHERE id = (SELECT task_id FROM task_instance WHERE id = $1)
        FOR UPDATE
        "#,
        task_instance_id,
    )
    .fetch_one(&mut *tx)
    .await?;

    let next_status = classify(status, task.num_attempts, task.max_attempts);

    sqlx::query!(
        r#"UPDATE task SET status = $1, status_date = now() WHERE id = $2"#,
        next_status as TaskStatus,
        task.id,
    )
    .execute(&mut *tx)
    .await?;

    let log = sqlx::query_as!(
        TaskInstanceErrorLogRow,
        r#"
        INSERT INTO task_instance_error_log (task_instance_id, description)
        VALUES ($1, $2)
        RETURNING id, task_instance_id, error_time, description
        "#,
        task_instance_id,
        description,
    )
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(log)
}

/// Unknown errors (no exit code / no log match) land in `UnknownError`
/// rather than a terminal status — they're retried like a recoverable
/// error but flagged distinctly for the CLI/UI.
pub async fn log_unknown_error(
    pool: &PgPool,
    task_instance_id: i64,
    description: &str,
    classify: impl Fn(TaskInstanceStatus, i32, i32) -> TaskStatus,
) -> Result<TaskInstanceErrorLogRow, DbError> {
    log_known_error(pool, task_instance_id, TaskInstanceStatus::UnknownError, description, classify).await
}
