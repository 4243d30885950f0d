//! Task repository functions — binding, queueing into batches, and the
//! bulk status-transition API used by the worker/task-instance report
//! paths.

use sqlx::PgPool;

use super::{LockPolicy, TransitionOutcome, MAX_BULK_IDS, WRITE_CHUNK_SIZE};
use crate::{
    models::{BatchRow, TaskInstanceRow, TaskInstanceStatus, TaskRow, TaskStatus},
    DbError,
};

/// One task to bind, as supplied by the client's DAG walk.
pub struct NewTask {
    pub node_id: i64,
    pub array_id: i64,
    pub task_args_hash: String,
    pub command: String,
    pub max_attempts: i32,
    pub task_resources_id: i64,
    pub resource_scales: serde_json::Value,
}

/// Bulk find-or-create on `(workflow_id, node_id, task_args_hash)`. Runs
/// one statement per task inside a single transaction — tasks are bound
/// once per workflow so this isn't on a hot path the way `add_nodes` is.
pub async fn bind_tasks(
    pool: &PgPool,
    workflow_id: i64,
    tasks: &[NewTask],
) -> Result<Vec<TaskRow>, DbError> {
    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    let mut tx = pool.begin().await?;
    let mut bound = Vec::with_capacity(tasks.len());

    for t in tasks {
        sqlx::query!(
            r#"
            INSERT INTO task
                (workflow_id, node_id, array_id, task_args_hash, command,
                 max_attempts, task_resources_id, resource_scales)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (workflow_id, node_id, task_args_hash) DO NOTHING
            "#,
            workflow_id,
            t.node_id,
            t.array_id,
            t.task_args_hash,
            t.command,
            t.max_attempts,
            t.task_resources_id,
            t.resource_scales,
        )
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as!(
            TaskRow,
            r#"
            SELECT id, workflow_id, node_id, array_id, task_args_hash, command,
                   num_attempts, max_attempts, task_resources_id, resource_scales,
                   status as "status: TaskStatus", status_date
            FROM task
            WHERE workflow_id = $1 AND node_id = $2 AND task_args_hash = $3
            "#,
            workflow_id,
            t.node_id,
            t.task_args_hash,
        )
        .fetch_one(&mut *tx)
        .await?;

        bound.push(row);
    }

    tx.commit().await?;
    Ok(bound)
}

/// `(task_id, status)` for every task in a workflow — what a swarm's
/// `Synchronizer` polls to learn about status changes it didn't cause
/// itself (another process's report, a reaper transition).
pub async fn get_statuses_for_workflow(
    pool: &PgPool,
    workflow_id: i64,
) -> Result<Vec<(i64, TaskStatus)>, DbError> {
    let rows = sqlx::query!(
        r#"SELECT id, status FROM task WHERE workflow_id = $1"#,
        workflow_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|r| TaskStatus::from_code(r.status.chars().next()?).map(|s| (r.id, s)))
        .collect())
}

pub async fn get_task(pool: &PgPool, id: i64) -> Result<TaskRow, DbError> {
    let row = sqlx::query_as!(
        TaskRow,
        r#"
        SELECT id, workflow_id, node_id, array_id, task_args_hash, command,
               num_attempts, max_attempts, task_resources_id, resource_scales,
               status as "status: TaskStatus", status_date
        FROM task WHERE id = $1
        "#,
        id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Atomically create a Batch and the TaskInstances for the given tasks,
/// transitioning each task QUEUED -> INSTANTIATING. `task_ids` must all
/// share `array_id`/`task_resources_id` — the caller (the Scheduler) is
/// responsible for the grouping; this function only applies the locking
/// and the dense, 0-based `array_step_id` assignment.
pub async fn queue_task_batch(
    pool: &PgPool,
    array_id: i64,
    task_resources_id: i64,
    workflow_run_id: i64,
    task_ids: &[i64],
) -> Result<(BatchRow, Vec<TaskInstanceRow>), DbError> {
    if task_ids.is_empty() {
        return Err(DbError::TooManyIds(0));
    }
    if task_ids.len() > MAX_BULK_IDS {
        return Err(DbError::TooManyIds(task_ids.len()));
    }

    let mut tx = pool.begin().await?;

    let locked: Vec<i64> = sqlx::query_scalar!(
        r#"
        SELECT id FROM task
        WHERE id = ANY($1) AND status = 'Q'
        FOR UPDATE SKIP LOCKED
        "#,
        task_ids,
    )
    .fetch_all(&mut *tx)
    .await?;

    let batch = sqlx::query_as!(
        BatchRow,
        r#"
        INSERT INTO batch (array_id, task_resources_id)
        VALUES ($1, $2)
        RETURNING id, array_id, task_resources_id, distributor_instance_id
        "#,
        array_id,
        task_resources_id,
    )
    .fetch_one(&mut *tx)
    .await?;

    let mut instances = Vec::with_capacity(locked.len());
    for chunk in locked.chunks(WRITE_CHUNK_SIZE) {
        for (offset, &task_id) in chunk.iter().enumerate() {
            let array_step_id = (instances.len() + offset) as i32;
            let row = sqlx::query_as!(
                TaskInstanceRow,
                r#"
                INSERT INTO task_instance (task_id, workflow_run_id, batch_id, array_step_id)
                VALUES ($1, $2, $3, $4)
                RETURNING id, task_id, workflow_run_id, batch_id, array_step_id,
                          distributor_id, status as "status: _", status_date,
                          submitted_date, report_by_date, stdout, stderr, wallclock, maxrss
                "#,
                task_id,
                workflow_run_id,
                batch.id,
                array_step_id,
            )
            .fetch_one(&mut *tx)
            .await?;
            instances.push(row);
        }

        sqlx::query!(
            r#"UPDATE task SET status = 'I', status_date = now(), num_attempts = num_attempts + 1
               WHERE id = ANY($1)"#,
            chunk,
        )
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok((batch, instances))
}

pub async fn transition_batch_to_launched(
    pool: &PgPool,
    batch_id: i64,
    distributor_instance_id: i64,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query!(
        r#"UPDATE batch SET distributor_instance_id = $1 WHERE id = $2"#,
        distributor_instance_id,
        batch_id,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query!(
        r#"
        UPDATE task SET status = 'O', status_date = now()
        WHERE id IN (SELECT task_id FROM task_instance WHERE batch_id = $1) AND status = 'I'
        "#,
        batch_id,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query!(
        r#"UPDATE task_instance SET status = 'O', status_date = now(), submitted_date = now()
           WHERE batch_id = $1 AND status = 'Q'"#,
        batch_id,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Bulk status transition used by the worker report path. Applies
/// `lock_policy`, classifying every input id into the four buckets a
/// caller needs to retry or give up on.
pub async fn task_update_statuses(
    pool: &PgPool,
    task_ids: &[i64],
    valid_source_statuses: &[TaskStatus],
    target_status: TaskStatus,
    lock_policy: LockPolicy,
) -> Result<TransitionOutcome<i64>, DbError> {
    if task_ids.len() > MAX_BULK_IDS {
        return Err(DbError::TooManyIds(task_ids.len()));
    }

    let mut outcome = TransitionOutcome::new();
    let mut tx = pool.begin().await?;

    let source_codes: Vec<String> = valid_source_statuses.iter().map(|s| s.code().to_string()).collect();

    let rows = match lock_policy {
        LockPolicy::Nowait => {
            sqlx::query!(
                r#"SELECT id, status FROM task WHERE id = ANY($1) FOR UPDATE NOWAIT"#,
                task_ids,
            )
            .fetch_all(&mut *tx)
            .await?
        }
        LockPolicy::SkipLocked => {
            sqlx::query!(
                r#"SELECT id, status FROM task WHERE id = ANY($1) FOR UPDATE SKIP LOCKED"#,
                task_ids,
            )
            .fetch_all(&mut *tx)
            .await?
        }
    };

    let found: std::collections::HashSet<i64> = rows.iter().map(|r| r.id).collect();
    for &id in task_ids {
        if !found.contains(&id) {
            outcome.not_found.push(id);
        }
    }

    let mut to_transition = Vec::new();
    for row in rows {
        if source_codes.contains(&row.status) {
            to_transition.push(row.id);
        } else {
            outcome.invalid_source_state.push(row.id);
        }
    }

    if lock_policy == LockPolicy::SkipLocked {
        for &id in task_ids {
            if !found.contains(&id) && !outcome.not_found.contains(&id) {
                outcome.locked.push(id);
            }
        }
    }

    if !to_transition.is_empty() {
        sqlx::query!(
            r#"UPDATE task SET status = $1, status_date = now() WHERE id = ANY($2)"#,
            target_status as TaskStatus,
            &to_transition,
        )
        .execute(&mut *tx)
        .await?;
    }

    outcome.transitioned = to_transition;
    tx.commit().await?;
    Ok(outcome)
}

/// Tasks in a workflow whose most recent TaskInstance landed in
/// `ti_status` — the resume protocol's `increase_resources` step scopes
/// its resource bump to tasks whose latest instance is `RESOURCE_ERROR`.
pub async fn get_tasks_with_latest_ti_status(
    pool: &PgPool,
    workflow_id: i64,
    ti_status: TaskInstanceStatus,
) -> Result<Vec<TaskRow>, DbError> {
    let rows = sqlx::query_as!(
        TaskRow,
        r#"
        SELECT t.id, t.workflow_id, t.node_id, t.array_id, t.task_args_hash, t.command,
               t.num_attempts, t.max_attempts, t.task_resources_id, t.resource_scales,
               t.status as "status: TaskStatus", t.status_date
        FROM task t
        JOIN LATERAL (
            SELECT status FROM task_instance ti
            WHERE ti.task_id = t.id
            ORDER BY ti.id DESC
            LIMIT 1
        ) latest_ti ON true
        WHERE t.workflow_id = $1 AND latest_ti.status = $2
        "#,
        workflow_id,
        ti_status as TaskInstanceStatus,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Walk downstream from `task_id` via the dag's edges, returning every
/// descendant task that belongs to the same workflow.
pub async fn tasks_recursive_down(pool: &PgPool, task_id: i64) -> Result<Vec<i64>, DbError> {
    let rows = sqlx::query_scalar!(
        r#"
        WITH RECURSIVE descendants(node_id) AS (
            SELECT t.node_id FROM task t WHERE t.id = $1
            UNION
            SELECT (jsonb_array_elements_text(e.downstream_node_ids))::bigint
            FROM edge e JOIN descendants d ON e.node_id = d.node_id
        )
        SELECT t.id FROM task t
        WHERE t.node_id IN (SELECT node_id FROM descendants)
          AND t.node_id <> (SELECT node_id FROM task WHERE id = $1)
        "#,
        task_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Walk upstream from `task_id`, mirroring [`tasks_recursive_down`].
pub async fn tasks_recursive_up(pool: &PgPool, task_id: i64) -> Result<Vec<i64>, DbError> {
    let rows = sqlx::query_scalar!(
        r#"
        WITH RECURSIVE ancestors(node_id) AS (
            SELECT t.node_id FROM task t WHERE t.id = $1
            UNION
            SELECT (jsonb_array_elements_text(e.upstream_node_ids))::bigint
            FROM edge e JOIN ancestors a ON e.node_id = a.node_id
        )
        SELECT t.id FROM task t
        WHERE t.node_id IN (SELECT node_id FROM ancestors)
          AND t.node_id <> (SELECT node_id FROM task WHERE id = $1)
        "#,
        task_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_outcome_starts_empty() {
        let outcome: TransitionOutcome<i64> = TransitionOutcome::new();
        assert!(outcome.transitioned.is_empty());
        assert!(outcome.not_found.is_empty());
    }
}
