//! DistributorInstance repository functions — liveness registration and
//! the active-instance lookup a distributor process uses at startup.

use sqlx::PgPool;

use crate::{models::DistributorInstanceRow, DbError};

pub async fn register(
    pool: &PgPool,
    cluster_id: i64,
    workflow_run_id: Option<i64>,
    report_by_increment: f64,
) -> Result<DistributorInstanceRow, DbError> {
    let row = sqlx::query_as!(
        DistributorInstanceRow,
        r#"
        INSERT INTO distributor_instance (cluster_id, workflow_run_id, report_by_date)
        VALUES ($1, $2, now() + make_interval(secs => $3))
        RETURNING id, cluster_id, workflow_run_id, report_by_date, expunged
        "#,
        cluster_id,
        workflow_run_id,
        report_by_increment,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn log_heartbeat(
    pool: &PgPool,
    id: i64,
    report_by_increment: f64,
) -> Result<(), DbError> {
    sqlx::query!(
        r#"
        UPDATE distributor_instance
        SET report_by_date = now() + make_interval(secs => $2)
        WHERE id = $1 AND NOT expunged
        "#,
        id,
        report_by_increment,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// The active distributor instance for a cluster, preferring one pinned to
/// `workflow_run_id` over an unpinned shared one serving the whole
/// cluster.
pub async fn get_active(
    pool: &PgPool,
    cluster_id: i64,
    workflow_run_id: i64,
) -> Result<DistributorInstanceRow, DbError> {
    let row = sqlx::query_as!(
        DistributorInstanceRow,
        r#"
        SELECT id, cluster_id, workflow_run_id, report_by_date, expunged
        FROM distributor_instance
        WHERE cluster_id = $1 AND NOT expunged AND report_by_date > now()
          AND (workflow_run_id = $2 OR workflow_run_id IS NULL)
        ORDER BY workflow_run_id NULLS LAST
        LIMIT 1
        "#,
        cluster_id,
        workflow_run_id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::NoActiveDistributor { cluster_id })?;

    Ok(row)
}

/// Expunge distributor instances whose heartbeat has lapsed so stale
/// batches stop being attributed to them. Run periodically by the reaper.
pub async fn sweep_expunged(pool: &PgPool) -> Result<Vec<i64>, DbError> {
    let ids: Vec<i64> = sqlx::query_scalar!(
        r#"
        UPDATE distributor_instance
        SET expunged = true
        WHERE NOT expunged AND report_by_date < now()
        RETURNING id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(ids)
}
