//! TaskResources — an immutable, content-addressed resource bundle.

use sqlx::PgPool;

use crate::{models::TaskResourcesRow, DbError};

/// Find-or-create a TaskResources row by its content hash.
pub async fn bind_task_resources(
    pool: &PgPool,
    queue: &str,
    requested_resources: serde_json::Value,
    hash: &str,
) -> Result<TaskResourcesRow, DbError> {
    sqlx::query!(
        r#"
        INSERT INTO task_resources (queue, requested_resources, hash)
        VALUES ($1, $2, $3)
        ON CONFLICT (hash) DO NOTHING
        "#,
        queue,
        requested_resources,
        hash,
    )
    .execute(pool)
    .await?;

    let row = sqlx::query_as!(
        TaskResourcesRow,
        r#"SELECT id, queue, requested_resources, hash FROM task_resources WHERE hash = $1"#,
        hash,
    )
    .fetch_one(pool)
    .await?;

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

/// Repoint a task at a new TaskResources row (resource-escalation retry).
/// Does not mutate the old row — TaskResources are immutable and shared
/// by value.
pub async fn repoint_task_resources(
    pool: &PgPool,
    task_id: i64,
    new_task_resources_id: i64,
) -> Result<(), DbError> {
    sqlx::query!(
        r#"UPDATE task SET task_resources_id = $1 WHERE id = $2"#,
        new_task_resources_id,
        task_id,
    )
    .execute(pool)
    .await?;

    Ok(())
}
