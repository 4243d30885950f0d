//! Tool / ToolVersion / TaskTemplate / TaskTemplateVersion — the globally
//! deduplicated namespace tables. Every bind here is a find-or-create
//! keyed by a unique index, race-safe under concurrent writers via
//! `ON CONFLICT DO NOTHING` followed by a re-select.

use sqlx::PgPool;

use crate::{
    models::{TaskTemplateRow, TaskTemplateVersionRow, ToolRow, ToolVersionRow},
    DbError,
};

/// Idempotent lookup/insert of a Tool by name.
pub async fn bind_tool(pool: &PgPool, name: &str) -> Result<ToolRow, DbError> {
    sqlx::query!(
        r#"INSERT INTO tool (name) VALUES ($1) ON CONFLICT (name) DO NOTHING"#,
        name,
    )
    .execute(pool)
    .await?;

    let row = sqlx::query_as!(ToolRow, r#"SELECT id, name FROM tool WHERE name = $1"#, name)
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// Idempotent lookup/insert of a ToolVersion. ToolVersions are immutable
/// after creation and never deduplicated by content — each call creates a
/// fresh version.
pub async fn bind_tool_version(pool: &PgPool, tool_id: i64) -> Result<ToolVersionRow, DbError> {
    let row = sqlx::query_as!(
        ToolVersionRow,
        r#"INSERT INTO tool_version (tool_id) VALUES ($1) RETURNING id, tool_id"#,
        tool_id,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Idempotent lookup/insert of a TaskTemplate by `(tool_version_id, name)`.
pub async fn bind_task_template(
    pool: &PgPool,
    tool_version_id: i64,
    name: &str,
) -> Result<TaskTemplateRow, DbError> {
    sqlx::query!(
        r#"
        INSERT INTO task_template (tool_version_id, name)
        VALUES ($1, $2)
        ON CONFLICT (tool_version_id, name) DO NOTHING
        "#,
        tool_version_id,
        name,
    )
    .execute(pool)
    .await?;

    let row = sqlx::query_as!(
        TaskTemplateRow,
        r#"SELECT id, tool_version_id, name FROM task_template WHERE tool_version_id = $1 AND name = $2"#,
        tool_version_id,
        name,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Content-addressed: keyed by `(template_id, command_template, arg_mapping_hash)`.
pub async fn bind_task_template_version(
    pool: &PgPool,
    task_template_id: i64,
    command_template: &str,
    arg_mapping_hash: &str,
) -> Result<TaskTemplateVersionRow, DbError> {
    sqlx::query!(
        r#"
        INSERT INTO task_template_version (task_template_id, command_template, arg_mapping_hash)
        VALUES ($1, $2, $3)
        ON CONFLICT (task_template_id, command_template, arg_mapping_hash) DO NOTHING
        "#,
        task_template_id,
        command_template,
        arg_mapping_hash,
    )
    .execute(pool)
    .await?;

    let row = sqlx::query_as!(
        TaskTemplateVersionRow,
        r#"
        SELECT id, task_template_id, command_template, arg_mapping_hash
        FROM task_template_version
        WHERE task_template_id = $1 AND command_template = $2 AND arg_mapping_hash = $3
        "#,
        task_template_id,
        command_template,
        arg_mapping_hash,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}
