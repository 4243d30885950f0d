//! Node / Dag / Edge repository functions.
//!
//! `add_nodes` is a bulk insert that must stay idempotent under concurrent
//! writers: we `ON CONFLICT DO NOTHING` then re-select so two racing
//! binders converge on the same set of ids.

use sqlx::PgPool;

use crate::{
    models::{DagRow, EdgeRow, NodeRow},
    DbError,
};

/// Bulk insert of `(task_template_version_id, node_args_hash)` pairs,
/// ignoring duplicates, then a follow-up select to recover ids for the
/// whole batch (including ones that already existed).
pub async fn add_nodes(
    pool: &PgPool,
    task_template_version_id: i64,
    node_args_hashes: &[String],
) -> Result<Vec<NodeRow>, DbError> {
    if node_args_hashes.is_empty() {
        return Ok(Vec::new());
    }

    let mut tx = pool.begin().await?;

    for hash in node_args_hashes {
        sqlx::query!(
            r#"
            INSERT INTO node (task_template_version_id, node_args_hash)
            VALUES ($1, $2)
            ON CONFLICT (task_template_version_id, node_args_hash) DO NOTHING
            "#,
            task_template_version_id,
            hash,
        )
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let rows = sqlx::query_as!(
        NodeRow,
        r#"
        SELECT id, task_template_version_id, node_args_hash
        FROM node
        WHERE task_template_version_id = $1 AND node_args_hash = ANY($2)
        "#,
        task_template_version_id,
        node_args_hashes,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Find-or-create a Dag by its content hash.
pub async fn bind_dag(pool: &PgPool, dag_hash: &str) -> Result<DagRow, DbError> {
    sqlx::query!(
        r#"INSERT INTO dag (dag_hash) VALUES ($1) ON CONFLICT (dag_hash) DO NOTHING"#,
        dag_hash,
    )
    .execute(pool)
    .await?;

    let row = sqlx::query_as!(
        DagRow,
        r#"SELECT id, dag_hash, created_date FROM dag WHERE dag_hash = $1"#,
        dag_hash,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Append edges for a dag. `created_date` is stamped separately once the
/// client signals the dag is complete (see [`mark_dag_created`]).
pub async fn add_edges(pool: &PgPool, dag_id: i64, edges: &[EdgeRow]) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    for edge in edges {
        sqlx::query!(
            r#"
            INSERT INTO edge (dag_id, node_id, upstream_node_ids, downstream_node_ids)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (dag_id, node_id) DO UPDATE
            SET upstream_node_ids = EXCLUDED.upstream_node_ids,
                downstream_node_ids = EXCLUDED.downstream_node_ids
            "#,
            dag_id,
            edge.node_id,
            edge.upstream_node_ids,
            edge.downstream_node_ids,
        )
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Marks `created_date` once the client signals "dag complete".
pub async fn mark_dag_created(pool: &PgPool, dag_id: i64) -> Result<(), DbError> {
    sqlx::query!(
        r#"UPDATE dag SET created_date = now() WHERE id = $1 AND created_date IS NULL"#,
        dag_id,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_edges_for_dag(pool: &PgPool, dag_id: i64) -> Result<Vec<EdgeRow>, DbError> {
    let rows = sqlx::query_as!(
        EdgeRow,
        r#"SELECT dag_id, node_id, upstream_node_ids, downstream_node_ids FROM edge WHERE dag_id = $1"#,
        dag_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
