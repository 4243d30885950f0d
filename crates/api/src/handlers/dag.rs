//! Node / Dag / Edge binding endpoints — the client calls these while
//! walking its DAG before binding the workflow itself.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use db::repository::dag;

use crate::error::ApiError;
use crate::AppState;

#[derive(Deserialize)]
pub struct AddNodesDto {
    pub task_template_version_id: i64,
    pub node_args_hashes: Vec<String>,
}

pub async fn add_nodes(
    State(state): State<AppState>,
    Json(dto): Json<AddNodesDto>,
) -> Result<Json<Vec<db::models::NodeRow>>, ApiError> {
    let rows = dag::add_nodes(&state.pool, dto.task_template_version_id, &dto.node_args_hashes).await?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
pub struct BindDagDto {
    pub dag_hash: String,
}

pub async fn bind_dag(
    State(state): State<AppState>,
    Json(dto): Json<BindDagDto>,
) -> Result<Json<db::models::DagRow>, ApiError> {
    Ok(Json(dag::bind_dag(&state.pool, &dto.dag_hash).await?))
}

#[derive(Deserialize)]
pub struct AddEdgesDto {
    pub edges: Vec<db::models::EdgeRow>,
}

pub async fn add_edges(
    Path(dag_id): Path<i64>,
    State(state): State<AppState>,
    Json(dto): Json<AddEdgesDto>,
) -> Result<(), ApiError> {
    dag::add_edges(&state.pool, dag_id, &dto.edges).await?;
    Ok(())
}

pub async fn mark_dag_created(
    Path(dag_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<(), ApiError> {
    dag::mark_dag_created(&state.pool, dag_id).await?;
    Ok(())
}

pub async fn get_edges(
    Path(dag_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Vec<db::models::EdgeRow>>, ApiError> {
    Ok(Json(dag::get_edges_for_dag(&state.pool, dag_id).await?))
}
