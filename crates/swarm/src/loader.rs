//! Builds the initial [`SwarmState`] for a workflow run: fetch every task
//! and array bound under the workflow, plus the dag's edges, then compute
//! each task's downstream set and upstream count from the edge list — the
//! one-time graph walk a swarm does before its scheduling loop starts.

use std::collections::HashMap;

use client::Requester;
use db::models::{ArrayRow, EdgeRow, TaskRow, WorkflowRow};
use serde::Deserialize;

use crate::error::SwarmError;
use crate::state::{ArrayState, SwarmState};
use crate::swarm_task::SwarmTask;

pub async fn load_state(requester: &Requester, workflow: &WorkflowRow) -> Result<SwarmState, SwarmError> {
    let tasks = get_tasks(requester, workflow.id).await?;
    let arrays = get_arrays(requester, workflow.id).await?;
    let edges = get_edges(requester, workflow.dag_id).await?;

    let node_to_task: HashMap<i64, i64> = tasks.iter().map(|t| (t.node_id, t.id)).collect();
    let edges_by_node: HashMap<i64, &EdgeRow> = edges.iter().map(|e| (e.node_id, e)).collect();

    let swarm_tasks = tasks
        .iter()
        .map(|t| {
            let edge = edges_by_node.get(&t.node_id);
            let downstream = edge
                .map(|e| decode_node_ids(&e.downstream_node_ids))
                .unwrap_or_default()
                .into_iter()
                .filter_map(|node_id| node_to_task.get(&node_id).copied())
                .collect();
            let num_upstreams = edge
                .map(|e| decode_node_ids(&e.upstream_node_ids).len() as i32)
                .unwrap_or(0);

            SwarmTask {
                task_id: t.id,
                array_id: t.array_id,
                status: t.status,
                max_attempts: t.max_attempts,
                num_attempts: t.num_attempts,
                task_resources_id: t.task_resources_id,
                resource_scales: t.resource_scales.clone(),
                downstream,
                num_upstreams,
                num_upstreams_done: 0,
            }
        })
        .collect();

    let array_states = arrays
        .into_iter()
        .map(|a| {
            (
                a.id,
                ArrayState {
                    array_id: a.id,
                    name: a.name,
                    max_concurrently_running: a.max_concurrently_running,
                    running_count: 0,
                },
            )
        })
        .collect();

    Ok(SwarmState::new(swarm_tasks, array_states, workflow.max_concurrently_running))
}

fn decode_node_ids(value: &serde_json::Value) -> Vec<i64> {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

async fn get_tasks(requester: &Requester, workflow_id: i64) -> Result<Vec<TaskRow>, SwarmError> {
    let route = format!("/api/v1/cli/workflow/{workflow_id}/tasks");
    parse(requester.get(&route, &[]).await?.1)
}

async fn get_arrays(requester: &Requester, workflow_id: i64) -> Result<Vec<ArrayRow>, SwarmError> {
    let route = format!("/api/v1/cli/workflow/{workflow_id}/arrays");
    parse(requester.get(&route, &[]).await?.1)
}

async fn get_edges(requester: &Requester, dag_id: i64) -> Result<Vec<EdgeRow>, SwarmError> {
    let route = format!("/api/v1/fsm/dag/{dag_id}/edges");
    parse(requester.get(&route, &[]).await?.1)
}

fn parse<T: for<'de> Deserialize<'de>>(content: serde_json::Value) -> Result<T, SwarmError> {
    serde_json::from_value(content).map_err(|e| SwarmError::MalformedResponse(e.to_string()))
}
