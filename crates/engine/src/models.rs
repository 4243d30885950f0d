//! Client-side DAG construction types.
//!
//! These are the in-memory shapes a client assembles before binding
//! anything to the server: a `ClientNode` carries its local (workflow-
//! scoped) id and its upstream/downstream neighbours by that same local
//! id, since the server hasn't assigned a real node id yet. Once
//! `validate_dag` confirms the graph is a DAG, the caller hashes each
//! node's args, binds nodes/edges, then binds the dag itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One DAG vertex, as assembled client-side. `local_id` only needs to be
/// unique within this workflow; it never reaches the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientNode {
    pub local_id: String,
    pub task_template_version_id: i64,
    pub node_args: BTreeMap<String, String>,
    pub upstream: Vec<String>,
    pub downstream: Vec<String>,
}

/// A task attached to a node: the node supplies DAG position, the task
/// supplies the concrete command and resource request for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientTask {
    pub node_local_id: String,
    pub task_args: BTreeMap<String, String>,
    pub command: String,
    pub max_attempts: i32,
    pub queue: String,
    pub requested_resources: serde_json::Value,
    pub resource_scales: serde_json::Value,
}

/// The whole graph a client wants to submit as one workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientWorkflow {
    pub tool_name: String,
    pub workflow_args: BTreeMap<String, String>,
    pub name: Option<String>,
    pub max_concurrently_running: i32,
    pub nodes: Vec<ClientNode>,
    pub tasks: Vec<ClientTask>,
}

impl ClientWorkflow {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            workflow_args: BTreeMap::new(),
            name: None,
            max_concurrently_running: 10_000,
            nodes: Vec::new(),
            tasks: Vec::new(),
        }
    }
}
