//! Workflow-Run Factory — turns a bound `ClientWorkflow` into a linked,
//! live `WorkflowRun`, handling the resume case where a previous run on
//! the same workflow is still (or was left) claiming it.

use client::Requester;
use db::models::{WorkflowRow, WorkflowRunRow};
use serde::Serialize;

use crate::error::SwarmError;

#[derive(Serialize)]
struct BindWorkflowBody<'a> {
    tool_version_id: i64,
    dag_id: i64,
    workflow_args_hash: &'a str,
    task_hash: &'a str,
    name: Option<&'a str>,
    max_concurrently_running: i32,
}

#[derive(Serialize)]
struct CreateWorkflowRunBody<'a> {
    workflow_id: i64,
    jobmon_server_version: &'a str,
}

/// Bind (find-or-create) the Workflow, then create and link a fresh
/// WorkflowRun against it. `link_workflow_run` on the server terminates
/// any sibling run still claiming the workflow, so a resume always wins
/// over whatever was running before — the caller doesn't need to detect
/// "is this a resume" itself. `increase_resources`, if set, runs the
/// resume protocol's step 4 before the new run is created: every task
/// whose latest instance failed on a resource error gets its
/// TaskResources bumped per its `resource_scales`.
pub async fn bind_and_resume(
    requester: &Requester,
    tool_version_id: i64,
    dag_id: i64,
    workflow_args_hash: &str,
    task_hash: &str,
    name: Option<&str>,
    max_concurrently_running: i32,
    jobmon_server_version: &str,
    increase_resources: bool,
) -> Result<(WorkflowRow, WorkflowRunRow), SwarmError> {
    let bind_body = BindWorkflowBody {
        tool_version_id,
        dag_id,
        workflow_args_hash,
        task_hash,
        name,
        max_concurrently_running,
    };
    let (_, content) = requester.post("/api/v1/fsm/workflow", &bind_body).await?;
    let workflow: WorkflowRow = serde_json::from_value(content)
        .map_err(|e| SwarmError::MalformedResponse(e.to_string()))?;

    if increase_resources {
        let route = format!("/api/v1/fsm/workflow/{}/increase_resources", workflow.id);
        requester.post(&route, &serde_json::json!({})).await?;
    }

    let run_body = CreateWorkflowRunBody {
        workflow_id: workflow.id,
        jobmon_server_version,
    };
    let (_, content) = requester.post("/api/v1/fsm/workflow_run", &run_body).await?;
    let run: WorkflowRunRow = serde_json::from_value(content)
        .map_err(|e| SwarmError::MalformedResponse(e.to_string()))?;

    let route = format!("/api/v1/fsm/workflow_run/{}/link", run.id);
    let (_, content) = requester.post(&route, &serde_json::json!({})).await?;
    let linked: WorkflowRunRow = serde_json::from_value(content)
        .map_err(|e| SwarmError::MalformedResponse(e.to_string()))?;

    Ok((workflow, linked))
}

/// Poll whether this workflow can accept a new run right now — false
/// while another run is QUEUED/RUNNING/DONE against it.
pub async fn ready_to_link(requester: &Requester, workflow_id: i64) -> Result<bool, SwarmError> {
    let route = format!("/api/v1/fsm/workflow/{}/ready_to_link", workflow_id);
    let (_, content) = requester.get(&route, &[]).await?;
    Ok(serde_json::from_value(content).unwrap_or(false))
}
