//! Capability traits a cluster backend and a worker process must satisfy.
//!
//! These are capability sets, not a class hierarchy: a backend is "a
//! `ClusterDriver`" purely because it implements the trait, with no base
//! type to inherit from. `distributor` holds a `Box<dyn ClusterDriver>`
//! chosen at startup by cluster name; `cli`'s worker-mode entry point
//! holds a `Box<dyn WorkerClient>` chosen the same way.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::NodeError;

/// One task instance's outcome as reported by the command that ran it.
/// Tagged so callers can route a failure to the right TaskInstance
/// status without re-deriving meaning from a bare exit code.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitInfo {
    Done,
    /// Non-zero exit the backend still considers a normal failure.
    Error { exit_code: i32, message: String },
    /// The backend itself reports an allocation/resource problem (OOM
    /// kill, walltime kill) distinct from the command's own exit code.
    ResourceError { message: String },
    /// No exit code available and no recognizable backend signal — e.g.
    /// the job vanished from the scheduler's accounting entirely.
    UnknownError,
    /// Killed on request (workflow abort, resume, `KillSelf`).
    Killed,
}

/// A single command to submit as one array step.
#[derive(Debug, Clone)]
pub struct ArrayStepCommand {
    pub array_step_id: i32,
    pub command: String,
}

/// What a cluster backend needs to accept a resource request — queue
/// name plus an opaque bundle of backend-specific keys (cores, memory,
/// walltime, ...).
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub queue: String,
    pub requested_resources: Value,
}

/// The contract a cluster backend (Slurm, UGE, a local sequential
/// runner, a no-op dummy) must fulfil to be driven by the distributor.
#[async_trait]
pub trait ClusterDriver: Send + Sync {
    /// Submit every step of one array batch as a single backend job,
    /// returning the backend's own id for each array step.
    async fn submit_array(
        &self,
        submission_name: &str,
        steps: &[ArrayStepCommand],
        resources: &ResourceRequest,
    ) -> Result<HashMap<i32, String>, NodeError>;

    /// Poll the backend for the current status of each distributor id.
    /// Ids the backend has no record of are simply absent from the map.
    async fn poll(&self, distributor_ids: &[String]) -> Result<HashMap<String, ExitInfo>, NodeError>;

    /// Request the backend kill the given jobs (workflow abort/resume).
    async fn kill(&self, distributor_ids: &[String]) -> Result<(), NodeError>;
}

/// The contract a worker-side executable fulfils to actually run a
/// task's command and report back what happened, independent of which
/// cluster backend launched it.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// Run `command` to completion (or until killed) and classify the
    /// outcome. Implementations are expected to emit the `ALIVE`/
    /// `SHUTDOWN` handshake tokens on stderr as the process starts and
    /// stops.
    async fn run(&self, command: &str) -> Result<ExitInfo, NodeError>;
}
