//! Node-level error type.

use thiserror::Error;

/// Errors returned by a `ClusterDriver` or `WorkerClient` call.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    /// Transient failure; the caller should retry.
    #[error("retryable node error: {0}")]
    Retryable(String),

    /// Permanent failure; no retry should be attempted.
    #[error("fatal node error: {0}")]
    Fatal(String),

    /// Underlying I/O failure spawning or polling a process.
    #[error("I/O error: {0}")]
    Io(String),
}
