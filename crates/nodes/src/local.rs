//! `LocalWorker` — runs a task's command as a child process on the
//! current machine and classifies its outcome. Used both as the
//! `WorkerClient` inside a spawned task instance, and folded into a
//! sequential `ClusterDriver` that runs each array step one at a time
//! rather than handing off to a real scheduler — useful for a laptop or
//! a CI box with no cluster available.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::{
    traits::{ArrayStepCommand, ClusterDriver, ExitInfo, ResourceRequest, WorkerClient},
    NodeError,
};

/// Literal tokens a worker writes to stderr as it starts and stops, so a
/// distributor tailing the process's stream can tell liveness apart from
/// an ordinary crash without parsing exit codes alone.
pub const ALIVE_TOKEN: &str = "ALIVE";
pub const SHUTDOWN_TOKEN: &str = "SHUTDOWN";

#[derive(Default)]
pub struct LocalWorker;

#[async_trait]
impl WorkerClient for LocalWorker {
    async fn run(&self, command: &str) -> Result<ExitInfo, NodeError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| NodeError::Io(e.to_string()))?;

        eprintln!("{}", ALIVE_TOKEN);

        let status = child.wait().await.map_err(|e| NodeError::Io(e.to_string()))?;

        eprintln!("{}", SHUTDOWN_TOKEN);

        match status.code() {
            Some(0) => Ok(ExitInfo::Done),
            Some(code) => Ok(ExitInfo::Error { exit_code: code, message: format!("exit code {code}") }),
            None => Ok(ExitInfo::Killed),
        }
    }
}

/// Scan a stream for the `ALIVE`/`SHUTDOWN` handshake tokens appearing
/// anywhere on a line, not just at byte 0 — the underlying shell may
/// prefix its own output before the worker gets to write.
pub async fn scan_for_token(stream: impl tokio::io::AsyncRead + Unpin, token: &str) -> bool {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.contains(token) {
            return true;
        }
    }
    false
}

/// A `ClusterDriver` that runs every array step sequentially in-process
/// rather than submitting to a real scheduler, polling to `Done`/`Error`
/// immediately since there is no async backend to poll.
#[derive(Default)]
pub struct SequentialDriver {
    worker: LocalWorker,
}

#[async_trait]
impl ClusterDriver for SequentialDriver {
    async fn submit_array(
        &self,
        submission_name: &str,
        steps: &[ArrayStepCommand],
        _resources: &ResourceRequest,
    ) -> Result<HashMap<i32, String>, NodeError> {
        let mut ids = HashMap::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            let distributor_id = format!("{submission_name}.{i}");
            self.worker.run(&step.command).await?;
            ids.insert(step.array_step_id, distributor_id);
        }
        Ok(ids)
    }

    async fn poll(&self, distributor_ids: &[String]) -> Result<HashMap<String, ExitInfo>, NodeError> {
        // Sequential submission already ran every step to completion.
        Ok(distributor_ids.iter().map(|id| (id.clone(), ExitInfo::Done)).collect())
    }

    async fn kill(&self, _distributor_ids: &[String]) -> Result<(), NodeError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_worker_reports_done_on_zero_exit() {
        let worker = LocalWorker;
        let result = worker.run("true").await.unwrap();
        assert_eq!(result, ExitInfo::Done);
    }

    #[tokio::test]
    async fn local_worker_reports_error_on_nonzero_exit() {
        let worker = LocalWorker;
        let result = worker.run("exit 3").await.unwrap();
        assert_eq!(result, ExitInfo::Error { exit_code: 3, message: "exit code 3".into() });
    }

    #[tokio::test]
    async fn scan_finds_token_even_when_not_first_on_the_line() {
        let stream = std::io::Cursor::new(b"sh: starting up\nALIVE\nworking...\n".to_vec());
        assert!(scan_for_token(stream, ALIVE_TOKEN).await);
    }

    #[tokio::test]
    async fn scan_returns_false_when_stream_ends_without_the_token() {
        let stream = std::io::Cursor::new(b"nothing relevant here\n".to_vec());
        assert!(!scan_for_token(stream, SHUTDOWN_TOKEN).await);
    }
}
