//! Test doubles for [`ClusterDriver`] and [`WorkerClient`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{
    traits::{ArrayStepCommand, ClusterDriver, ExitInfo, ResourceRequest, WorkerClient},
    NodeError,
};

/// A `ClusterDriver` whose submit/poll/kill behaviour is entirely
/// programmer-controlled, with a record of every call for assertions.
pub struct MockDriver {
    pub poll_responses: Mutex<HashMap<String, ExitInfo>>,
    pub submitted: Arc<Mutex<Vec<String>>>,
    pub killed: Arc<Mutex<Vec<String>>>,
    next_id: Mutex<i64>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self {
            poll_responses: Mutex::new(HashMap::new()),
            submitted: Arc::new(Mutex::new(Vec::new())),
            killed: Arc::new(Mutex::new(Vec::new())),
            next_id: Mutex::new(1),
        }
    }
}

impl MockDriver {
    pub fn with_status(self, distributor_id: impl Into<String>, status: ExitInfo) -> Self {
        self.poll_responses.lock().unwrap().insert(distributor_id.into(), status);
        self
    }
}

#[async_trait]
impl ClusterDriver for MockDriver {
    async fn submit_array(
        &self,
        submission_name: &str,
        steps: &[ArrayStepCommand],
        _resources: &ResourceRequest,
    ) -> Result<HashMap<i32, String>, NodeError> {
        let mut ids = HashMap::with_capacity(steps.len());
        let mut next_id = self.next_id.lock().unwrap();
        let mut submitted = self.submitted.lock().unwrap();
        for step in steps {
            let id = format!("{submission_name}.{next_id}");
            *next_id += 1;
            submitted.push(id.clone());
            ids.insert(step.array_step_id, id);
        }
        Ok(ids)
    }

    async fn poll(&self, distributor_ids: &[String]) -> Result<HashMap<String, ExitInfo>, NodeError> {
        let responses = self.poll_responses.lock().unwrap();
        Ok(distributor_ids
            .iter()
            .filter_map(|id| responses.get(id).map(|s| (id.clone(), s.clone())))
            .collect())
    }

    async fn kill(&self, distributor_ids: &[String]) -> Result<(), NodeError> {
        self.killed.lock().unwrap().extend(distributor_ids.iter().cloned());
        Ok(())
    }
}

/// A `WorkerClient` that returns a fixed outcome, recording how many
/// times it ran.
pub struct MockWorker {
    pub outcome: ExitInfo,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockWorker {
    pub fn returning(outcome: ExitInfo) -> Self {
        Self { outcome, calls: Arc::new(Mutex::new(Vec::new())) }
    }
}

#[async_trait]
impl WorkerClient for MockWorker {
    async fn run(&self, command: &str) -> Result<ExitInfo, NodeError> {
        self.calls.lock().unwrap().push(command.to_string());
        Ok(self.outcome.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_driver_assigns_and_reports_status() {
        let driver = MockDriver::default().with_status("wf.1", ExitInfo::Done);
        let steps = vec![ArrayStepCommand { array_step_id: 0, command: "echo hi".into() }];
        let resources = ResourceRequest { queue: "all.q".into(), requested_resources: serde_json::json!({}) };
        let ids = driver.submit_array("wf", &steps, &resources).await.unwrap();
        assert_eq!(ids.len(), 1);

        let statuses = driver.poll(&["wf.1".into()]).await.unwrap();
        assert_eq!(statuses["wf.1"], ExitInfo::Done);
    }

    #[tokio::test]
    async fn mock_worker_records_commands() {
        let worker = MockWorker::returning(ExitInfo::Done);
        worker.run("echo hi").await.unwrap();
        assert_eq!(worker.calls.lock().unwrap().as_slice(), ["echo hi"]);
    }
}
