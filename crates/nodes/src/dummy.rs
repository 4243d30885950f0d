//! `DummyDriver` — a `ClusterDriver` that accepts everything and reports
//! every step done on the next poll. Used for smoke-testing a workflow
//! without touching a real scheduler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    traits::{ArrayStepCommand, ClusterDriver, ExitInfo, ResourceRequest},
    NodeError,
};

pub struct DummyDriver {
    next_id: AtomicI64,
    submitted: Mutex<Vec<String>>,
}

impl Default for DummyDriver {
    fn default() -> Self {
        Self { next_id: AtomicI64::new(1), submitted: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl ClusterDriver for DummyDriver {
    async fn submit_array(
        &self,
        _submission_name: &str,
        steps: &[ArrayStepCommand],
        _resources: &ResourceRequest,
    ) -> Result<HashMap<i32, String>, NodeError> {
        let mut ids = HashMap::with_capacity(steps.len());
        let mut submitted = self.submitted.lock().unwrap();
        for step in steps {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
            submitted.push(id.clone());
            ids.insert(step.array_step_id, id);
        }
        Ok(ids)
    }

    async fn poll(&self, distributor_ids: &[String]) -> Result<HashMap<String, ExitInfo>, NodeError> {
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
    async fn submit_assigns_sequential_ids() {
        let driver = DummyDriver::default();
        let steps = vec![
            ArrayStepCommand { array_step_id: 0, command: "echo a".into() },
            ArrayStepCommand { array_step_id: 1, command: "echo b".into() },
        ];
        let resources = ResourceRequest { queue: "all.q".into(), requested_resources: serde_json::json!({}) };
        let ids = driver.submit_array("wf-1", &steps, &resources).await.unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[tokio::test]
    async fn poll_reports_every_id_done() {
        let driver = DummyDriver::default();
        let result = driver.poll(&["1".into(), "2".into()]).await.unwrap();
        assert_eq!(result["1"], ExitInfo::Done);
        assert_eq!(result["2"], ExitInfo::Done);
    }
}
