//! Periodic heartbeat against the server, detecting a status change the
//! server pushes back (e.g. a cold/hot resume signal issued while this
//! run sleeps between ticks).

use std::time::{Duration, Instant};

use client::Requester;
use db::models::WorkflowRunStatus;
use serde::Serialize;

use crate::error::SwarmError;
use crate::state::StateUpdate;

#[derive(Serialize)]
struct HeartbeatBody {
    next_report_increment: f64,
}

pub struct HeartbeatService {
    requester: Requester,
    workflow_run_id: i64,
    interval: Duration,
    report_by_buffer: f64,
    current_status: WorkflowRunStatus,
    last_heartbeat: Option<Instant>,
}

impl HeartbeatService {
    pub fn new(
        requester: Requester,
        workflow_run_id: i64,
        interval: Duration,
        report_by_buffer: f64,
        initial_status: WorkflowRunStatus,
    ) -> Self {
        Self {
            requester,
            workflow_run_id,
            interval,
            report_by_buffer,
            current_status: initial_status,
            last_heartbeat: None,
        }
    }

    pub fn next_report_increment(&self) -> f64 {
        self.interval.as_secs_f64() * self.report_by_buffer
    }

    pub fn is_heartbeat_due(&self) -> bool {
        match self.last_heartbeat {
            None => true,
            Some(last) => last.elapsed() >= self.interval,
        }
    }

    pub async fn tick(&mut self) -> Result<StateUpdate, SwarmError> {
        let route = format!("/api/v1/fsm/workflow_run/{}/heartbeat", self.workflow_run_id);
        let body = HeartbeatBody {
            next_report_increment: self.next_report_increment(),
        };
        let (_, content) = self.requester.post(&route, &body).await?;
        self.last_heartbeat = Some(Instant::now());

        let status: WorkflowRunStatus = serde_json::from_value(
            content.get("status").cloned().unwrap_or(serde_json::Value::Null),
        )
        .unwrap_or(self.current_status);

        if status == self.current_status {
            return Ok(StateUpdate::empty());
        }

        self.current_status = status;
        Ok(StateUpdate {
            workflow_run_status: Some(status),
            ..StateUpdate::empty()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_is_due_before_the_first_tick() {
        let service = HeartbeatService::new(
            Requester::new("http://localhost", Duration::from_secs(1)),
            1,
            Duration::from_secs(30),
            1.5,
            WorkflowRunStatus::Bound,
        );
        assert!(service.is_heartbeat_due());
        assert_eq!(service.next_report_increment(), 45.0);
    }
}
