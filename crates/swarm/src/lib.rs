//! `swarm` — the client-side orchestration loop: binds a workflow run,
//! then cycles the Scheduler, ResourceAdjuster, Synchronizer and
//! HeartbeatService until the workflow run reaches a terminal state.

pub mod error;
pub mod factory;
pub mod heartbeat;
pub mod loader;
pub mod resource_adjuster;
pub mod scheduler;
pub mod state;
pub mod swarm_task;
pub mod synchronizer;

pub use error::SwarmError;
pub use heartbeat::HeartbeatService;
pub use loader::load_state;
pub use resource_adjuster::ResourceAdjuster;
pub use scheduler::Scheduler;
pub use state::{StateUpdate, SwarmState};
pub use swarm_task::SwarmTask;
pub use synchronizer::Synchronizer;

use std::time::Duration;

use client::Requester;
use db::models::WorkflowRunStatus;

fn is_terminal(status: WorkflowRunStatus) -> bool {
    matches!(
        status,
        WorkflowRunStatus::Done
            | WorkflowRunStatus::Error
            | WorkflowRunStatus::Terminated
            | WorkflowRunStatus::Aborted
            | WorkflowRunStatus::Stopped
    )
}

/// Drives one workflow run from bind through completion: a scheduling
/// pass to queue ready work, a synchronizer pass to pull in status
/// changes, and a heartbeat whenever one is due, repeated until the run
/// lands in a terminal or resume-requested status.
pub struct SwarmRun {
    scheduler: Scheduler,
    synchronizer: Synchronizer,
    heartbeat: HeartbeatService,
    resource_adjuster: ResourceAdjuster,
    state: SwarmState,
    workflow_run_id: i64,
}

impl SwarmRun {
    pub async fn start(
        requester: Requester,
        workflow: &db::models::WorkflowRow,
        workflow_run_id: i64,
        max_batch_size: usize,
        heartbeat_interval: Duration,
        report_by_buffer: f64,
    ) -> Result<Self, SwarmError> {
        let state = load_state(&requester, workflow).await?;
        let scheduler = Scheduler::new(requester.clone(), max_batch_size);
        let synchronizer = Synchronizer::new(requester.clone(), workflow_run_id);
        let resource_adjuster = ResourceAdjuster::new(requester.clone());
        let heartbeat = HeartbeatService::new(
            requester,
            workflow_run_id,
            heartbeat_interval,
            report_by_buffer,
            state.workflow_run_status,
        );

        Ok(Self { scheduler, synchronizer, heartbeat, resource_adjuster, state, workflow_run_id })
    }

    /// One pass of the loop. Returns the run's status after the pass so
    /// the caller can decide whether to keep ticking.
    pub async fn tick(&mut self) -> Result<WorkflowRunStatus, SwarmError> {
        let sched_update = self
            .scheduler
            .tick(&mut self.state, self.workflow_run_id, Some(Duration::from_secs(5)))
            .await?;
        self.state.apply_update(sched_update)?;

        let adjuster_update = self.resource_adjuster.tick(&self.state).await?;
        self.state.apply_update(adjuster_update)?;

        let task_ids = self.state.task_ids();
        let sync_update = self.synchronizer.tick(&task_ids).await?;
        self.state.apply_update(sync_update)?;

        if self.heartbeat.is_heartbeat_due() {
            let hb_update = self.heartbeat.tick().await?;
            self.state.apply_update(hb_update)?;
        }

        Ok(self.state.workflow_run_status)
    }

    /// Tick until the run reaches a terminal status, sleeping `poll_interval`
    /// between passes that found no new work.
    pub async fn run_to_completion(&mut self, poll_interval: Duration) -> Result<WorkflowRunStatus, SwarmError> {
        loop {
            let status = self.tick().await?;
            if is_terminal(status) {
                return Ok(status);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
