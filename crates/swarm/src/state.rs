//! `SwarmState` — the single source of truth the Scheduler, Synchronizer,
//! and HeartbeatService all read and mutate. An arena of [`SwarmTask`]s
//! indexed by task id, a ready queue, and the workflow/array concurrency
//! limits needed to decide how much more can be launched right now.

use std::collections::{HashMap, VecDeque};

use db::models::{TaskStatus, WorkflowRunStatus};

use crate::error::SwarmError;
use crate::swarm_task::SwarmTask;

#[derive(Debug, Clone, Default)]
pub struct ArrayState {
    pub array_id: i64,
    pub name: String,
    pub max_concurrently_running: Option<i32>,
    pub running_count: i32,
}

impl ArrayState {
    fn capacity(&self) -> i32 {
        match self.max_concurrently_running {
            Some(limit) => (limit - self.running_count).max(0),
            None => i32::MAX,
        }
    }
}

fn counts_against_concurrency(status: TaskStatus) -> bool {
    matches!(
        status,
        TaskStatus::Instantiating | TaskStatus::Launched | TaskStatus::Running
    )
}

/// A batch of state changes fetched from the server in one sync tick (or
/// produced locally by scheduling a batch) merged into `SwarmState` as a
/// unit so partial updates from a failed sub-request don't corrupt state.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub task_statuses: HashMap<i64, TaskStatus>,
    pub workflow_run_status: Option<WorkflowRunStatus>,
    pub max_concurrently_running: Option<i32>,
    pub array_limits: HashMap<i64, i32>,
}

impl StateUpdate {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.task_statuses.extend(other.task_statuses);
        self.array_limits.extend(other.array_limits);
        if other.workflow_run_status.is_some() {
            self.workflow_run_status = other.workflow_run_status;
        }
        if other.max_concurrently_running.is_some() {
            self.max_concurrently_running = other.max_concurrently_running;
        }
        self
    }
}

pub struct SwarmState {
    tasks: HashMap<i64, SwarmTask>,
    ready_queue: VecDeque<i64>,
    pub arrays: HashMap<i64, ArrayState>,
    pub max_concurrently_running: i32,
    running_count: i32,
    pub workflow_run_status: WorkflowRunStatus,
}

impl SwarmState {
    pub fn new(
        tasks: Vec<SwarmTask>,
        arrays: HashMap<i64, ArrayState>,
        max_concurrently_running: i32,
    ) -> Self {
        let mut ready_queue = VecDeque::new();
        let mut map = HashMap::with_capacity(tasks.len());
        for task in tasks {
            if task.all_upstreams_done() && task.status == TaskStatus::Queued {
                ready_queue.push_back(task.task_id);
            }
            map.insert(task.task_id, task);
        }

        Self {
            tasks: map,
            ready_queue,
            arrays,
            max_concurrently_running,
            running_count: 0,
            workflow_run_status: WorkflowRunStatus::Bound,
        }
    }

    pub fn get(&self, task_id: i64) -> Option<&SwarmTask> {
        self.tasks.get(&task_id)
    }

    /// Every task currently sitting in `status` — what the Resource
    /// Adjuster scans for `ADJUSTING_RESOURCES` tasks each tick.
    pub fn tasks_with_status(&self, status: TaskStatus) -> impl Iterator<Item = &SwarmTask> {
        self.tasks.values().filter(move |t| t.status == status)
    }

    /// Every task id this run knows about — the full set loaded at bind
    /// time, which doesn't change over the run's lifetime.
    pub fn task_ids(&self) -> Vec<i64> {
        self.tasks.keys().copied().collect()
    }

    pub fn ready_to_run(&self) -> bool {
        !self.ready_queue.is_empty()
    }

    pub fn get_ready_to_run_count(&self) -> usize {
        self.ready_queue.len()
    }

    pub fn dequeue_task(&mut self) -> Option<&SwarmTask> {
        let id = self.ready_queue.pop_front()?;
        self.tasks.get(&id)
    }

    pub fn enqueue_task(&mut self, task_id: i64, front: bool) {
        if front {
            self.ready_queue.push_front(task_id);
        } else {
            self.ready_queue.push_back(task_id);
        }
    }

    pub fn get_available_capacity(&self) -> i32 {
        (self.max_concurrently_running - self.running_count).max(0)
    }

    pub fn get_array_capacity(&self, array_id: i64) -> i32 {
        self.arrays.get(&array_id).map(ArrayState::capacity).unwrap_or(i32::MAX)
    }

    /// Mark a task as handed to the scheduler's current batch: it leaves
    /// the ready queue and starts counting against both capacities until
    /// a status update says otherwise.
    pub fn mark_in_flight(&mut self, task_id: i64) {
        let array_id = self.tasks.get(&task_id).map(|t| t.array_id);

        if let Some(task) = self.tasks.get_mut(&task_id) {
            task.status = TaskStatus::Instantiating;
        }
        self.running_count += 1;

        if let Some(array_id) = array_id {
            if let Some(array) = self.arrays.get_mut(&array_id) {
                array.running_count += 1;
            }
        }
    }

    /// Apply a `StateUpdate` fetched from the server: task status changes
    /// move tasks off the concurrency counters and, for a newly Done
    /// task, unblock its downstream tasks whose upstreams are now all
    /// satisfied.
    pub fn apply_update(&mut self, update: StateUpdate) -> Result<(), SwarmError> {
        if let Some(limit) = update.max_concurrently_running {
            self.max_concurrently_running = limit;
        }
        if let Some(status) = update.workflow_run_status {
            self.workflow_run_status = status;
        }
        for (array_id, limit) in update.array_limits {
            self.arrays.entry(array_id).or_insert_with(|| ArrayState {
                array_id,
                ..Default::default()
            }).max_concurrently_running = Some(limit);
        }

        for (task_id, new_status) in update.task_statuses {
            self.transition_task(task_id, new_status)?;
        }

        Ok(())
    }

    fn transition_task(&mut self, task_id: i64, new_status: TaskStatus) -> Result<(), SwarmError> {
        let (was_in_flight, array_id, downstream) = {
            let task = self.tasks.get(&task_id).ok_or(SwarmError::UnknownTask(task_id))?;
            (counts_against_concurrency(task.status), task.array_id, task.downstream.clone())
        };

        if let Some(task) = self.tasks.get_mut(&task_id) {
            task.status = new_status;
        }

        if was_in_flight && !counts_against_concurrency(new_status) {
            self.running_count = (self.running_count - 1).max(0);
            if let Some(array) = self.arrays.get_mut(&array_id) {
                array.running_count = (array.running_count - 1).max(0);
            }
        }

        match new_status {
            TaskStatus::Done => {
                for downstream_id in downstream {
                    self.complete_upstream(downstream_id)?;
                }
            }
            TaskStatus::Queued => {
                if let Some(task) = self.tasks.get(&task_id) {
                    if task.all_upstreams_done() {
                        self.ready_queue.push_back(task_id);
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn complete_upstream(&mut self, task_id: i64) -> Result<(), SwarmError> {
        let task = self.tasks.get_mut(&task_id).ok_or(SwarmError::UnknownTask(task_id))?;
        task.num_upstreams_done += 1;
        if task.num_upstreams_done > task.num_upstreams {
            return Err(SwarmError::UpstreamOverflow {
                task_id,
                done: task.num_upstreams_done,
                total: task.num_upstreams,
            });
        }

        if task.all_upstreams_done() && task.status == TaskStatus::Queued {
            self.ready_queue.push_back(task_id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: i64, upstreams: i32, downstream: Vec<i64>) -> SwarmTask {
        SwarmTask {
            task_id: id,
            array_id: 1,
            status: TaskStatus::Queued,
            max_attempts: 3,
            num_attempts: 0,
            task_resources_id: 1,
            resource_scales: serde_json::Value::Null,
            downstream,
            num_upstreams: upstreams,
            num_upstreams_done: 0,
        }
    }

    #[test]
    fn tasks_with_no_upstreams_start_ready() {
        let state = SwarmState::new(vec![task(1, 0, vec![2])], HashMap::new(), 10);
        assert!(state.ready_to_run());
        assert_eq!(state.get_ready_to_run_count(), 1);
    }

    #[test]
    fn downstream_becomes_ready_once_upstream_completes() {
        let mut state = SwarmState::new(
            vec![task(1, 0, vec![2]), task(2, 1, vec![])],
            HashMap::new(),
            10,
        );
        assert_eq!(state.get_ready_to_run_count(), 1);
        let scheduled = state.dequeue_task().unwrap().task_id;
        assert_eq!(scheduled, 1);
        assert_eq!(state.get_ready_to_run_count(), 0);

        let mut update = StateUpdate::empty();
        update.task_statuses.insert(1, TaskStatus::Done);
        state.apply_update(update).unwrap();

        assert_eq!(state.get_ready_to_run_count(), 1);
        assert_eq!(state.get(2).unwrap().task_id, 2);
    }
}
