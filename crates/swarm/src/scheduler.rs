//! Batches ready tasks by `(array_id, task_resources)` and queues them to
//! the server, respecting workflow- and array-level concurrency limits.

use std::time::Instant;

use client::Requester;
use db::models::TaskStatus;
use serde::{Deserialize, Serialize};

use crate::error::SwarmError;
use crate::state::{StateUpdate, SwarmState};

pub struct Scheduler {
    requester: Requester,
    max_batch_size: usize,
}

#[derive(Serialize)]
struct QueueBatchBody<'a> {
    array_id: i64,
    task_resources_id: i64,
    workflow_run_id: i64,
    task_ids: &'a [i64],
}

#[derive(Deserialize)]
struct QueueBatchResponse {
    task_instances: Vec<QueuedInstance>,
}

#[derive(Deserialize)]
struct QueuedInstance {
    task_id: i64,
}

impl Scheduler {
    pub fn new(requester: Requester, max_batch_size: usize) -> Self {
        Self { requester, max_batch_size }
    }

    /// One scheduling pass: keep building and queueing batches until
    /// either the ready queue drains, capacity is exhausted, or
    /// `budget` elapses (`None` for unlimited).
    pub async fn tick(
        &self,
        state: &mut SwarmState,
        workflow_run_id: i64,
        budget: Option<std::time::Duration>,
    ) -> Result<StateUpdate, SwarmError> {
        let mut combined = StateUpdate::empty();
        let started = Instant::now();

        while let Some(batch) = self.next_batch(state) {
            let update = self.queue_batch(state, workflow_run_id, &batch).await?;
            combined = combined.merge(update);

            if let Some(budget) = budget {
                if started.elapsed() >= budget {
                    break;
                }
            }
        }

        Ok(combined)
    }

    pub fn has_work(&self, state: &SwarmState) -> bool {
        state.ready_to_run() && state.get_available_capacity() > 0
    }

    /// Pull one compatible batch off the ready queue: same array,
    /// same task_resources, bounded by workflow/array capacity and
    /// `max_batch_size`. Tasks that don't fit are pushed back to the
    /// front so ordering survives a partial pass.
    fn next_batch(&self, state: &mut SwarmState) -> Option<Vec<i64>> {
        let mut workflow_capacity = state.get_available_capacity();
        if workflow_capacity <= 0 || !state.ready_to_run() {
            return None;
        }

        let first = state.dequeue_task()?.clone();
        let mut batch = vec![first.task_id];
        let mut array_capacity = state.get_array_capacity(first.array_id) - 1;
        workflow_capacity -= 1;
        state.mark_in_flight(first.task_id);

        let mut deferred = Vec::new();
        let remaining = state.get_ready_to_run_count();
        for _ in 0..remaining {
            let Some(candidate) = state.dequeue_task() else { break };

            let fits = workflow_capacity > 0
                && array_capacity > 0
                && candidate.array_id == first.array_id
                && candidate.task_resources_id == first.task_resources_id
                && batch.len() < self.max_batch_size;

            if fits {
                let id = candidate.task_id;
                batch.push(id);
                workflow_capacity -= 1;
                array_capacity -= 1;
                state.mark_in_flight(id);
            } else {
                deferred.push(candidate.task_id);
            }
        }

        for id in deferred.into_iter().rev() {
            state.enqueue_task(id, true);
        }

        Some(batch)
    }

    async fn queue_batch(
        &self,
        state: &SwarmState,
        workflow_run_id: i64,
        task_ids: &[i64],
    ) -> Result<StateUpdate, SwarmError> {
        let first = state.get(task_ids[0]).expect("batch member must exist in state");

        let body = QueueBatchBody {
            array_id: first.array_id,
            task_resources_id: first.task_resources_id,
            workflow_run_id,
            task_ids,
        };

        let (_, content) = self.requester.post("/api/v1/fsm/batch", &body).await?;
        let response: QueueBatchResponse = serde_json::from_value(content)
            .unwrap_or(QueueBatchResponse { task_instances: Vec::new() });

        let mut update = StateUpdate::empty();
        for instance in response.task_instances {
            update.task_statuses.insert(instance.task_id, TaskStatus::Instantiating);
        }
        Ok(update)
    }
}
