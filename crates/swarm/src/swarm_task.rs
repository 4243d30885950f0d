//! The swarm's in-memory view of a task: its DAG position and resource
//! pointer, not its full row. `db::models::TaskRow` is the source of
//! truth; this is what the scheduler actually walks.

use db::models::TaskStatus;

#[derive(Debug, Clone)]
pub struct SwarmTask {
    pub task_id: i64,
    pub array_id: i64,
    pub status: TaskStatus,
    pub max_attempts: i32,
    pub num_attempts: i32,
    pub task_resources_id: i64,
    pub resource_scales: serde_json::Value,
    pub downstream: Vec<i64>,
    pub num_upstreams: i32,
    pub num_upstreams_done: i32,
}

impl SwarmTask {
    pub fn all_upstreams_done(&self) -> bool {
        self.num_upstreams_done >= self.num_upstreams
    }
}
