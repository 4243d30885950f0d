//! Repository functions — one function per database operation.
//!
//! Every function takes a `&DbPool` (or an open transaction) and returns a
//! `Result<T, DbError>`. No FSM logic lives here — callers in `engine` and
//! `api` decide what transition to request; these functions only apply it
//! under the locking policy (`FOR UPDATE NOWAIT` vs. `FOR UPDATE SKIP
//! LOCKED`) the caller chooses.

pub mod tool;
pub mod dag;
pub mod task_resources;
pub mod workflows;
pub mod workflow_runs;
pub mod tasks;
pub mod task_instances;
pub mod distributor_instances;
pub mod batches;

/// Maximum ids accepted by a single bulk status-update request;
/// `task_update_statuses` refuses requests larger than this.
pub const MAX_BULK_IDS: usize = 10_000;

/// Size of chunks used for bulk writes that must not hold a lock too
/// long, e.g. `log_distributor_ids`.
pub const WRITE_CHUNK_SIZE: usize = 1000;

/// Row-locking policy used by a bulk/single transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockPolicy {
    /// `SELECT … FOR UPDATE NOWAIT` — fail fast so the caller retries with
    /// backoff; used for single-entity transitions (worker reports, kill).
    Nowait,
    /// `SELECT … FOR UPDATE SKIP LOCKED` — make progress on unlocked rows,
    /// returning the locked ones separately; used for bulk transitions.
    SkipLocked,
}

impl LockPolicy {
    pub fn sql_suffix(self) -> &'static str {
        match self {
            LockPolicy::Nowait => "FOR UPDATE NOWAIT",
            LockPolicy::SkipLocked => "FOR UPDATE SKIP LOCKED",
        }
    }
}

/// How a bulk transition attempt classifies each input id: every id ends
/// up in exactly one of `transitioned`, `invalid_source_state`, `locked`,
/// or `not_found`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TransitionOutcome<Id> {
    pub transitioned: Vec<Id>,
    pub invalid_source_state: Vec<Id>,
    pub locked: Vec<Id>,
    pub not_found: Vec<Id>,
}

impl<Id> TransitionOutcome<Id> {
    pub fn new() -> Self {
        Self {
            transitioned: Vec::new(),
            invalid_source_state: Vec::new(),
            locked: Vec::new(),
            not_found: Vec::new(),
        }
    }
}
