//! Valid-transition tables for the three entity FSMs: Task, TaskInstance
//! (consulted via [`task_status_for_ti`]), WorkflowRun, and Workflow.
//!
//! These are pure functions over the status enums in `db::models` — no
//! database access, no locking. Callers in `db::repository` and `api`
//! consult them before issuing an UPDATE; a transition this module
//! rejects must never reach the database.

use db::models::{TaskInstanceStatus, TaskStatus, WorkflowRunStatus, WorkflowStatus};

/// The statuses from which `to` is a legal next state for a Task.
///
/// Includes the direct RUNNING error paths (→REGISTERING, →ADJUSTING_RESOURCES,
/// →ERROR_FATAL): a running task's instance can fail in a way that's
/// already known to be fatal, or that needs a resource bump, or that's
/// cheap enough to just re-register from scratch, without always
/// routing through ERROR_RECOVERABLE first.
pub fn task_can_transition(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::*;
    matches!(
        (from, to),
        (Registering, Queued)
            | (Queued, Instantiating)
            | (Instantiating, Launched)
            | (Instantiating, Running)
            | (Instantiating, ErrorRecoverable)
            | (Launched, Running)
            | (Launched, ErrorRecoverable)
            | (Launched, ErrorFatal)
            | (Running, Done)
            | (Running, ErrorRecoverable)
            | (Running, Registering)
            | (Running, AdjustingResources)
            | (Running, ErrorFatal)
            | (ErrorRecoverable, AdjustingResources)
            | (ErrorRecoverable, Queued)
            | (ErrorRecoverable, Registering)
            | (ErrorRecoverable, ErrorFatal)
            | (AdjustingResources, Queued)
            | (AdjustingResources, ErrorFatal)
    )
}

pub fn task_is_terminal(status: TaskStatus) -> bool {
    matches!(status, TaskStatus::Done | TaskStatus::ErrorFatal)
}

pub fn task_instance_can_transition(from: TaskInstanceStatus, to: TaskInstanceStatus) -> bool {
    use TaskInstanceStatus::*;
    matches!(
        (from, to),
        (Queued, Instantiated)
            | (Instantiated, Launched)
            | (Instantiated, NoDistributorId)
            | (Launched, Running)
            | (Launched, Triaging)
            | (Running, Done)
            | (Running, Triaging)
            | (Running, KillSelf)
            | (Triaging, Error)
            | (Triaging, ResourceError)
            | (Triaging, UnknownError)
            | (NoDistributorId, Error)
    )
}

pub fn task_instance_is_terminal(status: TaskInstanceStatus) -> bool {
    matches!(
        status,
        TaskInstanceStatus::Done
            | TaskInstanceStatus::Error
            | TaskInstanceStatus::ErrorFatal
            | TaskInstanceStatus::KillSelf
    )
}

/// What status a Task should move to once one of its TaskInstances
/// reaches `ti_status`, given how many attempts have already been spent.
/// A resource error or unknown error that still has attempts left goes
/// back to QUEUED (or ADJUSTING_RESOURCES if resources need to scale);
/// once attempts are exhausted the task is fatally errored regardless of
/// why the instance died.
pub fn task_status_for_ti(
    ti_status: TaskInstanceStatus,
    num_attempts: i32,
    max_attempts: i32,
) -> TaskStatus {
    match ti_status {
        TaskInstanceStatus::Done => TaskStatus::Done,
        TaskInstanceStatus::Error
        | TaskInstanceStatus::ResourceError
        | TaskInstanceStatus::UnknownError
        | TaskInstanceStatus::NoDistributorId => {
            if num_attempts >= max_attempts {
                TaskStatus::ErrorFatal
            } else if ti_status == TaskInstanceStatus::ResourceError {
                TaskStatus::AdjustingResources
            } else {
                TaskStatus::ErrorRecoverable
            }
        }
        TaskInstanceStatus::KillSelf => TaskStatus::ErrorFatal,
        // Transient in-flight states never drive a task-level transition.
        TaskInstanceStatus::Queued
        | TaskInstanceStatus::Instantiated
        | TaskInstanceStatus::Launched
        | TaskInstanceStatus::Running
        | TaskInstanceStatus::Triaging
        | TaskInstanceStatus::ErrorFatal => TaskStatus::Running,
    }
}

pub fn workflow_run_can_transition(from: WorkflowRunStatus, to: WorkflowRunStatus) -> bool {
    use WorkflowRunStatus::*;
    matches!(
        (from, to),
        (Registered, Linking)
            | (Linking, Bound)
            | (Linking, Terminated)
            | (Bound, Instantiated)
            | (Instantiated, Launched)
            | (Launched, Running)
            | (Running, Done)
            | (Running, Error)
            | (Running, ColdResume)
            | (Running, HotResume)
            | (ColdResume, Terminated)
            | (HotResume, Terminated)
            | (Error, Aborted)
    )
}

pub fn workflow_run_is_terminal(status: WorkflowRunStatus) -> bool {
    matches!(
        status,
        WorkflowRunStatus::Done
            | WorkflowRunStatus::Terminated
            | WorkflowRunStatus::Aborted
            | WorkflowRunStatus::Stopped
    )
}

pub fn workflow_can_transition(from: WorkflowStatus, to: WorkflowStatus) -> bool {
    use WorkflowStatus::*;
    matches!(
        (from, to),
        (Registering, Queued)
            | (Queued, Instantiating)
            | (Instantiating, Launched)
            | (Launched, Running)
            | (Running, Done)
            | (Running, Failed)
            | (Running, Halted)
            | (Failed, Queued) // resume
            | (Halted, Queued) // resume
            | (Failed, Done) // fix_status_inconsistency rollup
            | (Running, Aborted)
    )
}

pub fn workflow_is_terminal(status: WorkflowStatus) -> bool {
    matches!(status, WorkflowStatus::Done | WorkflowStatus::Aborted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_retries_while_attempts_remain() {
        let next = task_status_for_ti(TaskInstanceStatus::Error, 1, 3);
        assert_eq!(next, TaskStatus::ErrorRecoverable);
    }

    #[test]
    fn task_goes_fatal_once_attempts_exhausted() {
        let next = task_status_for_ti(TaskInstanceStatus::Error, 3, 3);
        assert_eq!(next, TaskStatus::ErrorFatal);
    }

    #[test]
    fn resource_error_routes_to_adjusting_resources() {
        let next = task_status_for_ti(TaskInstanceStatus::ResourceError, 1, 3);
        assert_eq!(next, TaskStatus::AdjustingResources);
    }

    #[test]
    fn done_is_unconditional() {
        assert_eq!(task_status_for_ti(TaskInstanceStatus::Done, 0, 3), TaskStatus::Done);
    }

    #[test]
    fn registering_cannot_jump_to_running() {
        assert!(!task_can_transition(TaskStatus::Registering, TaskStatus::Running));
    }

    #[test]
    fn terminal_statuses_have_no_outgoing_transitions() {
        for &to in TaskStatus::ALL {
            assert!(!task_can_transition(TaskStatus::Done, to));
            assert!(!task_can_transition(TaskStatus::ErrorFatal, to));
        }
    }
}
