//! Row structs that map 1-to-1 onto database tables, plus the status enums
//! that are the vocabulary of the FSMs in `engine::fsm`.
//!
//! These are *persistence* models — they carry no transition behaviour.
//! The valid-transition tables live in `engine::fsm`; this module only
//! defines the statuses themselves and how they serialize to/from the
//! single-character codes the wire protocol and the database columns use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Status enums — single-character wire codes.
// ---------------------------------------------------------------------------

macro_rules! char_coded_status {
    ($name:ident { $($variant:ident => $code:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
        #[sqlx(type_name = "text")]
        #[serde(into = "String", try_from = "String")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn code(self) -> char {
                match self {
                    $(Self::$variant => $code),+
                }
            }

            pub fn from_code(c: char) -> Option<Self> {
                match c {
                    $($code => Some(Self::$variant)),+,
                    _ => None,
                }
            }

            pub const ALL: &'static [Self] = &[$(Self::$variant),+];
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.code())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let c = s.chars().next().ok_or_else(|| "empty status code".to_string())?;
                Self::from_code(c).ok_or_else(|| format!("unknown {} code: '{}'", stringify!($name), s))
            }
        }

        impl From<$name> for String {
            fn from(s: $name) -> String {
                s.code().to_string()
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }
    };
}

char_coded_status!(TaskStatus {
    Registering => 'G',
    Queued => 'Q',
    Instantiating => 'I',
    Launched => 'O',
    Running => 'R',
    ErrorRecoverable => 'E',
    AdjustingResources => 'A',
    ErrorFatal => 'F',
    Done => 'D',
});

char_coded_status!(TaskInstanceStatus {
    Queued => 'Q',
    Instantiated => 'I',
    NoDistributorId => 'W',
    Launched => 'O',
    Running => 'R',
    Triaging => 'T',
    ResourceError => 'Z',
    UnknownError => 'U',
    Error => 'E',
    Done => 'D',
    KillSelf => 'K',
    ErrorFatal => 'F',
});

char_coded_status!(WorkflowStatus {
    Registering => 'G',
    Queued => 'Q',
    Instantiating => 'I',
    Launched => 'O',
    Running => 'R',
    Done => 'D',
    Failed => 'F',
    Aborted => 'A',
    Halted => 'H',
});

char_coded_status!(WorkflowRunStatus {
    Registered => 'G',
    Linking => 'L',
    Bound => 'B',
    Instantiated => 'I',
    Launched => 'O',
    Running => 'R',
    Done => 'D',
    Error => 'E',
    ColdResume => 'C',
    HotResume => 'H',
    Terminated => 'T',
    Aborted => 'A',
    Stopped => 'S',
});

// ---------------------------------------------------------------------------
// Tool / ToolVersion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ToolRow {
    pub id: i64,
    pub name: String,
}

/// Immutable after creation — each version belongs to exactly one tool.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ToolVersionRow {
    pub id: i64,
    pub tool_id: i64,
}

// ---------------------------------------------------------------------------
// TaskTemplate / TaskTemplateVersion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskTemplateRow {
    pub id: i64,
    pub tool_version_id: i64,
    pub name: String,
}

/// Content-addressed: keyed by `(template_id, command_template, arg_mapping_hash)`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskTemplateVersionRow {
    pub id: i64,
    pub task_template_id: i64,
    pub command_template: String,
    /// SHA-256 hex digest over the sorted `(arg_name, arg_class)` mapping.
    pub arg_mapping_hash: String,
}

// ---------------------------------------------------------------------------
// Node / Dag / Edge
// ---------------------------------------------------------------------------

/// One DAG vertex shape, deduplicated across workflows by
/// `(task_template_version_id, node_args_hash)`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NodeRow {
    pub id: i64,
    pub task_template_version_id: i64,
    /// SHA-256 hex digest over sorted `(arg_id, value)` pairs.
    pub node_args_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DagRow {
    pub id: i64,
    pub dag_hash: String,
    pub created_date: Option<DateTime<Utc>>,
}

/// Upstream/downstream node ids are stored as JSON arrays — an opaque
/// encoded list.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EdgeRow {
    pub dag_id: i64,
    pub node_id: i64,
    pub upstream_node_ids: serde_json::Value,
    pub downstream_node_ids: serde_json::Value,
}

// ---------------------------------------------------------------------------
// TaskResources
// ---------------------------------------------------------------------------

/// An immutable, content-addressed bundle. Tasks point to a "current" one;
/// adjusting resources creates a new row and repoints the task.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskResourcesRow {
    pub id: i64,
    pub queue: String,
    pub requested_resources: serde_json::Value,
    pub hash: String,
}

// ---------------------------------------------------------------------------
// Array
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ArrayRow {
    pub id: i64,
    pub workflow_id: i64,
    pub task_template_version_id: i64,
    pub name: String,
    pub max_concurrently_running: Option<i32>,
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskRow {
    pub id: i64,
    pub workflow_id: i64,
    pub node_id: i64,
    pub array_id: i64,
    /// SHA-256 hex digest over the sorted `task_args` mapping.
    pub task_args_hash: String,
    pub command: String,
    pub num_attempts: i32,
    pub max_attempts: i32,
    pub task_resources_id: i64,
    /// JSON-encoded resource-scale specification for escalation retries.
    pub resource_scales: serde_json::Value,
    pub status: TaskStatus,
    pub status_date: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: i64,
    pub tool_version_id: i64,
    pub dag_id: i64,
    pub workflow_args_hash: String,
    pub task_hash: String,
    pub name: Option<String>,
    pub max_concurrently_running: i32,
    pub status: WorkflowStatus,
    pub status_date: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// WorkflowRun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRunRow {
    pub id: i64,
    pub workflow_id: i64,
    pub jobmon_server_version: String,
    pub status: WorkflowRunStatus,
    pub status_date: DateTime<Utc>,
    pub heartbeat_date: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BatchRow {
    pub id: i64,
    pub array_id: i64,
    pub task_resources_id: i64,
    pub distributor_instance_id: Option<i64>,
}

impl BatchRow {
    /// `"{array_name}-{batch_id}"`, used as the backend job name.
    pub fn submission_name(&self, array_name: &str) -> String {
        format!("{}-{}", array_name, self.id)
    }
}

// ---------------------------------------------------------------------------
// TaskInstance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskInstanceRow {
    pub id: i64,
    pub task_id: i64,
    pub workflow_run_id: i64,
    pub batch_id: i64,
    /// Dense 0-based index within the batch.
    pub array_step_id: i32,
    pub distributor_id: Option<String>,
    pub status: TaskInstanceStatus,
    pub status_date: DateTime<Utc>,
    pub submitted_date: Option<DateTime<Utc>>,
    pub report_by_date: Option<DateTime<Utc>>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub wallclock: Option<f64>,
    pub maxrss: Option<i64>,
}

// ---------------------------------------------------------------------------
// DistributorInstance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DistributorInstanceRow {
    pub id: i64,
    pub cluster_id: i64,
    /// NULL for a "shared" distributor that can serve any workflow_run on
    /// its cluster; set for a "local" distributor pinned to one run.
    pub workflow_run_id: Option<i64>,
    pub report_by_date: DateTime<Utc>,
    pub expunged: bool,
}

// ---------------------------------------------------------------------------
// TaskInstanceErrorLog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskInstanceErrorLogRow {
    pub id: i64,
    pub task_instance_id: i64,
    pub error_time: DateTime<Utc>,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_round_trips_through_code() {
        for &s in TaskStatus::ALL {
            let code = s.code();
            assert_eq!(TaskStatus::from_code(code), Some(s));
        }
    }

    #[test]
    fn task_instance_status_parses_from_wire_string() {
        assert_eq!("D".parse::<TaskInstanceStatus>().unwrap(), TaskInstanceStatus::Done);
        assert!("?".parse::<TaskInstanceStatus>().is_err());
    }

    #[test]
    fn batch_submission_name_uses_array_name_dash_id() {
        let batch = BatchRow { id: 42, array_id: 1, task_resources_id: 1, distributor_instance_id: None };
        assert_eq!(batch.submission_name("my_array"), "my_array-42");
    }
}
