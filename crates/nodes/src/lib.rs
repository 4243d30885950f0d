//! `nodes` crate — the `ClusterDriver`/`WorkerClient` capability traits
//! and the backends that implement them.
//!
//! Every cluster backend and every worker entry point implements one or
//! both of these traits; the distributor and the worker-mode CLI
//! subcommand each hold a trait object chosen by cluster/backend name at
//! startup.

pub mod error;
pub mod traits;
pub mod dummy;
pub mod local;
pub mod mock;

pub use error::NodeError;
pub use traits::{ArrayStepCommand, ClusterDriver, ExitInfo, ResourceRequest, WorkerClient};
pub use dummy::DummyDriver;
pub use local::{LocalWorker, SequentialDriver};
