//! `engine` crate — client-side DAG construction, content hashing, and
//! the per-entity FSM transition tables shared by `db`, `api`, and
//! `swarm`.

pub mod models;
pub mod error;
pub mod dag;
pub mod fsm;
pub mod hash;
pub mod resource_scale;

pub use models::{ClientNode, ClientTask, ClientWorkflow};
pub use error::EngineError;
pub use dag::validate_dag;
