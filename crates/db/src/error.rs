//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Raised when the server needs to assign a DistributorInstance to a
    /// batch but none is alive for the requested cluster.
    #[error("no active distributor instance for cluster {cluster_id}")]
    NoActiveDistributor { cluster_id: i64 },

    /// A caller tried to move more than 10,000 ids in one bulk transition.
    #[error("bulk operation exceeds the 10,000 id limit: got {0}")]
    TooManyIds(usize),
}
