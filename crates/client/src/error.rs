//! Requester error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RequesterError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("retry budget of {budget_secs}s exceeded; last status was {status}: {body}")]
    RetryBudgetExceeded { budget_secs: f64, status: u16, body: String },

    #[error("unexpected status {status} from {route}: {body}")]
    UnexpectedStatus { route: String, status: u16, body: String },
}
