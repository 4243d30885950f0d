use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaperError {
    #[error("request to server failed: {0}")]
    Requester(#[from] client::RequesterError),

    #[error("malformed server response: {0}")]
    MalformedResponse(String),
}
