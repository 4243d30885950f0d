use thiserror::Error;

#[derive(Debug, Error)]
pub enum DistributorError {
    #[error("request to server failed: {0}")]
    Requester(#[from] client::RequesterError),

    #[error("cluster backend error: {0}")]
    Node(#[from] nodes::NodeError),

    #[error("no backend id returned for array step {0}")]
    MissingDistributorId(i32),

    #[error("malformed server response: {0}")]
    MalformedResponse(String),
}
