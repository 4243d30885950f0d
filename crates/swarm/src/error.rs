use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("request to server failed: {0}")]
    Requester(#[from] client::RequesterError),

    #[error("unknown task id {0} referenced by a server status update")]
    UnknownTask(i64),

    #[error("more upstreams marked done ({done}) than exist ({total}) for task {task_id}")]
    UpstreamOverflow { task_id: i64, done: i32, total: i32 },

    #[error("malformed server response: {0}")]
    MalformedResponse(String),
}
