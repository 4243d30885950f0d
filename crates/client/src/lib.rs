//! `Requester` — the HTTP client every Jobmon process uses to talk to the
//! server. 5xx responses and HTTP 423 (a deadlock-retryable transaction
//! on the server) are retried with exponential backoff and jitter up to
//! a wall-clock budget; anything else is returned to the caller as-is.

pub mod error;

pub use error::RequesterError;

use std::collections::HashMap;
use std::time::Duration;

use backoff::ExponentialBackoff;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;

const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

fn http_request_ok(status: StatusCode) -> bool {
    matches!(status, StatusCode::OK | StatusCode::FOUND | StatusCode::TEMPORARY_REDIRECT)
}

fn is_retryable(status: StatusCode) -> bool {
    status.as_u16() == 423 || status.is_server_error()
}

#[derive(Clone)]
pub struct Requester {
    http: reqwest::Client,
    base_url: String,
    retries_timeout: Duration,
    server_structlog_context: HashMap<String, String>,
}

impl Requester {
    pub fn new(base_url: impl Into<String>, retries_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            retries_timeout,
            server_structlog_context: HashMap::new(),
        }
    }

    pub fn add_server_structlog_context(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.server_structlog_context.insert(key.into(), value.into());
    }

    pub async fn get(&self, route: &str, query: &[(&str, &str)]) -> Result<(StatusCode, Value), RequesterError> {
        self.send_tenacious(Method::GET, route, query, None).await
    }

    pub async fn post<T: Serialize>(&self, route: &str, body: &T) -> Result<(StatusCode, Value), RequesterError> {
        let body = serde_json::to_value(body).unwrap_or(Value::Null);
        self.send_tenacious(Method::POST, route, &[], Some(body)).await
    }

    pub async fn put<T: Serialize>(&self, route: &str, body: &T) -> Result<(StatusCode, Value), RequesterError> {
        let body = serde_json::to_value(body).unwrap_or(Value::Null);
        self.send_tenacious(Method::PUT, route, &[], Some(body)).await
    }

    async fn send_tenacious(
        &self,
        method: Method,
        route: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<(StatusCode, Value), RequesterError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.retries_timeout),
            ..ExponentialBackoff::default()
        };

        let outcome = backoff::future::retry(backoff, || async {
            match self.send_once(method.clone(), route, query, body.clone()).await {
                Ok((status, content)) if is_retryable(status) => {
                    tracing::warn!(route, %status, "retryable status from server");
                    Err(backoff::Error::transient((status, content)))
                }
                Ok(ok) => Ok(ok),
                Err(RequesterError::Transport(e)) if e.is_connect() => {
                    Err(backoff::Error::transient((StatusCode::SERVICE_UNAVAILABLE, Value::String(e.to_string()))))
                }
                Err(e) => Err(backoff::Error::Permanent(e)),
            }
        })
        .await;

        let (status, content) = match outcome {
            Ok(ok) => ok,
            Err(backoff::Error::Transient { err: (status, content), .. }) => {
                return Err(RequesterError::RetryBudgetExceeded {
                    budget_secs: self.retries_timeout.as_secs_f64(),
                    status: status.as_u16(),
                    body: content.to_string(),
                })
            }
            Err(backoff::Error::Permanent(e)) => return Err(e),
        };

        if !http_request_ok(status) {
            return Err(RequesterError::UnexpectedStatus {
                route: route.to_string(),
                status: status.as_u16(),
                body: content.to_string(),
            });
        }

        Ok((status, content))
    }

    async fn send_once(
        &self,
        method: Method,
        route: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<(StatusCode, Value), RequesterError> {
        let url = format!("{}{}", self.base_url, route);
        let mut req = self.http.request(method, &url).query(&[("client_jobmon_version", CLIENT_VERSION)]);

        if !query.is_empty() {
            req = req.query(query);
        }
        if !self.server_structlog_context.is_empty() {
            if let Ok(ctx) = serde_json::to_string(&self.server_structlog_context) {
                req = req.header("X-Server-Structlog-Context", ctx);
            }
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = req.send().await?;
        let status = response.status();
        let content: Value = response.json().await.unwrap_or(Value::Null);
        Ok((status, content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_statuses_match_server_redirect_conventions() {
        assert!(http_request_ok(StatusCode::OK));
        assert!(http_request_ok(StatusCode::FOUND));
        assert!(http_request_ok(StatusCode::TEMPORARY_REDIRECT));
        assert!(!http_request_ok(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn retryable_statuses_are_5xx_or_locked() {
        assert!(is_retryable(StatusCode::from_u16(423).unwrap()));
        assert!(is_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
        assert!(!is_retryable(StatusCode::OK));
    }
}
