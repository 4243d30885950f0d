//! Uniform error response: `{"error": {"type", "exception_message", "status_code"}}`.
//!
//! A Postgres deadlock or lock-not-available error (SQLSTATE 40P01 /
//! 55P03, which is what `FOR UPDATE NOWAIT` raises on contention) maps to
//! HTTP 423 so the client's retry-with-backoff logic kicks in instead of
//! surfacing a hard failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use db::DbError;

pub struct ApiError {
    status: StatusCode,
    type_name: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorPayload,
}

#[derive(Serialize)]
struct ErrorPayload {
    #[serde(rename = "type")]
    type_name: &'static str,
    exception_message: String,
    status_code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorPayload {
                type_name: self.type_name,
                exception_message: self.message,
                status_code: self.status.as_u16().to_string(),
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn is_retryable_deadlock(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|d| d.code())
        .map(|code| code.as_ref() == "40P01" || code.as_ref() == "55P03")
        .unwrap_or(false)
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match &e {
            DbError::NotFound => ApiError {
                status: StatusCode::NOT_FOUND,
                type_name: "DbError::NotFound",
                message: e.to_string(),
            },
            DbError::TooManyIds(_) => ApiError {
                status: StatusCode::BAD_REQUEST,
                type_name: "DbError::TooManyIds",
                message: e.to_string(),
            },
            DbError::NoActiveDistributor { .. } => ApiError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                type_name: "DbError::NoActiveDistributor",
                message: e.to_string(),
            },
            DbError::Sqlx(sqlx_err) if is_retryable_deadlock(sqlx_err) => ApiError {
                status: StatusCode::from_u16(423).unwrap(),
                type_name: "DbError::Sqlx",
                message: e.to_string(),
            },
            _ => ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                type_name: "DbError",
                message: e.to_string(),
            },
        }
    }
}

impl From<engine::EngineError> for ApiError {
    fn from(e: engine::EngineError) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            type_name: "EngineError",
            message: e.to_string(),
        }
    }
}
