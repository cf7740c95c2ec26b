//! HTTP route handlers

pub mod analyze;
pub mod chat;
pub mod health;

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

/// JSON error body, `{"detail": "..."}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

pub fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (status, Json(ErrorBody { detail: detail.into() }))
}
