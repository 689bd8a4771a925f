use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

/// Unified application error.
///
/// Every HTTP handler returns this type on failure so that config, network,
/// database and validation problems all reach the client in the same
/// `{success, error, code, details?}` envelope.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    #[error("Too many requests. Please try again in {retry_after_secs} seconds.")]
    RateLimited { retry_after_secs: u64 },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: Value) -> Self {
        Self::Validation {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Config(_)
            | AppError::Network(_)
            | AppError::Parse(_)
            | AppError::Database(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code carried in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Network(_) => "UPSTREAM_ERROR",
            AppError::Parse(_) => "PARSE_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

}

/// Marks a response rendered from a server-side [`AppError`]. The router
/// replaces such bodies with [`sanitized_response`] in production.
#[derive(Debug, Clone, Copy)]
pub struct ServerFailure {
    pub status: StatusCode,
    pub code: &'static str,
}

pub const SANITIZED_MESSAGE: &str = "Internal server error";

/// Generic envelope for a server-side failure; the full error is only logged.
pub fn sanitized_response(failure: ServerFailure) -> Response {
    let body = json!({
        "success": false,
        "error": SANITIZED_MESSAGE,
        "code": failure.code,
    });
    (failure.status, Json(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "Request failed: {}", self);
        } else {
            tracing::debug!(code = self.code(), "Request rejected: {}", self);
        }

        let mut body = json!({
            "success": false,
            "error": self.to_string(),
            "code": self.code(),
        });
        if let AppError::Validation {
            details: Some(details),
            ..
        } = &self
        {
            body["details"] = details.clone();
        }

        let mut response = (status, Json(body)).into_response();
        if status.is_server_error() {
            response.extensions_mut().insert(ServerFailure {
                status,
                code: self.code(),
            });
        }
        if let AppError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
