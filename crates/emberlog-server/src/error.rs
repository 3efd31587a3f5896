use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use emberlog_core::upload::UploadError;
use emberlog_core::validation::FieldError;
use serde_json::json;
use thiserror::Error;

/// Every way a request can fail. Each variant renders as a JSON body with at
/// least an `error` field.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("origin {0} is not allowed")]
    OriginNotAllowed(String),
    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("authentication rate limit exceeded, retry in {retry_after_secs}s")]
    AuthRateLimited { retry_after_secs: u64 },
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
    #[error("missing or invalid bearer token")]
    Unauthorized,
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("malformed request: {0}")]
    BadRequest(String),
    #[error("validation failed")]
    Validation(Vec<FieldError>),
    #[error("incident not found")]
    NotFound,
    #[error("route not found")]
    RouteNotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } | ApiError::AuthRateLimited { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Upload(e) if e.is_payload_too_large() => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Upload(_) | ApiError::BadRequest(_) | ApiError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound | ApiError::RouteNotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::OriginNotAllowed(_) => json!({ "error": "Not allowed by CORS" }),
            ApiError::RateLimited { retry_after_secs } => json!({
                "error": "Too many requests",
                "message": "Rate limit exceeded. Please try again later.",
                "retryAfter": retry_after_secs,
            }),
            ApiError::AuthRateLimited { retry_after_secs } => json!({
                "error": "Too many authentication attempts",
                "message": "Account temporarily locked. Please try again later.",
                "retryAfter": retry_after_secs,
            }),
            ApiError::BodyTooLarge { limit } => json!({
                "error": "Payload too large",
                "message": format!("Request body must not exceed {} bytes", limit),
            }),
            ApiError::Unauthorized => json!({
                "error": "Unauthorized",
                "message": "Invalid or missing authentication token",
            }),
            ApiError::Upload(e) => json!({ "error": e.title(), "message": e.to_string() }),
            ApiError::BadRequest(message) => json!({ "error": "Bad request", "message": message }),
            ApiError::Validation(details) => json!({
                "error": "Validation failed",
                "details": details,
            }),
            ApiError::NotFound => json!({ "error": "Incident not found" }),
            ApiError::RouteNotFound => json!({ "error": "Not found" }),
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                json!({ "error": "Internal server error" })
            }
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after_secs } | ApiError::AuthRateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}
