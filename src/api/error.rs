use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

use crate::engine::EngineError;

use super::availability::EXPOSED_HEADERS;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("missing or invalid {0} header")]
    Unauthorized(&'static str),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("invalid header value")]
    Header(#[from] header::InvalidHeaderValue),
}

pub type ApiResult<T> = Result<T, ApiError>;

fn detail(status: StatusCode, body: Value) -> Response {
    (status, Json(json!({ "detail": body }))).into_response()
}

fn engine_error_response(err: EngineError) -> Response {
    let message = err.to_string();
    if err.is_retryable() {
        tracing::debug!("contended request: {message}");
    }
    match err {
        EngineError::InvalidWindow(_) => detail(
            StatusCode::BAD_REQUEST,
            json!({ "error": "invalid_window", "message": message }),
        ),
        EngineError::DateOutsideWeek { .. } => detail(
            StatusCode::BAD_REQUEST,
            json!({ "error": "date_outside_week", "message": message }),
        ),
        EngineError::LimitExceeded(_) => detail(
            StatusCode::BAD_REQUEST,
            json!({ "error": "limit_exceeded", "message": message }),
        ),
        EngineError::VersionConflict { current_etag } => {
            let mut response = detail(
                StatusCode::CONFLICT,
                json!({ "error": "version_conflict", "current_version": current_etag }),
            );
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&current_etag) {
                headers.insert(header::ETAG, value);
            }
            headers.insert(
                header::ACCESS_CONTROL_EXPOSE_HEADERS,
                HeaderValue::from_static(EXPOSED_HEADERS),
            );
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            response
        }
        EngineError::NotAvailable => detail(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": "not_available", "message": message }),
        ),
        EngineError::Conflict(id) => detail(
            StatusCode::CONFLICT,
            json!({ "error": "conflict", "conflicting_booking_id": id.to_string() }),
        ),
        EngineError::Busy => {
            let mut response = detail(
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "busy", "message": message }),
            );
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
            response
        }
        EngineError::NotFound(_) => detail(StatusCode::NOT_FOUND, json!({ "error": "not_found" })),
        EngineError::InvalidTransition { from, to } => detail(
            StatusCode::CONFLICT,
            json!({ "error": "invalid_transition", "from": from, "to": to }),
        ),
        EngineError::WalError(_) => {
            tracing::error!("request failed on persistence: {message}");
            detail(StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "internal" }))
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Engine(err) => engine_error_response(err),
            ApiError::Unauthorized(header_name) => detail(
                StatusCode::UNAUTHORIZED,
                json!({ "error": "unauthorized", "message": format!("missing or invalid {header_name} header") }),
            ),
            ApiError::BadRequest(message) => {
                tracing::warn!("rejected request: {message}");
                detail(
                    StatusCode::BAD_REQUEST,
                    json!({ "error": "bad_request", "message": message }),
                )
            }
            ApiError::Header(err) => {
                tracing::error!("could not build response header: {err}");
                detail(StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "internal" }))
            }
        }
    }
}
