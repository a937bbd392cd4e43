use axum::{
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::delivery::DispatchError;
use crate::event::PayloadError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Malformed input: {0}")]
    MalformedInput(#[from] PayloadError),

    #[error("Request body rejected: {0}")]
    BodyRejected(#[from] BytesRejection),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, client_message, log_message) = match &self {
            AppError::Config(e) => {
                let log_msg = e.to_string();
                let client_msg = if is_production() {
                    "Configuration error".to_string()
                } else {
                    log_msg.clone()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", client_msg, log_msg)
            }
            AppError::MalformedInput(e) => {
                let status = match e {
                    PayloadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    PayloadError::NotText(_) | PayloadError::Empty => StatusCode::BAD_REQUEST,
                };
                (status, "MALFORMED_INPUT", e.to_string(), e.to_string())
            }
            AppError::BodyRejected(rejection) => (
                rejection.status(),
                "MALFORMED_INPUT",
                rejection.body_text(),
                rejection.body_text(),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Internal(e) => {
                let log_msg = e.clone();
                let client_msg = if is_production() {
                    "Internal server error".to_string()
                } else {
                    log_msg.clone()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", client_msg, log_msg)
            }
        };

        // Client mistakes are expected traffic; only server faults are errors
        if status.is_server_error() {
            tracing::error!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API error"
            );
        } else {
            tracing::warn!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "Rejected request"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::MalformedInput(e) => AppError::MalformedInput(e),
            DispatchError::UnknownDestination(destination) => {
                AppError::NotFound(format!("No handler for destination {}", destination))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversized_payload_maps_to_413() {
        let err = AppError::from(PayloadError::TooLarge { size: 10, max: 5 });
        assert_eq!(err.into_response().status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_non_text_payload_maps_to_400() {
        let bytes = vec![0xff, 0xfe];
        let utf8_err = String::from_utf8(bytes).unwrap_err();
        let err = AppError::from(PayloadError::NotText(utf8_err.utf8_error()));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_dispatch_errors_convert() {
        let err = AppError::from(DispatchError::UnknownDestination("/app/nowhere".to_string()));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let err = AppError::from(DispatchError::MalformedInput(PayloadError::Empty));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let err = AppError::NotFound("nothing here".to_string());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
