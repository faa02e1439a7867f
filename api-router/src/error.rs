use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use common::error::AppError;
use thiserror::Error;

use crate::envelope::Envelope;

#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Backpressure(String),
    #[error("{0}")]
    Internal(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err.kind() {
            "InvalidInput" => Self::InvalidInput(err.to_string()),
            "NotFound" => Self::NotFound(err.to_string()),
            "Forbidden" => Self::Forbidden(err.to_string()),
            "Conflict" => Self::Conflict(err.to_string()),
            "Unavailable" | "DeadlineExceeded" => {
                tracing::error!(error = %err, "upstream dependency unavailable");
                Self::Unavailable("service temporarily unavailable".to_string())
            }
            "PartialEnrichment" => Self::Conflict(err.to_string()),
            "Backpressure" => Self::Backpressure(err.to_string()),
            _ => {
                tracing::error!(error = %err, "internal error");
                Self::Internal("internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            Self::Backpressure(msg) => (StatusCode::TOO_MANY_REQUESTS, msg.clone()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body: Envelope<()> = Envelope {
            success: false,
            data: None,
            error: Some(message),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_maps_to_400() {
        let api_err = ApiError::from(AppError::InvalidInput("bad".to_string()));
        assert!(matches!(api_err, ApiError::InvalidInput(_)));
        assert_eq!(
            api_err.into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn not_found_maps_to_404() {
        let api_err = ApiError::from(AppError::NotFound("ctx".to_string()));
        assert_eq!(api_err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn forbidden_maps_to_403() {
        let api_err = ApiError::from(AppError::Forbidden("ctx".to_string()));
        assert_eq!(api_err.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn backpressure_maps_to_429() {
        let api_err = ApiError::from(AppError::Backpressure("queue full".to_string()));
        assert_eq!(
            api_err.into_response().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
