use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rizz_common::RizzError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Request too large")]
    RequestTooLarge,

    #[error("Core service error: {0}")]
    CoreService(#[from] RizzError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Authentication(_) => (StatusCode::UNAUTHORIZED, "AUTHENTICATION_ERROR"),
            ApiError::Authorization(_) => (StatusCode::FORBIDDEN, "AUTHORIZATION_ERROR"),
            ApiError::RateLimit => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT"),
            ApiError::RequestTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "REQUEST_TOO_LARGE"),
            ApiError::CoreService(err) => match err {
                RizzError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                RizzError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                RizzError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
                RizzError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                RizzError::InsufficientCredits { .. } => {
                    (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_CREDITS")
                }
                RizzError::Embedding(_) => (StatusCode::BAD_GATEWAY, "EMBEDDING_UNAVAILABLE"),
                RizzError::Generation(_) => (StatusCode::BAD_GATEWAY, "GENERATION_FAILED"),
                RizzError::Database(_) | RizzError::Configuration(_) | RizzError::Internal(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Message safe to show clients. Server-side details stay in the logs.
    fn public_message(self) -> String {
        match self {
            ApiError::Validation(msg)
            | ApiError::Authentication(msg)
            | ApiError::Authorization(msg) => msg,
            ApiError::RateLimit => "Rate limit exceeded".to_string(),
            ApiError::RequestTooLarge => "Request payload too large".to_string(),
            ApiError::CoreService(err) => match err {
                RizzError::Validation(msg) | RizzError::NotFound(msg) | RizzError::Forbidden(msg) => {
                    msg
                }
                err @ (RizzError::Unauthorized | RizzError::InsufficientCredits { .. }) => {
                    err.to_string()
                }
                RizzError::Embedding(msg) => {
                    warn!("Embedding service error: {}", msg);
                    "Embedding service unavailable".to_string()
                }
                RizzError::Generation(msg) => {
                    warn!("Generation error: {}", msg);
                    "Tip generation failed, your credit was refunded".to_string()
                }
                err => {
                    error!("Core service error: {}", err);
                    "Internal server error".to_string()
                }
            },
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();
        let error_message = self.public_message();

        let response_body = json!({
            "success": false,
            "data": null,
            "error": error_message,
            "error_code": error_code,
            "timestamp": chrono::Utc::now()
        });

        (status, Json(response_body)).into_response()
    }
}

pub fn validation_error(message: &str) -> ApiError {
    ApiError::Validation(message.to_string())
}

pub fn auth_error(message: &str) -> ApiError {
    ApiError::Authentication(message.to_string())
}

pub fn authz_error(message: &str) -> ApiError {
    ApiError::Authorization(message.to_string())
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpers() {
        assert!(matches!(validation_error("bad"), ApiError::Validation(_)));
        assert!(matches!(auth_error("no token"), ApiError::Authentication(_)));
        assert!(matches!(authz_error("admins only"), ApiError::Authorization(_)));
    }

    #[test]
    fn test_core_error_status_mapping() {
        let cases = [
            (RizzError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (RizzError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (RizzError::Unauthorized, StatusCode::UNAUTHORIZED),
            (RizzError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (
                RizzError::InsufficientCredits { balance: 0, required: 1 },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (RizzError::Embedding("x".into()), StatusCode::BAD_GATEWAY),
            (RizzError::Generation("x".into()), StatusCode::BAD_GATEWAY),
            (RizzError::Database("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_database_details_not_leaked() {
        let err = ApiError::from(RizzError::Database("UNIQUE constraint failed: users.email".into()));
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn test_rate_limit_error() {
        let response = ApiError::RateLimit.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
