use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::credentials::CredentialError;
use crate::delivery_log::DeliveryLogError;
use crate::dispatcher::DispatchError;
use crate::registrations::RegistrationError;
use crate::topics::MembershipError;

/// Application-level error type for HTTP handlers.
///
/// Dispatch and membership outcomes are not errors; they are answered with
/// 200 and a `{success, detail}` body by the handlers themselves.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Membership(#[from] MembershipError),

    #[error(transparent)]
    DeliveryLog(#[from] DeliveryLogError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    MethodNotAllowed(String),
}

pub type AppResult<T> = Result<T, AppError>;

type Classified = (StatusCode, &'static str, String);

fn internal(err: &dyn std::fmt::Display) -> Classified {
    tracing::error!(error = %err, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_registration(err: &RegistrationError) -> Classified {
    match err {
        RegistrationError::InvalidInput(msg) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
        }
        RegistrationError::ConstraintViolation(msg) => {
            (StatusCode::CONFLICT, "CONFLICT", msg.clone())
        }
        RegistrationError::NotFound { .. } => {
            (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
        }
        RegistrationError::Database(e) => internal(e),
    }
}

impl AppError {
    fn classify(&self) -> Classified {
        match self {
            AppError::Registration(err) => classify_registration(err),

            AppError::Credential(err) => match err {
                CredentialError::NotConfigured => {
                    (StatusCode::NOT_FOUND, "NOT_CONFIGURED", err.to_string())
                }
                CredentialError::InvalidFormat(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_FORMAT", err.to_string())
                }
                CredentialError::TransportInit(_) | CredentialError::Database(_) => internal(err),
            },

            AppError::Dispatch(err) => match err {
                DispatchError::InvalidInput(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                DispatchError::NoRecipients => {
                    (StatusCode::NOT_FOUND, "NO_RECIPIENTS", err.to_string())
                }
                DispatchError::Registration(inner) => classify_registration(inner),
                DispatchError::DeliveryLog(inner) => internal(inner),
                DispatchError::Database(inner) => internal(inner),
            },

            AppError::Membership(err) => match err {
                MembershipError::InvalidInput(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                MembershipError::Database(inner) => internal(inner),
            },

            AppError::DeliveryLog(err) => internal(err),

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::MethodNotAllowed(msg) => {
                (StatusCode::METHOD_NOT_ALLOWED, "METHOD_NOT_ALLOWED", msg.clone())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.classify();

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
