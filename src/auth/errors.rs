//! Auth error taxonomy and its HTTP rendering

use crate::auth::validation::FieldErrors;
use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Errors surfaced by the auth service and its HTTP layer
#[derive(Debug)]
pub enum AuthError {
    /// Missing, malformed or duplicate input (422)
    Validation(FieldErrors),
    /// Request body could not be decoded (422)
    InvalidBody(String),
    /// Email/password did not match an active account (401)
    InvalidCredentials,
    /// No usable bearer token on a protected route (401)
    Unauthenticated,
    /// Authenticated but lacking the admin role (403)
    Forbidden,
    /// Referenced resource does not exist (404)
    NotFound(&'static str),
    /// Anything else; logged, never retried (500)
    Internal(anyhow::Error),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) | AuthError::InvalidBody(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AuthError::InvalidCredentials | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Single-field validation failure
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::default();
        errors.add(field, message);
        AuthError::Validation(errors)
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Validation(errors) => write!(f, "{}", errors.summary()),
            AuthError::InvalidBody(reason) => write!(f, "Invalid request body: {}", reason),
            AuthError::InvalidCredentials => write!(f, "Invalid credentials"),
            AuthError::Unauthenticated => write!(f, "Unauthenticated."),
            AuthError::Forbidden => write!(f, "Access denied: administrator privileges required"),
            AuthError::NotFound(what) => write!(f, "{} not found", what),
            AuthError::Internal(_) => write!(f, "Internal server error"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Internal(err)
    }
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::InvalidBody(rejection.body_text())
    }
}

impl From<PathRejection> for AuthError {
    fn from(_: PathRejection) -> Self {
        AuthError::NotFound("User")
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AuthError::Validation(errors) => json!({
                "message": errors.summary(),
                "errors": errors,
            }),
            AuthError::Internal(err) => {
                error!("Unexpected error: {:#}", err);
                json!({ "message": self.to_string() })
            }
            _ => json!({ "message": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
