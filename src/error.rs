//! Application error taxonomy and the JSON error envelope.
//!
//! Every error that escapes a handler is rendered as:
//!
//! ```json
//! { "error": { "code": 404, "message": "not found" } }
//! ```
//!
//! Validation failures additionally carry a per-field message map and map to
//! 422. Server-side failures (database, internal) are redacted in release
//! builds.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::fmt;

use crate::keys::api_key::ApiKeyError;

/// Accumulated attribute-level validation failures.
///
/// The textual form begins with the failing field name, e.g.
/// `new_password: the length must be between 8 and 50`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: Vec<(String, String)>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.push((field.into(), message.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Ok when no failure was recorded, otherwise the collected errors.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, message)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", field, message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Error taxonomy surfaced to the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid email or password")]
    InvalidCredentials,

    /// Reported to callers as 401; the variant stays visible in logs.
    #[error(transparent)]
    ApiKey(#[from] ApiKeyError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(anyhow::anyhow!(message.into()))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) | Self::InvalidCredentials | Self::ApiKey(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::InvalidCredentials => "invalid email or password".to_string(),
            Self::ApiKey(_) => "invalid API key".to_string(),
            Self::Database(_) | Self::Internal(_) if !cfg!(debug_assertions) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!("request failed: {:?}", self);
        } else if matches!(self, Self::ApiKey(_)) {
            tracing::warn!("API key rejected: {}", self);
        }

        let mut error = json!({
            "code": status.as_u16(),
            "message": self.public_message(),
        });

        if let Self::Validation(errors) = &self {
            let fields: serde_json::Map<String, serde_json::Value> = errors
                .fields()
                .iter()
                .map(|(field, message)| (field.clone(), json!(message)))
                .collect();
            error["errors"] = serde_json::Value::Object(fields);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::unauthorized("nope").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::forbidden("no").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::conflict("dup").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::ApiKey(ApiKeyError::InvalidChecksum).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_validation_errors_display_starts_with_field() {
        let mut errors = ValidationErrors::new();
        errors.add("new_password", "the length must be between 8 and 50");
        errors.add("new_password_confirmation", "cannot be blank");

        let text = errors.to_string();
        assert!(text.starts_with("new_password: "));
        assert!(text.contains("length must be between 8 and 50"));
    }

    #[test]
    fn test_validation_errors_into_result() {
        assert!(ValidationErrors::new().into_result().is_ok());

        let mut errors = ValidationErrors::new();
        errors.add("email", "must be a valid email address");
        assert!(errors.into_result().is_err());
    }
}
