//! Error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for resourceful actions
///
/// Validation failures are deliberately absent: a failed `save` or
/// `update_attributes` is reported as `success = false` on the execution
/// context and drives the failure response branch instead.
#[derive(Error, Debug)]
pub enum Error {
    /// No entity type is registered under the convention-derived name
    #[error("Unresolved entity type '{name}' for handler '{handler}'")]
    UnresolvedEntityType {
        /// Handler the name was derived from
        handler: String,
        /// Classified entity name that failed to resolve
        name: String,
    },

    /// Entity lookup by identifier found nothing
    #[error("Not found: {entity} [{id}]")]
    NotFound {
        /// Entity type name
        entity: String,
        /// Requested identifier (empty when the request carried none)
        id: String,
    },

    /// Authorization denied by the configured authorizer
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A response was already emitted for this invocation
    #[error("Response already performed for action '{0}'")]
    AlreadyPerformed(String),

    /// View rendering failed
    #[error("Render error: {0}")]
    Render(String),

    /// Payload serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persistence collaborator failure (not a validation failure)
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Error raised by a host-supplied hook
    #[error("Hook error: {0}")]
    Hook(#[from] anyhow::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Session error
    #[cfg(feature = "session")]
    #[error("Session error: {0}")]
    Session(String),
}

impl Error {
    /// Create a not-found error for an entity
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// HTTP status this error maps to
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,

    /// Optional error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// HTTP status code
    pub status: u16,
}

impl ErrorResponse {
    /// Create error response with a code
    pub fn with_code(
        status: StatusCode,
        code: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            code: Some(code.into()),
            status: status.as_u16(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = match self {
            Error::NotFound { entity, .. } => ErrorResponse::with_code(
                status,
                "NOT_FOUND",
                format!("{entity} not found"),
            ),
            Error::Forbidden(msg) => ErrorResponse::with_code(status, "FORBIDDEN", msg),
            err @ (Error::UnresolvedEntityType { .. } | Error::Config(_)) => {
                tracing::error!("Resource configuration error: {}", err);
                ErrorResponse::with_code(status, "CONFIG_ERROR", "Resource is misconfigured")
            }
            other => {
                tracing::error!("Action failed: {}", other);
                ErrorResponse::with_code(status, "INTERNAL_ERROR", "Internal server error")
            }
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_with_code() {
        let err = ErrorResponse::with_code(StatusCode::NOT_FOUND, "NOT_FOUND", "Widget not found");
        assert_eq!(err.status, 404);
        assert_eq!(err.error, "Widget not found");
        assert_eq!(err.code, Some("NOT_FOUND".to_string()));
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let response = Error::not_found("Widget", "42").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_forbidden_maps_to_403() {
        let response = Error::Forbidden("nope".into()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_configuration_errors_are_internal() {
        let err = Error::UnresolvedEntityType {
            handler: "GadgetsController".into(),
            name: "Gadget".into(),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_string(),
            "Unresolved entity type 'Gadget' for handler 'GadgetsController'"
        );
    }

    #[test]
    fn test_hook_errors_convert_from_anyhow() {
        let err: Error = anyhow::anyhow!("boom").into();
        assert!(matches!(err, Error::Hook(_)));
    }
}
