/// Unified error types for blipd
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the server.
///
/// Every resolver/verifier failure carries an HTTP status and a message;
/// the axum boundary translates it via [`IntoResponse`]. Variants map to
/// the error taxonomy: malformed input (400), unresolvable references
/// (400), federation attempts (406), conflicts (409), semantic violations
/// (400/403/406) and protocol-level faults (500, logged).
#[derive(Error, Debug)]
pub enum ApError {
    /// Malformed query/page parameters or request body
    #[error("{0}")]
    Input(String),

    /// Resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// An internal URL did not resolve to any local resource
    #[error("could not resolve URL \"{0}\"")]
    UnresolvedReference(String),

    /// Reference points outside the local domain
    #[error("federation not implemented")]
    FederationUnsupported,

    /// Missing or invalid credentials
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Acting on behalf of someone else
    #[error("{0}")]
    Forbidden(String),

    /// Semantically valid ActivityPub we deliberately do not accept
    #[error("{0}")]
    Unsupported(String),

    /// Duplicate creation or missing undo target
    #[error("{0}")]
    Conflict(String),

    /// Programming/protocol-level fault, never a user input error
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Database errors
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal server errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApError::Input(_) => StatusCode::BAD_REQUEST,
            ApError::NotFound(_) => StatusCode::NOT_FOUND,
            ApError::UnresolvedReference(_) => StatusCode::BAD_REQUEST,
            ApError::FederationUnsupported => StatusCode::NOT_ACCEPTABLE,
            ApError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApError::Unsupported(_) => StatusCode::NOT_ACCEPTABLE,
            ApError::Conflict(_) => StatusCode::CONFLICT,
            ApError::Protocol(_) | ApError::Database(_) | ApError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApError::Input(_) => "InvalidRequest",
            ApError::NotFound(_) => "NotFound",
            ApError::UnresolvedReference(_) => "UnresolvedReference",
            ApError::FederationUnsupported => "FederationNotImplemented",
            ApError::Authentication(_) => "AuthenticationRequired",
            ApError::Forbidden(_) => "Forbidden",
            ApError::Unsupported(_) => "NotAcceptable",
            ApError::Conflict(_) => "Conflict",
            ApError::Protocol(_) => "ProtocolError",
            ApError::Database(_) | ApError::Internal(_) => "InternalServerError",
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ApError {
    fn into_response(self) -> Response {
        let message = match &self {
            // Protocol faults are bugs, not user input; log loudly and
            // keep details out of the response.
            ApError::Protocol(_) => {
                tracing::error!(error = %self, "protocol-level fault");
                "internal server error".to_string()
            }
            ApError::Database(_) | ApError::Internal(_) => {
                tracing::error!(error = %self, "internal error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message,
        });

        (self.status(), body).into_response()
    }
}

/// Result type alias for server operations
pub type ApResult<T> = Result<T, ApError>;
