//! Error taxonomy for the session protocol.
//!
//! Store and codec internals never cross the transport boundary: the session
//! manager maps them into these kinds, and the gateway maps each kind to an
//! HTTP status plus a client-safe message. `Internal` is logged server-side
//! and serialized without detail.

use axum::http::StatusCode;
use serde::Serialize;

/// A single invalid field in a registration/login payload.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("email already in use")]
    DuplicateEmail,

    /// Identical for unknown email and wrong password, so responses cannot be
    /// used to enumerate accounts.
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("token required")]
    MissingToken,

    /// Signature/expiry verification failed, or the refresh token is no
    /// longer honored.
    #[error("invalid token")]
    InvalidToken,

    #[error("user inactive or missing")]
    UserInactiveOrMissing,

    #[error("insufficient permissions")]
    InsufficientRole,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) | AuthError::DuplicateEmail => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials
            | AuthError::MissingToken
            | AuthError::InvalidToken
            | AuthError::UserInactiveOrMissing => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientRole => StatusCode::FORBIDDEN,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to put in a response body.
    pub fn client_message(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "Validation failed",
            AuthError::DuplicateEmail => "User already exists with this email",
            AuthError::InvalidCredentials => "Invalid email or password",
            AuthError::MissingToken => "Access token is required",
            AuthError::InvalidToken => "Invalid token",
            AuthError::UserInactiveOrMissing => "Invalid token or user not found",
            AuthError::InsufficientRole => "Insufficient permissions",
            AuthError::Internal(_) => "Internal server error",
        }
    }

    /// Per-field detail for validation failures, absent otherwise.
    pub fn field_errors(&self) -> Option<&[FieldError]> {
        match self {
            AuthError::Validation(fields) => Some(fields),
            _ => None,
        }
    }
}
