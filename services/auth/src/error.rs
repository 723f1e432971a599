//! Error taxonomy for the authentication service
//!
//! Every handler returns `AuthError` on failure. The `IntoResponse`
//! implementation defines the external shape: a JSON `{"error": …}` body
//! with the mapped status code. The three reset-code failures are kept
//! distinct internally but share one external message so a caller cannot
//! tell which check failed. No variant reveals whether an email is
//! registered.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Authentication service errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Missing or malformed input
    #[error("{0}")]
    Validation(String),

    /// Registration attempted with an email that is already taken
    #[error("an account with this email already exists")]
    DuplicateUser,

    /// Unknown email or wrong password; deliberately one variant for both
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Email verification failed; uniform across wrong code, expired code,
    /// and already-verified
    #[error("invalid or expired verification code")]
    InvalidVerification,

    /// No password reset is outstanding for this account
    #[error("no password reset requested")]
    NoResetRequested,

    /// The reset code on file has passed its expiry
    #[error("reset code expired")]
    ExpiredResetCode,

    /// The submitted reset code does not match the one on file
    #[error("reset code does not match")]
    InvalidResetCode,

    /// Missing, invalid, expired, or revoked session token
    #[error("authentication required")]
    Unauthenticated,

    /// Authenticated but the account's email is not verified
    #[error("email not verified")]
    EmailNotVerified,

    /// Too many attempts from the same key
    #[error("too many attempts, please try again later")]
    RateLimited,

    /// Collaborator failure; cause is logged, never sent to the caller
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AuthError::DuplicateUser => (StatusCode::CONFLICT, self.to_string()),
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, self.to_string()),
            AuthError::InvalidVerification => (StatusCode::BAD_REQUEST, self.to_string()),
            AuthError::NoResetRequested
            | AuthError::ExpiredResetCode
            | AuthError::InvalidResetCode => (
                StatusCode::BAD_REQUEST,
                "invalid or expired reset code".to_string(),
            ),
            AuthError::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
            AuthError::EmailNotVerified => (StatusCode::FORBIDDEN, self.to_string()),
            AuthError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            AuthError::Internal(cause) => {
                error!("Internal error: {:#}", cause);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

/// Type alias for handler results
pub type AuthResult<T> = Result<T, AuthError>;
