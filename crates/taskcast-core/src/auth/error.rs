use thiserror::Error;

use crate::api::ApiError;
use crate::models::ValidationError;

use super::StoreError;

/// Why a login or registration did not succeed. `Display` is the message
/// meant for the person at the keyboard.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Rejected locally, nothing was sent.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// The backend refused the request; carries its message or a fallback.
    #[error("{0}")]
    Rejected(String),

    /// No response was obtained.
    #[error("{0}")]
    Network(String),

    /// The token could not be persisted.
    #[error("Could not save session: {0}")]
    Storage(String),

    /// The account exists server-side but signing in with it failed.
    #[error("Account created but login failed: {0}")]
    CreatedButLoginFailed(Box<AuthError>),
}

impl AuthError {
    /// Map a gateway failure, using `fallback` when the server gave no message.
    pub fn from_api(error: &ApiError, fallback: &str) -> Self {
        match error {
            ApiError::NetworkError(e) if e.is_timeout() => {
                AuthError::Network(format!("{}: connection timed out", fallback))
            }
            ApiError::NetworkError(_) => {
                AuthError::Network(format!("{}: unable to reach the server", fallback))
            }
            other => AuthError::Rejected(
                other.server_message().unwrap_or(fallback).to_string(),
            ),
        }
    }

    pub fn from_store(error: &StoreError) -> Self {
        AuthError::Storage(error.to_string())
    }
}
