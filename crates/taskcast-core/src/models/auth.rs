//! Request and response bodies of the `/api/auth` endpoints.
//!
//! Credentials are transient: they live for the duration of one call and are
//! never written to disk. `Debug` output redacts passwords.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Username length bounds enforced by the backend on registration.
const USERNAME_MIN_LENGTH: usize = 3;
const USERNAME_MAX_LENGTH: usize = 50;

/// Minimum password length enforced by the backend on registration.
const PASSWORD_MIN_LENGTH: usize = 6;

/// Full name length bounds enforced by the backend on registration.
const FULL_NAME_MIN_LENGTH: usize = 2;
const FULL_NAME_MAX_LENGTH: usize = 100;

/// Input rejected before any request is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Username and password required")]
    MissingCredentials,

    #[error("Username must be between {min} and {max} characters")]
    UsernameLength { min: usize, max: usize },

    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Full name must be between {min} and {max} characters")]
    FullNameLength { min: usize, max: usize },

    #[error("Invalid email address")]
    InvalidEmail,
}

/// Body of `POST /api/auth/login`. The backend accepts a username or an email
/// in the `username` field.
#[derive(Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err(ValidationError::MissingCredentials);
        }
        Ok(())
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Body of `POST /api/auth/register`.
#[derive(Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    pub full_name: String,
}

impl RegisterRequest {
    /// Check the same bounds the backend schema enforces, so obviously bad
    /// input never leaves the client.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err(ValidationError::MissingCredentials);
        }

        let username_len = self.username.chars().count();
        if !(USERNAME_MIN_LENGTH..=USERNAME_MAX_LENGTH).contains(&username_len) {
            return Err(ValidationError::UsernameLength {
                min: USERNAME_MIN_LENGTH,
                max: USERNAME_MAX_LENGTH,
            });
        }

        if self.password.chars().count() < PASSWORD_MIN_LENGTH {
            return Err(ValidationError::PasswordTooShort {
                min: PASSWORD_MIN_LENGTH,
            });
        }

        let full_name_len = self.full_name.trim().chars().count();
        if !(FULL_NAME_MIN_LENGTH..=FULL_NAME_MAX_LENGTH).contains(&full_name_len) {
            return Err(ValidationError::FullNameLength {
                min: FULL_NAME_MIN_LENGTH,
                max: FULL_NAME_MAX_LENGTH,
            });
        }

        if !is_plausible_email(&self.email) {
            return Err(ValidationError::InvalidEmail);
        }

        Ok(())
    }

    /// Credentials for the login that follows a successful registration.
    pub fn login_request(&self) -> LoginRequest {
        LoginRequest::new(self.username.clone(), self.password.clone())
    }
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("email", &self.email)
            .field("full_name", &self.full_name)
            .finish()
    }
}

/// A local part, an `@`, and a dotted domain. The backend does the real check.
fn is_plausible_email(email: &str) -> bool {
    match email.trim().split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

/// Response of `POST /api/auth/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Generic `{message, success}` acknowledgement, e.g. from logout.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    pub message: String,
    #[serde(default = "default_success")]
    pub success: bool,
}

fn default_success() -> bool {
    true
}
