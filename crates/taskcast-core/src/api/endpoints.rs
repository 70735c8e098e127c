//! Typed wrappers for the `/api/auth` endpoints.

use serde::Serialize;

use crate::models::{LoginRequest, MessageResponse, RegisterRequest, TokenResponse, UserProfile};

use super::{ApiError, Gateway};

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REGISTER_PATH: &str = "/api/auth/register";
pub const LOGOUT_PATH: &str = "/api/auth/logout";
pub const ME_PATH: &str = "/api/auth/me";
pub const USERS_PATH: &str = "/api/auth/users";

/// Page size the backend uses when none is given.
pub const DEFAULT_USERS_LIMIT: u32 = 100;

/// Endpoints that exchange credentials for a token. A 401 from these means
/// "wrong username or password", not "your session expired".
pub(crate) fn is_credential_exchange(path: &str) -> bool {
    path == LOGIN_PATH || path == REGISTER_PATH
}

#[derive(Serialize)]
struct Page {
    skip: u32,
    limit: u32,
}

impl Gateway {
    /// Exchange credentials for an access token.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<TokenResponse, ApiError> {
        self.post(LOGIN_PATH, credentials).await
    }

    /// Create an account. Does not sign in.
    pub async fn register(&self, data: &RegisterRequest) -> Result<UserProfile, ApiError> {
        self.post(REGISTER_PATH, data).await
    }

    /// Ask the backend to end the session. The backend answers with a
    /// message body, which is accepted but not required.
    pub async fn logout(&self) -> Result<Option<MessageResponse>, ApiError> {
        self.post_lenient(LOGOUT_PATH, &serde_json::json!({})).await
    }

    /// Profile of the user owning the attached token.
    pub async fn me(&self) -> Result<UserProfile, ApiError> {
        self.get(ME_PATH).await
    }

    /// All accounts, paginated. Requires a signed-in user.
    pub async fn list_users(&self, skip: u32, limit: u32) -> Result<Vec<UserProfile>, ApiError> {
        self.get_with_query(USERS_PATH, &Page { skip, limit }).await
    }
}
