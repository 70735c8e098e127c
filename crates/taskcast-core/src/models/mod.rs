//! Data models shared with the backend.
//!
//! - `UserProfile`, `UserRole`: identity of the signed-in user
//! - `LoginRequest`, `RegisterRequest`: transient credential bodies
//! - `TokenResponse`, `MessageResponse`: auth endpoint responses

pub mod auth;
pub mod user;

pub use auth::{LoginRequest, MessageResponse, RegisterRequest, TokenResponse, ValidationError};
pub use user::{UserProfile, UserRole};
