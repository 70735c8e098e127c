//! Authentication module for managing the client session.
//!
//! This module provides:
//! - `SessionStore`: login/register/logout/startup-check and the observable
//!   `Session` snapshot
//! - `TokenStore`: durable storage for the bearer token (file, OS keychain
//!   via keyring, or memory)
//!
//! The token is the only thing persisted. Its expiry is discovered when the
//! backend rejects it.

pub mod error;
pub mod session;
pub mod token_store;

pub use error::AuthError;
pub use session::{Session, SessionState, SessionStore, SESSION_EXPIRED};
pub use token_store::{
    FileTokenStore, KeyringTokenStore, MemoryTokenStore, StoreError, TokenStore, TOKEN_KEY,
};
