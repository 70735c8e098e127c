//! Core library for taskcast, the client of the deadline forecasting
//! dashboard backend.
//!
//! Two pieces work together:
//!
//! - [`api::Gateway`] sends every backend request, attaching the stored bearer
//!   token and clearing it when the backend rejects it.
//! - [`auth::SessionStore`] owns the signed-in identity and drives login,
//!   registration, logout and the startup check through the gateway.
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskcast_core::{Config, Gateway, SessionStore};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let gateway = Gateway::new(&config, config.token_store()?)?;
//! let store = Arc::new(SessionStore::new(gateway));
//! store.spawn_invalidation_listener();
//!
//! store.check().await;
//! if !store.is_authenticated() {
//!     store.login("an", "secret").await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiError, Gateway, GatewayEvent};
pub use auth::{AuthError, Session, SessionState, SessionStore, TokenStore};
pub use config::Config;
