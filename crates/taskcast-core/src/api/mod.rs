//! REST client module for the dashboard backend.
//!
//! This module provides the `Gateway` through which every backend call is
//! sent. The backend uses JWT bearer token authentication obtained from
//! `POST /api/auth/login`.

pub mod endpoints;
pub mod error;
pub mod gateway;

pub use error::ApiError;
pub use gateway::{Gateway, GatewayEvent};
