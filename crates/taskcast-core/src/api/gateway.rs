//! Request gateway: the single chokepoint for calls to the dashboard backend.
//!
//! Every request passes through [`Gateway::execute`], which applies two
//! policies exactly once per request/response pair, in this order:
//!
//! 1. **Credential attachment** - the persisted token (if any) is read once
//!    and sent as `Authorization: Bearer <token>`.
//! 2. **Authorization-failure interception** - a 401 answer to a request that
//!    presented a token clears that token from storage and publishes
//!    [`GatewayEvent::SessionInvalidated`]. The gateway never navigates; the
//!    application decides what to do with the event.
//!
//! Everything else (validation errors, server errors, transport failures) is
//! handed back to the caller untouched. No retries, no queueing.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::auth::{StoreError, TokenStore};
use crate::config::Config;

use super::endpoints::is_credential_exchange;
use super::ApiError;

/// Capacity of the gateway event channel. Events are rare (one per forced
/// logout); a lagging subscriber only needs to learn that one happened.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Signals published by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEvent {
    /// The backend rejected the stored token; it has been deleted.
    SessionInvalidated,
}

/// HTTP client bound to one backend and one token store.
/// Clone is cheap - reqwest::Client and the store are shared.
#[derive(Clone)]
pub struct Gateway {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
    /// Tokens the backend has rejected. The lock also serializes every write
    /// to the token store, so a forced logout can compare-and-clear without
    /// racing a concurrent login.
    rejected: Arc<Mutex<HashSet<String>>>,
    events: broadcast::Sender<GatewayEvent>,
}

impl Gateway {
    /// Create a gateway from configuration.
    pub fn new(config: &Config, tokens: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        Self::with_base_url(
            &config.api_base_url,
            Duration::from_secs(config.request_timeout_secs),
            tokens,
        )
    }

    pub fn with_base_url(
        base_url: &str,
        timeout: Duration,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            rejected: Arc::new(Mutex::new(HashSet::new())),
            events,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Receive future gateway events.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    fn lock_tokens(&self) -> MutexGuard<'_, HashSet<String>> {
        // A poisoned lock still holds a valid set
        self.rejected.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ===== Token access =====

    /// The persisted token, if any. Storage errors are logged and read as
    /// "no token" so a broken store degrades to unauthenticated requests.
    pub fn current_token(&self) -> Option<String> {
        match self.tokens.load() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read stored token");
                None
            }
        }
    }

    /// Persist `token`, or delete the stored token when `None`.
    pub fn replace_token(&self, token: Option<&str>) -> Result<(), StoreError> {
        let _guard = self.lock_tokens();
        match token {
            Some(token) => self.tokens.save(token),
            None => self.tokens.clear(),
        }
    }

    /// Put back a token saved before a login attempt that did not complete.
    ///
    /// A token the backend rejected in the meantime is not restored: the
    /// store is cleared and [`GatewayEvent::SessionInvalidated`] is published
    /// instead, since the rejection itself announced nothing while another
    /// token was stored. Returns true if `previous` was put back as is.
    pub fn restore_token(&self, previous: Option<&str>) -> Result<bool, StoreError> {
        let rejected = self.lock_tokens();
        match previous {
            Some(token) if rejected.contains(token) => {
                self.tokens.clear()?;
                info!("Previous token was rejected meanwhile, not restoring it");
                let _ = self.events.send(GatewayEvent::SessionInvalidated);
                Ok(false)
            }
            Some(token) => {
                self.tokens.save(token)?;
                Ok(true)
            }
            None => {
                self.tokens.clear()?;
                Ok(true)
            }
        }
    }

    /// Delete the stored token if it is still `presented`, and announce it.
    ///
    /// Returns true if this call performed the invalidation. Several requests
    /// rejected with the same token invalidate once; a token written by a
    /// later login is left alone. Either way `presented` is remembered as
    /// rejected.
    fn invalidate(&self, presented: &str) -> bool {
        let mut rejected = self.lock_tokens();
        rejected.insert(presented.to_string());
        match self.tokens.load() {
            Ok(Some(current)) if current == presented => {}
            Ok(_) => {
                debug!("Rejected token already cleared or replaced");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stored token during invalidation");
            }
        }

        if let Err(e) = self.tokens.clear() {
            warn!(error = %e, "Failed to clear rejected token");
        }
        info!("Session invalidated by server, token cleared");
        // No subscribers is fine: the token is already gone
        let _ = self.events.send(GatewayEvent::SessionInvalidated);
        true
    }

    // ===== Request pipeline =====

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request built for `path` through both gateway policies.
    async fn execute(&self, path: &str, request: RequestBuilder) -> Result<Response, ApiError> {
        let token = self.current_token();
        let request = match token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            debug!(path = path, error = %e, "Request failed before a response arrived");
            ApiError::from(e)
        })?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED && !is_credential_exchange(path) {
            if let Some(ref token) = token {
                self.invalidate(token);
            }
        }

        Self::check_response(response).await
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", path, e))
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.execute(path, self.client.get(self.url(path))).await?;
        Self::parse_json(path, response).await
    }

    pub async fn get_with_query<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<T, ApiError> {
        let request = self.client.get(self.url(path)).query(query);
        let response = self.execute(path, request).await?;
        Self::parse_json(path, response).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let request = self.client.post(self.url(path)).json(body);
        let response = self.execute(path, request).await?;
        Self::parse_json(path, response).await
    }

    /// Like [`Gateway::post`] for endpoints whose success body is only
    /// informational: a 2xx answer with an unreadable body is `Ok(None)`.
    /// Non-2xx answers are still errors.
    pub async fn post_lenient<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>, ApiError> {
        let request = self.client.post(self.url(path)).json(body);
        let response = self.execute(path, request).await?;
        match Self::parse_json(path, response).await {
            Ok(value) => Ok(Some(value)),
            Err(ApiError::InvalidResponse(reason)) => {
                debug!(path = path, reason = %reason, "Ignoring unreadable success body");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
