//! Session store: the client's single source of truth for "who is signed in".
//!
//! The store owns the current [`Session`] and performs every transition that
//! changes it. Consumers observe it through a `watch` channel, so each update
//! is published as one whole snapshot.
//!
//! ```text
//!   Unknown ──check()──▶ Anonymous ◀──logout() / forced logout──┐
//!      │                    │                                     │
//!      └──check()───────────┴──login() / register()──▶ Authenticated
//! ```
//!
//! Mutating operations (`check`, `login`, `register`, `logout`) run one at a
//! time; a logout issued while a login is in flight waits for it and then
//! wins.

use std::fmt;
use std::sync::{Arc, Weak};

use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::api::{Gateway, GatewayEvent};
use crate::models::{LoginRequest, RegisterRequest, UserProfile};

use super::AuthError;

/// Fallback messages when the server does not explain a failure.
const LOGIN_FAILED: &str = "Login failed";
const REGISTER_FAILED: &str = "Registration failed";

/// Recorded as `last_error` after a forced logout.
pub const SESSION_EXPIRED: &str = "Session expired, please log in again";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Startup check not done yet.
    Unknown,
    Anonymous,
    Authenticated,
}

/// Snapshot of the client session.
///
/// `is_authenticated()` holds exactly when both a token and a profile are
/// present and the backend accepted them.
#[derive(Clone, PartialEq)]
pub struct Session {
    state: SessionState,
    token: Option<String>,
    user: Option<UserProfile>,
    loading: bool,
    last_error: Option<String>,
}

impl Session {
    fn unknown() -> Self {
        Self {
            state: SessionState::Unknown,
            token: None,
            user: None,
            loading: true,
            last_error: None,
        }
    }

    fn anonymous(last_error: Option<String>) -> Self {
        Self {
            state: SessionState::Anonymous,
            token: None,
            user: None,
            loading: false,
            last_error,
        }
    }

    fn authenticated(token: String, user: UserProfile) -> Self {
        Self {
            state: SessionState::Authenticated,
            token: Some(token),
            user: Some(user),
            loading: false,
            last_error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// True while a check/login/register/logout round trip is outstanding.
    /// A loading session is not settled yet.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("user", &self.user)
            .field("loading", &self.loading)
            .field("last_error", &self.last_error)
            .finish()
    }
}

pub struct SessionStore {
    gateway: Gateway,
    session: watch::Sender<Session>,
    /// Held for the whole of each mutating operation.
    operations: Mutex<()>,
}

impl SessionStore {
    pub fn new(gateway: Gateway) -> Self {
        let (session, _) = watch::channel(Session::unknown());
        Self {
            gateway,
            session,
            operations: Mutex::new(()),
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Receive every future session snapshot. The receiver starts with the
    /// current one marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    pub fn current(&self) -> Session {
        self.session.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.borrow().is_authenticated()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.session.borrow().user.clone()
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Startup check: try to resume the persisted session.
    ///
    /// Without a stored token this settles to `Anonymous` with no network
    /// call. With one, the token is validated against the profile endpoint;
    /// any failure discards it.
    pub async fn check(&self) -> SessionState {
        let _op = self.operations.lock().await;

        let Some(token) = self.gateway.current_token() else {
            debug!("No stored token, starting signed out");
            self.session.send_replace(Session::anonymous(None));
            return SessionState::Anonymous;
        };

        self.begin();
        match self.gateway.me().await {
            Ok(user) => {
                info!(username = %user.username, "Resumed stored session");
                self.session.send_replace(Session::authenticated(token, user));
                SessionState::Authenticated
            }
            Err(e) => {
                warn!(error = %e, "Stored token not accepted, discarding it");
                if let Err(e) = self.gateway.replace_token(None) {
                    error!(error = %e, "Failed to delete stored token");
                }
                self.session.send_replace(Session::anonymous(None));
                SessionState::Anonymous
            }
        }
    }

    /// Exchange credentials for a token, then load the profile.
    ///
    /// If the profile cannot be loaded after the token was stored, the token
    /// store is put back the way it was before the call; a failed login never
    /// leaves a token behind.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let _op = self.operations.lock().await;
        self.login_locked(&LoginRequest::new(username, password)).await
    }

    async fn login_locked(&self, credentials: &LoginRequest) -> Result<(), AuthError> {
        if let Err(e) = credentials.validate() {
            return Err(self.fail(e.into()));
        }

        self.begin();
        let previous = self.gateway.current_token();

        let token = match self.gateway.login(credentials).await {
            Ok(response) => {
                if !response.token_type.eq_ignore_ascii_case("bearer") {
                    warn!(token_type = %response.token_type, "Unexpected token type, sending as bearer");
                }
                response.access_token
            }
            Err(e) => {
                warn!(error = %e, username = %credentials.username, "Login rejected");
                return Err(self.fail(AuthError::from_api(&e, LOGIN_FAILED)));
            }
        };

        if let Err(e) = self.gateway.replace_token(Some(&token)) {
            error!(error = %e, "Failed to persist token");
            return Err(self.fail(AuthError::from_store(&e)));
        }

        match self.gateway.me().await {
            Ok(user) => {
                info!(username = %user.username, "Login successful");
                self.session.send_replace(Session::authenticated(token, user));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Profile fetch failed after login, restoring previous token");
                match self.gateway.restore_token(previous.as_deref()) {
                    Ok(true) => {}
                    // The previous token was rejected while this login ran
                    Ok(false) => {
                        self.handle_invalidation();
                    }
                    Err(e) => error!(error = %e, "Failed to restore previous token"),
                }
                Err(self.fail(AuthError::from_api(&e, LOGIN_FAILED)))
            }
        }
    }

    /// Create an account and sign in with it.
    ///
    /// If the account is created but the follow-up login fails, the account
    /// stays; the error says so.
    pub async fn register(&self, data: &RegisterRequest) -> Result<(), AuthError> {
        let _op = self.operations.lock().await;

        if let Err(e) = data.validate() {
            return Err(self.fail(e.into()));
        }

        self.begin();
        match self.gateway.register(data).await {
            Ok(user) => info!(username = %user.username, "Account created"),
            Err(e) => {
                warn!(error = %e, username = %data.username, "Registration rejected");
                return Err(self.fail(AuthError::from_api(&e, REGISTER_FAILED)));
            }
        }

        match self.login_locked(&data.login_request()).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(AuthError::CreatedButLoginFailed(Box::new(e)))),
        }
    }

    /// Sign out. Always ends `Anonymous` with no stored token; the server
    /// call is best effort and its failure is only logged.
    pub async fn logout(&self) {
        let _op = self.operations.lock().await;

        self.begin();
        match self.gateway.logout().await {
            Ok(Some(ack)) if !ack.success => {
                warn!(message = %ack.message, "Server declined logout, clearing local session anyway")
            }
            Ok(Some(ack)) => debug!(message = %ack.message, "Server acknowledged logout"),
            Ok(None) => debug!("Server acknowledged logout"),
            Err(e) => warn!(error = %e, "Server-side logout failed, clearing local session anyway"),
        }

        if let Err(e) = self.gateway.replace_token(None) {
            error!(error = %e, "Failed to delete stored token");
        }
        self.session.send_replace(Session::anonymous(None));
        info!("Logged out");
    }

    /// Apply a forced logout reported by the gateway.
    ///
    /// Returns true if the session changed. An event about a token this
    /// session no longer holds (a newer login restored or replaced it) is
    /// ignored.
    pub fn handle_invalidation(&self) -> bool {
        let persisted = self.gateway.current_token();
        self.session.send_if_modified(|session| {
            if session.state != SessionState::Authenticated {
                return false;
            }
            if session.token.is_some() && session.token == persisted {
                return false;
            }
            info!("Session invalidated by the server");
            *session = Session::anonymous(Some(SESSION_EXPIRED.to_string()));
            true
        })
    }

    /// Keep this store in step with gateway events on a background task.
    ///
    /// The task holds only a weak reference and ends once the store and its
    /// gateway are gone.
    pub fn spawn_invalidation_listener(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let mut events = self.gateway.subscribe();
        let store: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(GatewayEvent::SessionInvalidated) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        match store.upgrade() {
                            Some(store) => {
                                store.handle_invalidation();
                            }
                            None => break,
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn begin(&self) {
        self.session.send_modify(|session| {
            session.loading = true;
            session.last_error = None;
        });
    }

    /// Settle a failed operation, leaving identity untouched.
    fn fail(&self, err: AuthError) -> AuthError {
        self.session.send_modify(|session| {
            session.loading = false;
            session.last_error = Some(err.to_string());
            if session.state == SessionState::Unknown {
                session.state = SessionState::Anonymous;
            }
        });
        err
    }
}
