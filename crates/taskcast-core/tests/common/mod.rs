//! In-process stand-in for the dashboard backend's `/api/auth` routes.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Notify;

use taskcast_core::auth::MemoryTokenStore;
use taskcast_core::{Gateway, SessionStore};

pub const USERNAME: &str = "an";
pub const PASSWORD: &str = "matkhau123";

/// Address nothing listens on; connections are refused immediately.
pub const UNREACHABLE: &str = "http://127.0.0.1:1";

struct Account {
    password: String,
    profile: Value,
}

/// Holds requests to one route until the test lets them through.
#[derive(Default)]
pub struct Gate {
    armed: AtomicBool,
    arrived: Notify,
    release: Notify,
}

impl Gate {
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Wait until a request is parked at the gate.
    pub async fn reached(&self) {
        self.arrived.notified().await;
    }

    /// Let the parked request continue; later requests pass freely.
    pub fn open(&self) {
        self.armed.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }

    async fn pass(&self) {
        if self.armed.load(Ordering::SeqCst) {
            self.arrived.notify_one();
            self.release.notified().await;
        }
    }
}

#[derive(Default)]
pub struct MockBackend {
    pub hits: AtomicUsize,
    pub me_hits: AtomicUsize,
    pub logout_hits: AtomicUsize,
    pub me_fails: AtomicBool,
    pub logout_fails: AtomicBool,
    pub login_gate: Gate,
    pub me_gate: Gate,
    pub projects_gate: Gate,
    logout_reply: Mutex<Option<(StatusCode, &'static str)>>,
    accounts: Mutex<HashMap<String, Account>>,
    revoked: Mutex<HashSet<String>>,
}

impl MockBackend {
    /// A backend with one existing account (`an` / `matkhau123`).
    pub fn new() -> Arc<Self> {
        let backend = Self::default();
        backend.add_account(USERNAME, PASSWORD, "an@example.com", "Nguyen An");
        Arc::new(backend)
    }

    pub fn token_for(username: &str) -> String {
        format!("token-{}", username)
    }

    pub fn add_account(&self, username: &str, password: &str, email: &str, full_name: &str) -> Value {
        let mut accounts = self.accounts.lock().unwrap();
        let profile = json!({
            "id": accounts.len() + 1,
            "email": email,
            "username": username,
            "full_name": full_name,
            "role": "user",
            "created_at": "2024-01-15T10:30:00"
        });
        accounts.insert(
            username.to_string(),
            Account {
                password: password.to_string(),
                profile: profile.clone(),
            },
        );
        profile
    }

    pub fn has_account(&self, username: &str) -> bool {
        self.accounts.lock().unwrap().contains_key(username)
    }

    /// Make the backend reject `token` from now on (expiry).
    pub fn revoke(&self, token: &str) {
        self.revoked.lock().unwrap().insert(token.to_string());
    }

    /// Answer logout with a raw `status` and `body` from now on.
    pub fn reply_to_logout(&self, status: StatusCode, body: &'static str) {
        *self.logout_reply.lock().unwrap() = Some((status, body));
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn authenticate(&self, headers: &HeaderMap) -> Option<Value> {
        let token = headers
            .get(AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")?;
        if self.revoked.lock().unwrap().contains(token) {
            return None;
        }
        let username = token.strip_prefix("token-")?;
        self.accounts
            .lock()
            .unwrap()
            .get(username)
            .map(|account| account.profile.clone())
    }
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

fn unauthorized() -> Response {
    detail(StatusCode::UNAUTHORIZED, "Could not validate credentials")
}

async fn login(State(backend): State<Arc<MockBackend>>, Json(body): Json<Value>) -> Response {
    backend.hits.fetch_add(1, Ordering::SeqCst);
    backend.login_gate.pass().await;
    let username = body["username"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();

    let accounts = backend.accounts.lock().unwrap();
    match accounts.get(username) {
        Some(account) if account.password == password => Json(json!({
            "access_token": MockBackend::token_for(username),
            "token_type": "bearer"
        }))
        .into_response(),
        _ => detail(StatusCode::UNAUTHORIZED, "Incorrect username or password"),
    }
}

async fn register(State(backend): State<Arc<MockBackend>>, Json(body): Json<Value>) -> Response {
    backend.hits.fetch_add(1, Ordering::SeqCst);
    let username = body["username"].as_str().unwrap_or_default();
    if backend.has_account(username) {
        return detail(StatusCode::BAD_REQUEST, "Username already registered");
    }
    let profile = backend.add_account(
        username,
        body["password"].as_str().unwrap_or_default(),
        body["email"].as_str().unwrap_or_default(),
        body["full_name"].as_str().unwrap_or_default(),
    );
    (StatusCode::CREATED, Json(profile)).into_response()
}

async fn logout(State(backend): State<Arc<MockBackend>>) -> Response {
    backend.hits.fetch_add(1, Ordering::SeqCst);
    backend.logout_hits.fetch_add(1, Ordering::SeqCst);
    if backend.logout_fails.load(Ordering::SeqCst) {
        return detail(StatusCode::INTERNAL_SERVER_ERROR, "Logout exploded");
    }
    let reply = *backend.logout_reply.lock().unwrap();
    if let Some((status, body)) = reply {
        return (status, body).into_response();
    }
    Json(json!({ "message": "Logged out", "success": true })).into_response()
}

async fn me(State(backend): State<Arc<MockBackend>>, headers: HeaderMap) -> Response {
    backend.hits.fetch_add(1, Ordering::SeqCst);
    backend.me_hits.fetch_add(1, Ordering::SeqCst);
    backend.me_gate.pass().await;
    if backend.me_fails.load(Ordering::SeqCst) {
        return detail(StatusCode::INTERNAL_SERVER_ERROR, "Database unavailable");
    }
    match backend.authenticate(&headers) {
        Some(profile) => Json(profile).into_response(),
        None => unauthorized(),
    }
}

#[derive(Deserialize)]
struct Page {
    skip: usize,
    limit: usize,
}

async fn users(
    State(backend): State<Arc<MockBackend>>,
    headers: HeaderMap,
    Query(page): Query<Page>,
) -> Response {
    backend.hits.fetch_add(1, Ordering::SeqCst);
    if backend.authenticate(&headers).is_none() {
        return unauthorized();
    }
    let mut profiles: Vec<Value> = backend
        .accounts
        .lock()
        .unwrap()
        .values()
        .map(|account| account.profile.clone())
        .collect();
    profiles.sort_by_key(|p| p["id"].as_u64());
    let page: Vec<Value> = profiles.into_iter().skip(page.skip).take(page.limit).collect();
    Json(page).into_response()
}

/// Stand-in for any other protected endpoint (projects, tasks, ...).
async fn projects(State(backend): State<Arc<MockBackend>>, headers: HeaderMap) -> Response {
    backend.hits.fetch_add(1, Ordering::SeqCst);
    backend.projects_gate.pass().await;
    match backend.authenticate(&headers) {
        Some(_) => Json(json!([])).into_response(),
        None => unauthorized(),
    }
}

/// Serve `backend` on an ephemeral local port and return its base URL.
pub async fn serve(backend: Arc<MockBackend>) -> String {
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route("/api/auth/users", get(users))
        .route("/api/projects", get(projects))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn gateway(base_url: &str, tokens: Arc<MemoryTokenStore>) -> Gateway {
    Gateway::with_base_url(base_url, Duration::from_secs(5), tokens).unwrap()
}

/// A session store wired to a running mock backend.
pub struct Harness {
    pub backend: Arc<MockBackend>,
    pub tokens: Arc<MemoryTokenStore>,
    pub store: Arc<SessionStore>,
}

impl Harness {
    pub async fn start(stored_token: Option<&str>) -> Self {
        Self::start_with(MockBackend::new(), stored_token).await
    }

    pub async fn start_with(backend: Arc<MockBackend>, stored_token: Option<&str>) -> Self {
        let base_url = serve(backend.clone()).await;
        Self::connect(backend, &base_url, stored_token)
    }

    pub fn connect(backend: Arc<MockBackend>, base_url: &str, stored_token: Option<&str>) -> Self {
        let tokens = Arc::new(match stored_token {
            Some(token) => MemoryTokenStore::with_token(token),
            None => MemoryTokenStore::new(),
        });
        let store = Arc::new(SessionStore::new(gateway(base_url, tokens.clone())));
        Self {
            backend,
            tokens,
            store,
        }
    }
}
