//! Command dispatch for the taskcast CLI.
//!
//! The app owns the session store, runs the startup check before every
//! command and watches gateway events: a forced logout sends the user back to
//! the login prompt.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};

use taskcast_core::api::endpoints::DEFAULT_USERS_LIMIT;
use taskcast_core::auth::SESSION_EXPIRED;
use taskcast_core::models::{RegisterRequest, UserProfile};
use taskcast_core::{Config, Gateway, GatewayEvent, SessionState, SessionStore};

use crate::prompt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Login { username: Option<String> },
    Register,
    Logout,
    WhoAmI,
    Users { skip: u32, limit: u32 },
    Help,
}

impl Command {
    /// Parse the arguments following the program name.
    pub fn parse(args: &[String]) -> Result<Self> {
        let command = match args.first().map(String::as_str) {
            None | Some("status") => Command::Status,
            Some("login") => Command::Login {
                username: args.get(1).cloned(),
            },
            Some("register") => Command::Register,
            Some("logout") => Command::Logout,
            Some("whoami") => Command::WhoAmI,
            Some("users") => Command::Users {
                skip: parse_number(args.get(1), "skip", 0)?,
                limit: parse_number(args.get(2), "limit", DEFAULT_USERS_LIMIT)?,
            },
            Some("help") | Some("-h") | Some("--help") => Command::Help,
            Some(other) => bail!("Unknown command: {}", other),
        };
        Ok(command)
    }
}

fn parse_number(arg: Option<&String>, name: &str, default: u32) -> Result<u32> {
    match arg {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid {}: {}", name, raw)),
        None => Ok(default),
    }
}

pub struct App {
    config: Config,
    store: Arc<SessionStore>,
    events: broadcast::Receiver<GatewayEvent>,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        debug!(api = %config.api_base_url, backend = ?config.token_backend, "Config loaded");

        let tokens = config.token_store()?;
        let gateway = Gateway::new(&config, tokens).context("Failed to create HTTP client")?;
        let events = gateway.subscribe();
        let store = Arc::new(SessionStore::new(gateway));

        Ok(Self {
            config,
            store,
            events,
        })
    }

    pub async fn run(&mut self, command: Command) -> Result<()> {
        let state = self.store.check().await;
        debug!(?state, "Startup check finished");
        // A stored token rejected during the check is already reflected in `state`
        if self.take_invalidation() {
            eprintln!("{}", SESSION_EXPIRED);
        }

        let outcome = self.dispatch(command).await;

        if self.take_invalidation() && self.store.handle_invalidation() {
            eprintln!("{}", SESSION_EXPIRED);
            if prompt::is_interactive() {
                return self.login(None).await;
            }
            bail!(SESSION_EXPIRED);
        }
        outcome
    }

    async fn dispatch(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Status => {
                self.print_status();
                Ok(())
            }
            Command::Login { username } => self.login(username).await,
            Command::Register => self.register().await,
            Command::Logout => {
                self.store.logout().await;
                println!("Logged out.");
                Ok(())
            }
            Command::WhoAmI => {
                match self.store.user() {
                    Some(user) => print_profile(&user),
                    None => println!("Not logged in."),
                }
                Ok(())
            }
            Command::Users { skip, limit } => self.list_users(skip, limit).await,
            Command::Help => Ok(()),
        }
    }

    /// Drain pending gateway events; true if any forced logout happened.
    fn take_invalidation(&mut self) -> bool {
        let mut invalidated = false;
        loop {
            match self.events.try_recv() {
                Ok(GatewayEvent::SessionInvalidated) | Err(TryRecvError::Lagged(_)) => {
                    invalidated = true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        invalidated
    }

    fn print_status(&self) {
        let session = self.store.current();
        match session.state() {
            SessionState::Authenticated => {
                if let Some(user) = session.user() {
                    if user.is_admin() {
                        println!("Logged in as {} [admin]", user.display_name());
                    } else {
                        println!("Logged in as {}", user.display_name());
                    }
                }
            }
            SessionState::Anonymous | SessionState::Unknown => {
                println!("Not logged in. Run `taskcast login` to sign in.");
            }
        }
        println!("Backend: {}", self.store.gateway().base_url());
    }

    /// Interactive login, prefilled with the last username.
    async fn login(&mut self, username: Option<String>) -> Result<()> {
        let username = match username {
            Some(u) => u,
            None => prompt::line_with_default("Username", self.config.last_username.as_deref())?,
        };
        let password = prompt::password("Password")?;

        println!("Authenticating...");
        self.store.login(&username, &password).await?;

        if let Err(e) = Config::remember_username(&username) {
            warn!(error = %e, "Failed to save config");
        }
        self.config.last_username = Some(username);

        if let Some(user) = self.store.user() {
            println!("Logged in as {}", user.display_name());
        }
        Ok(())
    }

    async fn register(&mut self) -> Result<()> {
        let username = prompt::line("Username")?;
        let email = prompt::line("Email")?;
        let full_name = prompt::line("Full name")?;
        let password = prompt::password("Password")?;
        let confirm = prompt::password("Confirm password")?;
        if password != confirm {
            bail!("Passwords do not match");
        }

        let data = RegisterRequest {
            username: username.clone(),
            password,
            email,
            full_name,
        };

        println!("Creating account...");
        self.store.register(&data).await?;

        if let Err(e) = Config::remember_username(&username) {
            warn!(error = %e, "Failed to save config");
        }
        self.config.last_username = Some(username);

        if let Some(user) = self.store.user() {
            println!("Account created. Logged in as {}", user.display_name());
        }
        Ok(())
    }

    async fn list_users(&mut self, skip: u32, limit: u32) -> Result<()> {
        if !self.store.is_authenticated() {
            if !prompt::is_interactive() {
                return Err(anyhow!("Not logged in. Run `taskcast login` first."));
            }
            self.login(None).await?;
        }

        let users = self.store.gateway().list_users(skip, limit).await?;
        if users.is_empty() {
            println!("No users.");
        }
        for user in &users {
            println!(
                "{:>5}  {:<20} {:<30} {:<6} {}",
                user.id,
                user.username,
                user.email,
                user.role.as_str(),
                user.full_name
            );
        }
        Ok(())
    }
}

fn print_profile(user: &UserProfile) {
    println!("Username:  {}", user.username);
    println!("Name:      {}", user.full_name);
    println!("Email:     {}", user.email);
    println!("Role:      {}", user.role.as_str());
    println!("Member since {}", user.created_at.format("%Y-%m-%d"));
}
