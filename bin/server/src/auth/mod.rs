//! Authentication module for the confplanner server.
//!
//! This module provides:
//! - The login, logout and session routes
//! - Extractors resolving a bearer token or session cookie into a session
//! - A Postgres-backed [`UserStore`] implementation
//!
//! Provider logic and the session store live in `confplanner-auth`; this
//! module only adapts them to HTTP.

pub mod db;
pub mod middleware;
pub mod routes;

use confplanner_auth::{ProviderRegistry, SessionStore, UserStore};
use std::sync::Arc;

use crate::config::SessionConfig;

pub use db::PgUserStore;
pub use middleware::{AuthenticatedSession, ClientInfo, RequireAdmin};
pub use routes::{current_session, login, login_options, logout, register, revoke_session};

/// Registry identifier of the local username/password provider.
pub const BASIC_PROVIDER_ID: &str = "basic";

/// Session cookie name.
pub const SESSION_COOKIE: &str = "confplanner_session";

/// Path the session cookie is scoped to.
pub const SESSION_COOKIE_PATH: &str = "/api";

/// Shared application state.
pub struct AppState {
    /// User lookup and provisioning.
    pub users: Arc<dyn UserStore>,
    /// Configured login providers.
    pub providers: ProviderRegistry,
    /// Live sessions.
    pub sessions: SessionStore,
    /// Session configuration.
    pub session_config: SessionConfig,
}

impl AppState {
    /// Creates a new application state with an empty session store.
    pub fn new(
        users: Arc<dyn UserStore>,
        providers: ProviderRegistry,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            users,
            providers,
            sessions: SessionStore::new(),
            session_config,
        }
    }
}
