//! Pluggable authentication for confplanner.
//!
//! This crate provides:
//! - Local username/password verification ([`BasicProvider`])
//! - The OIDC authorization-code journey ([`OidcProvider`])
//! - A registry of configured providers ([`ProviderRegistry`])
//! - The in-memory session store ([`SessionStore`])
//!
//! User persistence is not handled here. Providers reach accounts through
//! the [`UserStore`] trait, implemented by the server.
//!
//! # Example
//!
//! ```
//! use confplanner_auth::{InMemoryUserStore, SessionStore, User, UserStore};
//! use std::sync::Arc;
//!
//! let users = Arc::new(InMemoryUserStore::new(true));
//! let alice = users.insert(User::new("Alice".to_string(), None));
//! assert_eq!(alice.username(), "alice");
//!
//! let sessions = SessionStore::new();
//! let session = sessions
//!     .create(alice.id(), alice.username(), "10.0.0.1", "curl/8.0", alice.is_admin())
//!     .unwrap();
//! assert_eq!(
//!     sessions.get_by_token(session.token()).unwrap().id(),
//!     session.id()
//! );
//! ```

pub mod backend;
pub mod basic;
pub mod error;
pub mod journey;
pub mod oidc;
pub mod provider;
pub mod session;
pub mod user;

// Re-export main types at crate root
pub use argon2::Params as HashParams;
pub use backend::{AuthorizationRequest, DiscoveredBackend, OidcBackend};
pub use basic::BasicProvider;
pub use error::{
    CredentialError, JourneyError, OidcSetupError, RegistryError, SessionError, UserStoreError,
};
pub use journey::{DEFAULT_STATE_TTL, OidcProvider};
pub use oidc::{ClaimFilter, OidcProviderConfig};
pub use provider::{AuthProvider, LoginOption, ProviderKind, ProviderRegistry};
pub use session::{Session, SessionId, SessionStore};
pub use user::{InMemoryUserStore, User, UserStore, normalize_username};
