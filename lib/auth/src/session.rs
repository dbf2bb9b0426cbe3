//! Server-side sessions for authenticated users.
//!
//! A session is created after any provider authenticates a user and is the
//! only credential a client presents afterwards. Sessions live in memory, so
//! a restart logs everyone out.
//!
//! The store keeps two indexes over the same records, one keyed by bearer
//! token and one by numeric session id. Both are updated under a single
//! write lock, so no reader can see one index without the other.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use confplanner_core::{Result, UserId};
use parking_lot::RwLock;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::SessionError;

/// Raw bytes of entropy behind each bearer token.
const TOKEN_BYTES: usize = 100;

/// Numeric session identifier.
///
/// Allocated from a monotonically increasing counter and never reused
/// within the lifetime of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// An authenticated, device-scoped login.
///
/// `username` and `admin` are a snapshot taken at login. Request handling
/// re-reads the live user, so a demoted or deleted account loses access
/// without touching the session.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    user_id: UserId,
    token: String,
    username: String,
    admin: bool,
    ip: String,
    user_agent: String,
    created_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the bearer token clients present on each request.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.admin
    }

    /// Returns the remote address the login came from.
    #[must_use]
    pub fn ip(&self) -> &str {
        &self.ip
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .field("username", &self.username)
            .field("admin", &self.admin)
            .field("ip", &self.ip)
            .field("user_agent", &self.user_agent)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[derive(Debug, Default)]
struct SessionIndex {
    by_token: HashMap<String, Arc<Session>>,
    by_id: HashMap<SessionId, Arc<Session>>,
    next_id: u64,
}

/// In-memory registry of live sessions.
///
/// Construct one per process and share it by reference.
#[derive(Debug, Default)]
pub struct SessionStore {
    index: RwLock<SessionIndex>,
}

impl SessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a new session for an authenticated user.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Conflict` if the generated token or the
    /// allocated id is already live, and `EntropyUnavailable` if the OS
    /// random source fails.
    pub fn create(
        &self,
        user_id: UserId,
        username: &str,
        ip: &str,
        user_agent: &str,
        admin: bool,
    ) -> Result<Arc<Session>, SessionError> {
        let token = generate_token()?;
        self.insert(token, user_id, username, ip, user_agent, admin)
    }

    fn insert(
        &self,
        token: String,
        user_id: UserId,
        username: &str,
        ip: &str,
        user_agent: &str,
        admin: bool,
    ) -> Result<Arc<Session>, SessionError> {
        let mut index = self.index.write();

        let id = SessionId(index.next_id);
        index.next_id += 1;

        if index.by_id.contains_key(&id) || index.by_token.contains_key(&token) {
            return Err(SessionError::Conflict { session_id: id }.into());
        }

        let session = Arc::new(Session {
            id,
            user_id,
            token,
            username: username.to_string(),
            admin,
            ip: ip.to_string(),
            user_agent: user_agent.to_string(),
            created_at: Utc::now(),
        });
        index
            .by_token
            .insert(session.token.clone(), Arc::clone(&session));
        index.by_id.insert(id, Arc::clone(&session));

        Ok(session)
    }

    /// Resolves a bearer token. Empty tokens never match.
    #[must_use]
    pub fn get_by_token(&self, token: &str) -> Option<Arc<Session>> {
        if token.is_empty() {
            return None;
        }
        self.index.read().by_token.get(token).cloned()
    }

    #[must_use]
    pub fn get_by_session_id(&self, id: SessionId) -> Option<Arc<Session>> {
        self.index.read().by_id.get(&id).cloned()
    }

    /// Revokes a session, removing it from both indexes.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` if no live session has this id.
    pub fn destroy(&self, id: SessionId) -> Result<(), SessionError> {
        let mut index = self.index.write();
        let session = index
            .by_id
            .remove(&id)
            .ok_or(SessionError::NotFound { session_id: id })?;
        index.by_token.remove(&session.token);
        Ok(())
    }

    /// Returns the number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.read().by_id.len()
    }

    /// Returns true if there are no live sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.read().by_id.is_empty()
    }
}

fn generate_token() -> Result<String, SessionError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| SessionError::EntropyUnavailable {
            reason: e.to_string(),
        })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
