//! User identity and the user store contract.
//!
//! The auth layer only needs three things from user management: look a
//! user up by name, look a user up by id, and provision a new account.
//! Everything else about users belongs to the collaborator behind
//! [`UserStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use confplanner_core::{Result, UserId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::UserStoreError;

/// A user account as seen by the auth layer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    id: UserId,
    username: String,
    /// PHC-format password hash. `None` for accounts provisioned via OIDC.
    password_hash: Option<String>,
    admin: bool,
    created_at: DateTime<Utc>,
}

impl User {
    /// Creates a new non-admin user with a fresh id.
    #[must_use]
    pub fn new(username: String, password_hash: Option<String>) -> Self {
        Self {
            id: UserId::new(),
            username,
            password_hash,
            admin: false,
            created_at: Utc::now(),
        }
    }

    /// Creates a user with all fields specified.
    ///
    /// Use this when reconstituting a user from storage.
    #[must_use]
    pub fn with_all_fields(
        id: UserId,
        username: String,
        password_hash: Option<String>,
        admin: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            username,
            password_hash,
            admin,
            created_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the stored password hash, if the account has a local credential.
    #[must_use]
    pub fn password_hash(&self) -> Option<&str> {
        self.password_hash.as_deref()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.admin
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Grants or revokes administrator rights.
    pub fn set_admin(&mut self, admin: bool) {
        self.admin = admin;
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("has_password", &self.password_hash.is_some())
            .field("admin", &self.admin)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Normalises a username for storage and lookup.
///
/// Matching is case-insensitive across every provider. An identity provider
/// claim of `Admin` resolves to a local account registered as `admin`, so
/// only enable an OIDC provider whose user sync claim is controlled by the
/// same people who control local usernames.
#[must_use]
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// The user-management collaborator.
///
/// Lookups return `Ok(None)` when the user does not exist; `Err` is reserved
/// for store failures. Implementations normalise usernames with
/// [`normalize_username`] on both lookup and create.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Finds a user by username.
    async fn find_by_name(&self, username: &str) -> Result<Option<User>, UserStoreError>;

    /// Finds a user by id.
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, UserStoreError>;

    /// Provisions a new account.
    async fn create(
        &self,
        username: &str,
        password_hash: Option<String>,
    ) -> Result<User, UserStoreError>;
}

/// A `UserStore` held entirely in memory.
///
/// Used by tests and by deployments that run without a database.
#[derive(Debug)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<UserId, User>>,
    accept_registrations: bool,
}

impl InMemoryUserStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(accept_registrations: bool) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            accept_registrations,
        }
    }

    /// Inserts a fully-formed user, bypassing the registration gate.
    ///
    /// Returns the stored user, with its username normalised.
    pub fn insert(&self, mut user: User) -> User {
        user.username = normalize_username(&user.username);
        self.users.write().insert(user.id(), user.clone());
        user
    }

    /// Removes a user, returning it if it existed.
    pub fn remove(&self, id: UserId) -> Option<User> {
        self.users.write().remove(&id)
    }

    /// Returns the number of stored users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    /// Returns true if no users are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_name(&self, username: &str) -> Result<Option<User>, UserStoreError> {
        let username = normalize_username(username);
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.username() == username)
            .cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, UserStoreError> {
        Ok(self.users.read().get(&id).cloned())
    }

    async fn create(
        &self,
        username: &str,
        password_hash: Option<String>,
    ) -> Result<User, UserStoreError> {
        if !self.accept_registrations {
            return Err(UserStoreError::RegistrationsClosed.into());
        }

        let username = normalize_username(username);
        let mut users = self.users.write();
        if users.values().any(|u| u.username() == username) {
            return Err(UserStoreError::AlreadyExists { username }.into());
        }

        let user = User::new(username, password_hash);
        users.insert(user.id(), user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_is_not_admin() {
        let user = User::new("alice".to_string(), None);
        assert!(!user.is_admin());
        assert!(user.password_hash().is_none());
    }

    #[test]
    fn debug_output_hides_password_hash() {
        let user = User::new("alice".to_string(), Some("$argon2id$secret".to_string()));
        let debug = format!("{user:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("has_password: true"));
    }

    #[tokio::test]
    async fn create_then_find_by_name_is_case_insensitive() {
        let store = InMemoryUserStore::new(true);
        let created = store.create("Alice", None).await.expect("create");
        assert_eq!(created.username(), "alice");

        let found = store
            .find_by_name("ALICE")
            .await
            .expect("lookup")
            .expect("user exists");
        assert_eq!(found.id(), created.id());
    }

    #[tokio::test]
    async fn find_unknown_returns_none() {
        let store = InMemoryUserStore::new(true);
        assert!(store.find_by_name("nobody").await.expect("lookup").is_none());
        assert!(store.find_by_id(UserId::new()).await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn create_rejects_duplicates() {
        let store = InMemoryUserStore::new(true);
        store.create("bob", None).await.expect("create");
        let err = store.create("Bob", None).await.unwrap_err();
        assert_eq!(
            err.current_context(),
            &UserStoreError::AlreadyExists {
                username: "bob".to_string()
            }
        );
    }

    #[tokio::test]
    async fn create_respects_registration_gate() {
        let store = InMemoryUserStore::new(false);
        let err = store.create("carol", None).await.unwrap_err();
        assert_eq!(err.current_context(), &UserStoreError::RegistrationsClosed);

        // Direct inserts are for seeding and bypass the gate.
        store.insert(User::new("carol".to_string(), None));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn remove_deletes_user() {
        let store = InMemoryUserStore::new(true);
        let user = store.create("dave", None).await.expect("create");
        assert!(store.remove(user.id()).is_some());
        assert!(store.is_empty());
    }
}
