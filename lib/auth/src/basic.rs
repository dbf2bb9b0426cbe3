//! Local username/password authentication.
//!
//! Passwords are stored as Argon2id PHC strings. Every call to
//! [`BasicProvider::authenticate`] performs exactly one hash verification,
//! whether or not the account exists: unknown users and accounts without a
//! local password are checked against a decoy hash computed once at
//! construction. This keeps "no such user" and "wrong password" equally
//! expensive, so response time does not reveal which usernames exist.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use confplanner_core::Result;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::CredentialError;
use crate::user::{User, UserStore};

/// Password the decoy hash is derived from. Its value is irrelevant.
const DECOY_PASSWORD: &str = "00000000";

/// The local credential provider.
pub struct BasicProvider {
    users: Arc<dyn UserStore>,
    params: Params,
    decoy_hash: String,
}

impl BasicProvider {
    /// Display name shown in the login picker.
    pub const NAME: &'static str = "Basic";

    /// Creates a provider using the default Argon2id parameters.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::HashingFailed` if the decoy hash cannot be
    /// computed.
    pub fn new(users: Arc<dyn UserStore>) -> Result<Self, CredentialError> {
        Self::with_params(users, Params::default())
    }

    /// Creates a provider with explicit Argon2id parameters.
    ///
    /// Hashes produced by [`hash_password`](Self::hash_password) and the
    /// decoy share these parameters, which is what keeps the two
    /// verification paths equally expensive.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::HashingFailed` if the decoy hash cannot be
    /// computed.
    pub fn with_params(users: Arc<dyn UserStore>, params: Params) -> Result<Self, CredentialError> {
        let decoy_hash = hash_with(&params, DECOY_PASSWORD)?;
        Ok(Self {
            users,
            params,
            decoy_hash,
        })
    }

    /// Hashes a password for storage.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::HashingFailed` if hashing fails.
    pub fn hash_password(&self, password: &str) -> Result<String, CredentialError> {
        hash_with(&self.params, password)
    }

    /// Hashes a password on the blocking pool, for use from request handlers.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::HashingFailed` if hashing fails.
    pub async fn hash_password_blocking(&self, password: &str) -> Result<String, CredentialError> {
        let params = self.params.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hash_with(&params, &password))
            .await
            .map_err(|e| CredentialError::HashingFailed {
                reason: e.to_string(),
            })?
    }

    /// Verifies a username/password pair.
    ///
    /// Returns `Ok(Some(user))` on an exact match and `Ok(None)` for any kind
    /// of mismatch, including unknown users. Callers must not distinguish
    /// between the two in their response.
    ///
    /// # Errors
    ///
    /// Fails closed: a store failure, a malformed stored hash, or any hasher
    /// error other than a plain mismatch is returned as an error.
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, CredentialError> {
        let user = self
            .users
            .find_by_name(username)
            .await
            .map_err(|e| {
                e.context(CredentialError::UserLookupFailed {
                    username: username.to_string(),
                })
            })?;

        let Some(user) = user else {
            debug!("unknown user, verifying against decoy");
            self.verify(password, self.decoy_hash.clone()).await?;
            return Ok(None);
        };

        let Some(hash) = user.password_hash() else {
            debug!("account has no local password, verifying against decoy");
            self.verify(password, self.decoy_hash.clone()).await?;
            return Ok(None);
        };

        if self.verify(password, hash.to_string()).await? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    /// Runs one verification on the blocking pool.
    async fn verify(&self, password: &str, hash: String) -> Result<bool, CredentialError> {
        let password = password.to_string();
        tokio::task::spawn_blocking(move || verify_hash(&password, &hash))
            .await
            .map_err(|e| CredentialError::HashingFailed {
                reason: e.to_string(),
            })?
    }
}

impl std::fmt::Debug for BasicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicProvider")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

fn hasher(params: &Params) -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
}

fn hash_with(params: &Params, password: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher(params)
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| CredentialError::HashingFailed {
            reason: e.to_string(),
        })?;
    Ok(hash.to_string())
}

/// Checks a password against a PHC hash.
///
/// Only `argon2::password_hash::Error::Password` counts as a mismatch.
fn verify_hash(password: &str, hash: &str) -> Result<bool, CredentialError> {
    let parsed = PasswordHash::new(hash).map_err(|e| CredentialError::HashingFailed {
        reason: format!("invalid stored hash: {e}"),
    })?;

    // The PHC string carries its own parameters; the hasher's are unused here.
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(CredentialError::HashingFailed {
            reason: e.to_string(),
        }
        .into()),
    }
}
