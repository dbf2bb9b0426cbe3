//! Error types for the auth crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `CredentialError`: local username/password verification failures
//! - `JourneyError`: OIDC authorization journey failures
//! - `OidcSetupError`: OIDC provider bootstrap failures
//! - `RegistryError`: provider registration failures
//! - `SessionError`: session store failures
//! - `UserStoreError`: failures reported by the user store collaborator
//!
//! A mismatched password is not an error; `BasicProvider::authenticate`
//! reports it as `Ok(None)`.

use crate::session::SessionId;
use std::fmt;

/// Errors from local credential verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The user store could not be queried.
    UserLookupFailed { username: String },
    /// The stored hash is malformed or the hasher failed.
    HashingFailed { reason: String },
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserLookupFailed { username } => {
                write!(f, "failed to look up user '{username}'")
            }
            Self::HashingFailed { reason } => {
                write!(f, "password hashing failed: {reason}")
            }
        }
    }
}

impl std::error::Error for CredentialError {}

/// Errors from an OIDC authorization journey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JourneyError {
    /// The OS random source could not produce a state token.
    EntropyUnavailable { reason: String },
    /// The state token is unknown, already used, or was swept.
    InvalidState,
    /// The state expired or the callback came from a different user agent.
    StateVerificationFailed,
    /// Exchanging the authorization code with the provider failed.
    TokenExchange { reason: String },
    /// The token response carried no ID token.
    MissingIdToken,
    /// The ID token failed signature or claim verification.
    TokenVerification { reason: String },
    /// The ID token payload could not be decoded.
    MalformedIdToken { reason: String },
    /// A configured claim path is absent from the ID token.
    ClaimMissing { path: String },
    /// The user authenticated but is not in the allow-list.
    NotAuthorised,
    /// Looking up or provisioning the local account failed.
    UserSyncFailed { username: String },
}

impl fmt::Display for JourneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EntropyUnavailable { reason } => {
                write!(f, "could not generate state token: {reason}")
            }
            Self::InvalidState => write!(f, "invalid state"),
            Self::StateVerificationFailed => write!(f, "state verification failed"),
            Self::TokenExchange { reason } => {
                write!(f, "authorization code exchange failed: {reason}")
            }
            Self::MissingIdToken => write!(f, "missing ID token"),
            Self::TokenVerification { reason } => {
                write!(f, "ID token verification failed: {reason}")
            }
            Self::MalformedIdToken { reason } => {
                write!(f, "malformed ID token: {reason}")
            }
            Self::ClaimMissing { path } => {
                write!(f, "claim '{path}' is missing from the ID token")
            }
            Self::NotAuthorised => write!(f, "not authorised"),
            Self::UserSyncFailed { username } => {
                write!(f, "user sync failed for '{username}'")
            }
        }
    }
}

impl std::error::Error for JourneyError {}

/// Errors from constructing an OIDC provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OidcSetupError {
    /// A configured URL or value is invalid.
    InvalidConfiguration { reason: String },
    /// Provider metadata discovery failed.
    DiscoveryFailed { issuer: String, reason: String },
}

impl fmt::Display for OidcSetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfiguration { reason } => {
                write!(f, "invalid OIDC configuration: {reason}")
            }
            Self::DiscoveryFailed { issuer, reason } => {
                write!(f, "OIDC discovery against '{issuer}' failed: {reason}")
            }
        }
    }
}

impl std::error::Error for OidcSetupError {}

/// Errors from the provider registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A provider is already registered under this identifier.
    DuplicateProvider { id: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateProvider { id } => write!(f, "duplicate auth provider: {id}"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Errors from the session store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The generated token or id is already live.
    Conflict { session_id: SessionId },
    /// No live session has this id.
    NotFound { session_id: SessionId },
    /// The OS random source could not produce a token.
    EntropyUnavailable { reason: String },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict { session_id } => write!(f, "session conflict on {session_id}"),
            Self::NotFound { session_id } => write!(f, "session {session_id} does not exist"),
            Self::EntropyUnavailable { reason } => {
                write!(f, "could not generate session token: {reason}")
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Errors reported by a `UserStore` implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserStoreError {
    /// New accounts are not being accepted.
    RegistrationsClosed,
    /// An account with this username already exists.
    AlreadyExists { username: String },
    /// The backing store failed.
    Backend { details: String },
}

impl fmt::Display for UserStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegistrationsClosed => write!(f, "not currently accepting registrations"),
            Self::AlreadyExists { username } => write!(f, "user '{username}' already exists"),
            Self::Backend { details } => write!(f, "user store error: {details}"),
        }
    }
}

impl std::error::Error for UserStoreError {}
