//! The OIDC authorization-code journey.
//!
//! A journey starts when the user picks an external provider
//! ([`OidcProvider::start_journey`]) and ends when the provider redirects
//! back with a code ([`OidcProvider::complete_journey`]). The two halves are
//! correlated by a single-use state token held in a pending table:
//!
//! ```text
//! Idle --start--> Pending --complete--> Completed | Rejected | Expired
//! ```
//!
//! The pending record is removed the moment completion begins, whatever the
//! outcome, so a state token can be completed at most once.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use confplanner_core::Result;
use parking_lot::Mutex;
use rand::RngCore;
use rand::rngs::OsRng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::backend::{DiscoveredBackend, OidcBackend};
use crate::error::{JourneyError, OidcSetupError};
use crate::oidc::{ClaimFilter, OidcProviderConfig};
use crate::user::{User, UserStore};

/// Raw bytes of entropy behind each state token.
const STATE_BYTES: usize = 50;

/// How long a user has to come back from the identity provider.
pub const DEFAULT_STATE_TTL: Duration = Duration::minutes(5);

/// Server-side record of an in-flight journey.
struct PendingAuthorization {
    expires_at: DateTime<Utc>,
    /// Recorded for diagnostics only. Clients may legitimately change
    /// address during the redirect round trip.
    ip: String,
    user_agent: String,
    nonce: String,
    pkce_verifier: String,
}

/// One external identity provider.
pub struct OidcProvider {
    name: String,
    backend: Arc<dyn OidcBackend>,
    users: Arc<dyn UserStore>,
    login_filter: Option<ClaimFilter>,
    user_sync_filter: String,
    state_ttl: Duration,
    pending: Mutex<HashMap<String, PendingAuthorization>>,
}

impl OidcProvider {
    /// Discovers the provider described by `config` and builds it.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or discovery fails.
    pub async fn discover(
        config: &OidcProviderConfig,
        callback_url: String,
        users: Arc<dyn UserStore>,
    ) -> Result<Self, OidcSetupError> {
        let backend = DiscoveredBackend::discover(config, callback_url).await?;
        Ok(Self::with_backend(config, Arc::new(backend), users))
    }

    /// Builds a provider around an existing backend.
    #[must_use]
    pub fn with_backend(
        config: &OidcProviderConfig,
        backend: Arc<dyn OidcBackend>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            name: config.name().to_string(),
            backend,
            users,
            login_filter: config.login_filter(),
            user_sync_filter: config.user_sync_filter().to_string(),
            state_ttl: DEFAULT_STATE_TTL,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides how long a pending state stays valid.
    #[must_use]
    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    /// Returns the operator-configured display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts a journey and returns the URL to send the user to.
    ///
    /// The pending state is committed before the URL is returned.
    ///
    /// # Errors
    ///
    /// `EntropyUnavailable` if no state token could be generated.
    #[instrument(skip(self, user_agent), fields(provider = %self.name))]
    pub fn start_journey(&self, ip: &str, user_agent: &str) -> Result<String, JourneyError> {
        let state = generate_state()?;
        let request = self.backend.authorization_request(&state);

        let record = PendingAuthorization {
            expires_at: Utc::now() + self.state_ttl,
            ip: ip.to_string(),
            user_agent: user_agent.to_string(),
            nonce: request.nonce,
            pkce_verifier: request.pkce_verifier,
        };
        self.pending.lock().insert(state, record);

        debug!("journey started");
        Ok(request.url)
    }

    /// Completes a journey from the provider's callback.
    ///
    /// # Errors
    ///
    /// - `InvalidState`: unknown or already-used `state`.
    /// - `StateVerificationFailed`: expired, or a different user agent.
    /// - `TokenExchange`, `MissingIdToken`, `TokenVerification`,
    ///   `MalformedIdToken`: the provider's response did not check out.
    /// - `ClaimMissing`: a configured claim path is absent.
    /// - `NotAuthorised`: the authorization filter rejected the user.
    /// - `UserSyncFailed`: the local account could not be resolved.
    #[instrument(skip(self, auth_code, state, user_agent), fields(provider = %self.name))]
    pub async fn complete_journey(
        &self,
        auth_code: &str,
        state: &str,
        ip: &str,
        user_agent: &str,
    ) -> Result<User, JourneyError> {
        let pending = self
            .pending
            .lock()
            .remove(state)
            .ok_or(JourneyError::InvalidState)?;

        debug!(origin_ip = %pending.ip, "pending state consumed");

        if Utc::now() > pending.expires_at || pending.user_agent != user_agent {
            return Err(JourneyError::StateVerificationFailed.into());
        }

        let id_token = self
            .backend
            .exchange_code(auth_code, pending.pkce_verifier, &pending.nonce)
            .await?;

        let claims = decode_claims(&id_token)?;

        if let Some(filter) = &self.login_filter {
            check_authorisation(&claims, filter)?;
        }

        let username = claim_str(&claims, &self.user_sync_filter)?;
        self.sync_user(&username).await
    }

    /// Finds the local account for `username`, provisioning it if needed.
    async fn sync_user(&self, username: &str) -> Result<User, JourneyError> {
        let sync_failed = || JourneyError::UserSyncFailed {
            username: username.to_string(),
        };

        let existing = self
            .users
            .find_by_name(username)
            .await
            .map_err(|e| e.context(sync_failed()))?;

        if let Some(user) = existing {
            return Ok(user);
        }

        let user = self
            .users
            .create(username, None)
            .await
            .map_err(|e| e.context(sync_failed()))?;

        info!(provider = %self.name, username = user.username(), "provisioned user");
        Ok(user)
    }

    /// Drops pending states that have expired. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|_, record| record.expires_at >= now);
        before - pending.len()
    }

    /// Returns the number of journeys awaiting a callback.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl std::fmt::Debug for OidcProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcProvider")
            .field("name", &self.name)
            .field("login_filter", &self.login_filter)
            .field("user_sync_filter", &self.user_sync_filter)
            .field("state_ttl", &self.state_ttl)
            .finish_non_exhaustive()
    }
}

fn generate_state() -> Result<String, JourneyError> {
    let mut bytes = [0u8; STATE_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| JourneyError::EntropyUnavailable {
            reason: e.to_string(),
        })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Decodes the payload segment of a compact JWT.
///
/// The token must already be verified; this only reads it.
fn decode_claims(id_token: &str) -> Result<Value, JourneyError> {
    let mut parts = id_token.split('.');
    let payload = match (parts.next(), parts.next()) {
        (Some(_), Some(payload)) => payload,
        _ => {
            return Err(JourneyError::MalformedIdToken {
                reason: "expected header.payload.signature".to_string(),
            }
            .into());
        }
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| JourneyError::MalformedIdToken {
            reason: format!("payload is not base64url: {e}"),
        })?;

    Ok(
        serde_json::from_slice(&bytes).map_err(|e| JourneyError::MalformedIdToken {
            reason: format!("payload is not JSON: {e}"),
        })?,
    )
}

/// Walks a dot-separated claim path. Numeric segments index into arrays.
fn lookup<'a>(claims: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(claims, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn check_authorisation(claims: &Value, filter: &ClaimFilter) -> Result<(), JourneyError> {
    let Some(value) = lookup(claims, &filter.claim) else {
        warn!(claim = %filter.claim, "authorization claim missing from ID token");
        return Err(JourneyError::ClaimMissing {
            path: filter.claim.clone(),
        }
        .into());
    };

    let granted: Vec<&str> = match value {
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        Value::String(single) => vec![single.as_str()],
        _ => Vec::new(),
    };

    if filter
        .allowed
        .iter()
        .any(|allowed| granted.contains(&allowed.as_str()))
    {
        Ok(())
    } else {
        Err(JourneyError::NotAuthorised.into())
    }
}

fn claim_str(claims: &Value, path: &str) -> Result<String, JourneyError> {
    match lookup(claims, path).and_then(Value::as_str) {
        Some(value) if !value.trim().is_empty() => Ok(value.to_string()),
        _ => {
            warn!(claim = %path, "user sync claim missing from ID token");
            Err(JourneyError::ClaimMissing {
                path: path.to_string(),
            }
            .into())
        }
    }
}
