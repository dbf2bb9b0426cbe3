//! OIDC (OpenID Connect) provider configuration.
//!
//! One `OidcProviderConfig` describes one external identity provider that
//! users can pick on the login screen. Operators list these in the server
//! configuration; each becomes an [`OidcProvider`](crate::OidcProvider).

use serde::{Deserialize, Serialize};

/// Configuration for one external OIDC identity provider.
///
/// Fields with defaults can be omitted when loading from configuration
/// files or environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcProviderConfig {
    /// Registry identifier, also the last segment of the callback path.
    identifier: String,
    /// Display name shown in the login picker (e.g. "Company SSO").
    name: String,
    /// The OAuth2 client ID registered with the provider.
    client_id: String,
    /// The OAuth2 client secret.
    client_secret: String,
    /// The issuer URL used for discovery (e.g. "https://auth.example.com/realms/main").
    endpoint: String,
    /// Claim path that must contain one of `login_filter_allowed_values`.
    /// No authorization filter is applied when unset.
    #[serde(default)]
    login_filter: Option<String>,
    /// Values accepted by `login_filter`.
    #[serde(default)]
    login_filter_allowed_values: Vec<String>,
    /// Claim path whose value becomes the local username.
    user_sync_filter: String,
    /// OAuth2 scopes to request as a comma-separated string.
    /// Default: "openid,profile,email"
    #[serde(default = "default_scopes")]
    scopes: String,
}

fn default_scopes() -> String {
    "openid,profile,email".to_string()
}

impl OidcProviderConfig {
    /// Creates a configuration with no authorization filter and the default scopes.
    #[must_use]
    pub fn new(
        identifier: String,
        name: String,
        client_id: String,
        client_secret: String,
        endpoint: String,
        user_sync_filter: String,
    ) -> Self {
        Self {
            identifier,
            name,
            client_id,
            client_secret,
            endpoint,
            login_filter: None,
            login_filter_allowed_values: Vec::new(),
            user_sync_filter,
            scopes: default_scopes(),
        }
    }

    /// Restricts logins to users whose `claim` contains one of `allowed`.
    #[must_use]
    pub fn with_login_filter(mut self, claim: String, allowed: Vec<String>) -> Self {
        self.login_filter = Some(claim);
        self.login_filter_allowed_values = allowed;
        self
    }

    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Returns the issuer URL used for discovery.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the callback URL for this provider under `base_url`.
    #[must_use]
    pub fn callback_url(&self, base_url: &str) -> String {
        format!("{}/login/{}", base_url.trim_end_matches('/'), self.identifier)
    }

    /// Returns the configured authorization filter, if any.
    ///
    /// An empty claim path counts as unset.
    #[must_use]
    pub fn login_filter(&self) -> Option<ClaimFilter> {
        self.login_filter
            .as_deref()
            .filter(|claim| !claim.is_empty())
            .map(|claim| ClaimFilter {
                claim: claim.to_string(),
                allowed: self.login_filter_allowed_values.clone(),
            })
    }

    #[must_use]
    pub fn user_sync_filter(&self) -> &str {
        &self.user_sync_filter
    }

    /// Returns the OAuth2 scopes to request, parsed from the comma-separated string.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// An authorization filter: a claim path plus the values that grant access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimFilter {
    /// Dot-separated claim path, e.g. `realm_access.roles`.
    pub claim: String,
    /// Any one of these in the claim grants access.
    pub allowed: Vec<String>,
}
