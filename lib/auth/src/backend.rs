//! The network-facing half of an OIDC provider.
//!
//! [`OidcBackend`] covers the three steps that talk to the identity
//! provider: building the authorization URL, exchanging the authorization
//! code, and verifying the ID token. [`DiscoveredBackend`] implements them
//! with the `openidconnect` crate against a discovered provider.

use async_trait::async_trait;
use confplanner_core::Result;
use openidconnect::core::{CoreAuthenticationFlow, CoreClient, CoreProviderMetadata};
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl, Nonce, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse,
};
use tracing::debug;

use crate::error::{JourneyError, OidcSetupError};
use crate::oidc::OidcProviderConfig;

/// Everything needed to send a user to the identity provider.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// The provider's authorization endpoint, fully parameterised.
    pub url: String,
    /// Nonce embedded in the request; the ID token must echo it.
    pub nonce: String,
    /// PKCE verifier matching the challenge in `url`.
    pub pkce_verifier: String,
}

/// Talks to one identity provider.
#[async_trait]
pub trait OidcBackend: Send + Sync {
    /// Builds the authorization URL carrying `state`.
    fn authorization_request(&self, state: &str) -> AuthorizationRequest;

    /// Exchanges `code` for tokens and verifies the ID token.
    ///
    /// Returns the raw, verified ID token (compact JWT).
    ///
    /// # Errors
    ///
    /// `TokenExchange` if the token endpoint call fails, `MissingIdToken` if
    /// the response has no ID token, and `TokenVerification` if the token's
    /// signature, issuer, audience, expiry or nonce do not check out.
    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: String,
        nonce: &str,
    ) -> Result<String, JourneyError>;
}

/// An [`OidcBackend`] built from a discovered provider.
pub struct DiscoveredBackend {
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    scopes: Vec<String>,
    http_client: reqwest::Client,
}

impl DiscoveredBackend {
    /// Discovers the provider's endpoints and signing keys.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` for a malformed issuer or callback URL, and
    /// `DiscoveryFailed` if the discovery document cannot be fetched.
    pub async fn discover(
        config: &OidcProviderConfig,
        callback_url: String,
    ) -> Result<Self, OidcSetupError> {
        let issuer_url = IssuerUrl::new(config.endpoint().to_string()).map_err(|e| {
            OidcSetupError::InvalidConfiguration {
                reason: format!("invalid issuer URL: {e}"),
            }
        })?;

        let redirect_url =
            RedirectUrl::new(callback_url).map_err(|e| OidcSetupError::InvalidConfiguration {
                reason: format!("invalid callback URL: {e}"),
            })?;

        // Following redirects would let a compromised issuer point us elsewhere.
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| OidcSetupError::InvalidConfiguration {
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http_client)
            .await
            .map_err(|e| OidcSetupError::DiscoveryFailed {
                issuer: config.endpoint().to_string(),
                reason: e.to_string(),
            })?;

        debug!(issuer = config.endpoint(), "discovered OIDC provider");

        Ok(Self {
            provider_metadata,
            client_id: ClientId::new(config.client_id().to_string()),
            client_secret: ClientSecret::new(config.client_secret().to_string()),
            redirect_url,
            // openidconnect always requests `openid` itself.
            scopes: config
                .scopes()
                .into_iter()
                .filter(|scope| *scope != "openid")
                .map(str::to_string)
                .collect(),
            http_client,
        })
    }
}

#[async_trait]
impl OidcBackend for DiscoveredBackend {
    fn authorization_request(&self, state: &str) -> AuthorizationRequest {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let state = state.to_string();
        let mut auth_request = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                move || CsrfToken::new(state),
                Nonce::new_random,
            )
            .set_pkce_challenge(pkce_challenge);

        for scope in &self.scopes {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }

        let (auth_url, _state, nonce) = auth_request.url();

        AuthorizationRequest {
            url: auth_url.to_string(),
            nonce: nonce.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: String,
        nonce: &str,
    ) -> Result<String, JourneyError> {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let token_response = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| JourneyError::TokenExchange {
                reason: format!("token endpoint error: {e}"),
            })?
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
            .request_async(&self.http_client)
            .await
            .map_err(|e| JourneyError::TokenExchange {
                reason: e.to_string(),
            })?;

        let id_token = token_response
            .id_token()
            .ok_or(JourneyError::MissingIdToken)?;

        id_token
            .claims(&client.id_token_verifier(), &Nonce::new(nonce.to_string()))
            .map_err(|e| JourneyError::TokenVerification {
                reason: e.to_string(),
            })?;

        // The verified token serializes back to its compact JWT form.
        let raw = serde_json::to_value(id_token).map_err(|e| JourneyError::MalformedIdToken {
            reason: e.to_string(),
        })?;
        raw.as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                JourneyError::MalformedIdToken {
                    reason: "ID token did not serialize to a string".to_string(),
                }
                .into()
            })
    }
}
