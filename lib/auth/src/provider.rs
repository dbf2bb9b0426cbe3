//! The set of configured authentication providers.
//!
//! Providers are registered once at startup under a unique identifier. The
//! registry remembers registration order so the login picker lists them the
//! way the operator configured them.

use confplanner_core::Result;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::basic::BasicProvider;
use crate::error::RegistryError;
use crate::journey::OidcProvider;

/// Which login flow a provider drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Username and password, verified locally.
    Basic,
    /// Redirect to an external OpenID Connect identity provider.
    Oidc,
}

impl ProviderKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Oidc => "oidc",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered provider.
#[derive(Debug)]
pub enum AuthProvider {
    Basic(BasicProvider),
    Oidc(OidcProvider),
}

impl AuthProvider {
    /// Returns the display name shown in the login picker.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Basic(_) => BasicProvider::NAME,
            Self::Oidc(provider) => provider.name(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Basic(_) => ProviderKind::Basic,
            Self::Oidc(_) => ProviderKind::Oidc,
        }
    }
}

impl From<BasicProvider> for AuthProvider {
    fn from(provider: BasicProvider) -> Self {
        Self::Basic(provider)
    }
}

impl From<OidcProvider> for AuthProvider {
    fn from(provider: OidcProvider) -> Self {
        Self::Oidc(provider)
    }
}

/// One entry in the login picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginOption {
    pub name: String,
    pub identifier: String,
    #[serde(rename = "type")]
    pub kind: ProviderKind,
}

#[derive(Default)]
struct Providers {
    by_id: HashMap<String, Arc<AuthProvider>>,
    order: Vec<String>,
}

/// Registry of providers keyed by identifier.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<Providers>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider under `id`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateProvider` if `id` is taken. The
    /// existing registration is left in place.
    pub fn register(
        &self,
        id: impl Into<String>,
        provider: impl Into<AuthProvider>,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        let mut providers = self.providers.write();
        if providers.by_id.contains_key(&id) {
            return Err(RegistryError::DuplicateProvider { id }.into());
        }
        providers.by_id.insert(id.clone(), Arc::new(provider.into()));
        providers.order.push(id);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<AuthProvider>> {
        self.providers.read().by_id.get(id).cloned()
    }

    /// Returns every provider with its identifier, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<(String, Arc<AuthProvider>)> {
        let providers = self.providers.read();
        providers
            .order
            .iter()
            .filter_map(|id| {
                providers
                    .by_id
                    .get(id)
                    .map(|provider| (id.clone(), Arc::clone(provider)))
            })
            .collect()
    }

    /// Returns the login picker entries, in registration order.
    #[must_use]
    pub fn login_options(&self) -> Vec<LoginOption> {
        self.list()
            .into_iter()
            .map(|(identifier, provider)| LoginOption {
                name: provider.name().to_string(),
                identifier,
                kind: provider.kind(),
            })
            .collect()
    }

    /// Returns the OIDC providers, in registration order.
    #[must_use]
    pub fn oidc_providers(&self) -> Vec<Arc<AuthProvider>> {
        self.list()
            .into_iter()
            .filter(|(_, provider)| provider.kind() == ProviderKind::Oidc)
            .map(|(_, provider)| provider)
            .collect()
    }

    /// Drops expired pending states on every OIDC provider.
    ///
    /// Returns the total number removed.
    pub fn purge_expired_states(&self) -> usize {
        self.oidc_providers()
            .iter()
            .map(|provider| match provider.as_ref() {
                AuthProvider::Oidc(oidc) => oidc.purge_expired(),
                AuthProvider::Basic(_) => 0,
            })
            .sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.read().order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.read().order.is_empty()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.read().order)
            .finish()
    }
}
