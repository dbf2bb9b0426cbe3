//! Centralized server configuration.
//!
//! Loaded via the `config` crate from an optional file (path taken from
//! `CONFPLANNER_CONFIG`, default `config`, any supported extension) layered
//! under `CONFPLANNER__`-prefixed environment variables, e.g.
//! `CONFPLANNER__SERVER__PORT=9000`.
//!
//! See [`OidcProviderConfig`] for the per-provider settings.

use confplanner_auth::OidcProviderConfig;
use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
use serde::Deserialize;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_VAR: &str = "CONFPLANNER_CONFIG";

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpConfig,

    /// PostgreSQL connection URL. Users are kept in memory when unset.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Whether unknown users may be provisioned on first login.
    #[serde(default = "default_true")]
    pub accept_registrations: bool,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

/// Listener and public URL settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Public URL of the API root. OIDC callbacks are registered beneath it.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: default_base_url(),
        }
    }
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Set to false for local HTTP development.
    #[serde(default = "default_true")]
    pub secure_cookies: bool,

    /// Interval between sweeps of abandoned OIDC journeys, in seconds. Must be
    /// non-zero.
    #[serde(default = "default_pending_state_sweep_seconds")]
    pub pending_state_sweep_seconds: u64,
}

fn default_pending_state_sweep_seconds() -> u64 {
    60
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secure_cookies: true,
            pending_state_sweep_seconds: default_pending_state_sweep_seconds(),
        }
    }
}

/// Which providers to register.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Registers the local username/password provider as `basic`.
    #[serde(default = "default_true")]
    pub enable_basic_auth: bool,

    /// External identity providers, listed in login-picker order.
    #[serde(default)]
    pub providers: Vec<OidcProviderConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enable_basic_auth: true,
            providers: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl ServerConfig {
    /// Loads configuration from the optional file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or a value is invalid.
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| "config".to_string());
        let builder = Config::builder()
            .add_source(File::with_name(&path).required(false))
            .add_source(
                Environment::with_prefix("CONFPLANNER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, config::ConfigError> {
        let config: Self = builder.build()?.try_deserialize()?;
        if config.session.pending_state_sweep_seconds == 0 {
            return Err(config::ConfigError::Message(
                "session.pending_state_sweep_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }

    /// Returns the socket address to listen on.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
