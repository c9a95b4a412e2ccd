//! Centralized server configuration.
//!
//! Loaded via the `config` crate from environment variables. Nested keys use
//! a double underscore, e.g. `IDENTITY__ADMIN_ROLE=Owner`.
//!
//! See [`IdentityConfig`](keyward_identity::IdentityConfig) for identity
//! settings.

use keyward_identity::IdentityConfig;
use serde::Deserialize;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// JSON file of accounts loaded into the in-memory store at startup.
    #[serde(default)]
    pub accounts_file: Option<String>,

    /// Identity resolution and role administration settings.
    #[serde(default)]
    pub identity: IdentityConfig,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            accounts_file: None,
            identity: IdentityConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration values are present but invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(
            config::Environment::default()
                .separator("__")
                .try_parsing(true),
        )
    }

    fn from_source(source: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}
