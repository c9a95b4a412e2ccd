//! Identity configuration.
//!
//! Settings that decide how sessions are populated and which role guards
//! role administration. Fields with defaults can be omitted when loading
//! from environment variables.

use serde::{Deserialize, Serialize};

use crate::scheme::AuthScheme;

/// Configuration for identity resolution and role administration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Role a caller must hold to change role assignments.
    /// Default: "Admin"
    #[serde(default = "default_admin_role")]
    admin_role: String,
    /// Scheme whose populator applies when a request names none.
    /// Unset means such requests get no session.
    #[serde(default)]
    default_scheme: Option<AuthScheme>,
    /// OAuth providers to register populators for, as a comma-separated string.
    /// Default: "" (none)
    #[serde(default)]
    oauth_providers: String,
    /// Whether the credentials populator loads extended profile fields from
    /// the account store.
    /// Default: false
    #[serde(default)]
    load_profile: bool,
}

fn default_admin_role() -> String {
    "Admin".to_string()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            admin_role: default_admin_role(),
            default_scheme: None,
            oauth_providers: String::new(),
            load_profile: false,
        }
    }
}

impl IdentityConfig {
    /// Creates a configuration builder starting from the defaults.
    #[must_use]
    pub fn builder() -> IdentityConfigBuilder {
        IdentityConfigBuilder::default()
    }

    /// Returns the role required for role administration.
    #[must_use]
    pub fn admin_role(&self) -> &str {
        &self.admin_role
    }

    /// Returns the default auth scheme, if any.
    #[must_use]
    pub fn default_scheme(&self) -> Option<&AuthScheme> {
        self.default_scheme.as_ref()
    }

    /// Returns the configured OAuth provider names, parsed from the
    /// comma-separated string. Blank entries are skipped.
    #[must_use]
    pub fn oauth_providers(&self) -> Vec<&str> {
        self.oauth_providers
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect()
    }

    /// Returns true if credential sessions load extended profile fields.
    #[must_use]
    pub fn load_profile(&self) -> bool {
        self.load_profile
    }
}

/// Builder for `IdentityConfig`.
#[derive(Debug, Default)]
pub struct IdentityConfigBuilder {
    config: IdentityConfig,
    providers: Vec<String>,
}

impl IdentityConfigBuilder {
    /// Sets the role required for role administration.
    #[must_use]
    pub fn admin_role(mut self, role: impl Into<String>) -> Self {
        self.config.admin_role = role.into();
        self
    }

    /// Sets the default auth scheme.
    #[must_use]
    pub fn default_scheme(mut self, scheme: AuthScheme) -> Self {
        self.config.default_scheme = Some(scheme);
        self
    }

    /// Adds an OAuth provider.
    #[must_use]
    pub fn add_oauth_provider(mut self, provider: impl Into<String>) -> Self {
        let provider = provider.into();
        if !self.providers.contains(&provider) {
            self.providers.push(provider);
        }
        self
    }

    /// Enables or disables profile loading for credential sessions.
    #[must_use]
    pub fn load_profile(mut self, enabled: bool) -> Self {
        self.config.load_profile = enabled;
        self
    }

    /// Builds the `IdentityConfig`.
    #[must_use]
    pub fn build(mut self) -> IdentityConfig {
        self.config.oauth_providers = self.providers.join(",");
        self.config
    }
}
