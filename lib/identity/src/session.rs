//! Server-side sessions for authenticated users.
//!
//! A `Session` starts empty (from a `SessionFactory`), is filled at most once
//! by a session populator, and is then handed to the caller, whose session
//! store owns it from that point on. Identifiers and expiry belong to that
//! store, so two sessions populated from the same principal compare equal.

use keyward_core::UserIdentifier;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::account::ProviderTokens;

/// Authenticated context derived from a principal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    user_auth_id: Option<UserIdentifier>,
    user_name: Option<String>,
    display_name: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    time_zone: Option<String>,
    roles: BTreeSet<String>,
    permissions: BTreeSet<String>,
    /// Name of the provider or scheme that populated this session.
    auth_provider: Option<String>,
    provider_tokens: Vec<ProviderTokens>,
    /// Provider- or application-specific extension data.
    extensions: BTreeMap<String, String>,
    is_authenticated: bool,
}

impl Session {
    #[must_use]
    pub fn user_auth_id(&self) -> Option<&UserIdentifier> {
        self.user_auth_id.as_ref()
    }

    #[must_use]
    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    #[must_use]
    pub fn first_name(&self) -> Option<&str> {
        self.first_name.as_deref()
    }

    #[must_use]
    pub fn last_name(&self) -> Option<&str> {
        self.last_name.as_deref()
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    #[must_use]
    pub fn time_zone(&self) -> Option<&str> {
        self.time_zone.as_deref()
    }

    #[must_use]
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    #[must_use]
    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    #[must_use]
    pub fn auth_provider(&self) -> Option<&str> {
        self.auth_provider.as_deref()
    }

    #[must_use]
    pub fn provider_tokens(&self) -> &[ProviderTokens] {
        &self.provider_tokens
    }

    #[must_use]
    pub fn extensions(&self) -> &BTreeMap<String, String> {
        &self.extensions
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn set_user_auth_id(&mut self, id: Option<UserIdentifier>) {
        self.user_auth_id = id;
    }

    pub fn set_user_name(&mut self, user_name: Option<String>) {
        self.user_name = user_name;
    }

    pub fn set_display_name(&mut self, display_name: Option<String>) {
        self.display_name = display_name;
    }

    pub fn set_names(&mut self, first_name: Option<String>, last_name: Option<String>) {
        self.first_name = first_name;
        self.last_name = last_name;
    }

    pub fn set_email(&mut self, email: Option<String>) {
        self.email = email;
    }

    pub fn set_time_zone(&mut self, time_zone: Option<String>) {
        self.time_zone = time_zone;
    }

    pub fn set_roles(&mut self, roles: BTreeSet<String>) {
        self.roles = roles;
    }

    pub fn set_permissions(&mut self, permissions: BTreeSet<String>) {
        self.permissions = permissions;
    }

    pub fn set_auth_provider(&mut self, provider: Option<String>) {
        self.auth_provider = provider;
    }

    /// Replaces the provider tokens, keeping them ordered by provider name.
    pub fn set_provider_tokens(&mut self, mut tokens: Vec<ProviderTokens>) {
        tokens.sort_by(|a, b| a.provider.cmp(&b.provider));
        self.provider_tokens = tokens;
    }

    /// Replaces the extension map.
    pub fn set_extensions(&mut self, extensions: BTreeMap<String, String>) {
        self.extensions = extensions;
    }

    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.is_authenticated = authenticated;
    }
}

/// Produces empty sessions of type `S`.
pub trait SessionFactory<S>: Send + Sync {
    /// Creates a new, unpopulated session.
    fn create_session(&self) -> S;
}

/// Factory for the default `Session` type.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSessionFactory;

impl SessionFactory<Session> for DefaultSessionFactory {
    fn create_session(&self) -> Session {
        Session::default()
    }
}
