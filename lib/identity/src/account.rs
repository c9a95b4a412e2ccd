//! Account records as exposed by the account store.
//!
//! An `Account` is the system-of-record view of a user: identity fields,
//! role and permission assignments, and an optional lock timestamp.
//! `ProviderTokens` hold per-provider data for accounts linked to external
//! identity providers.

use chrono::{DateTime, Utc};
use keyward_core::UserIdentifier;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A stored user account.
///
/// Accounts are identified by an opaque `UserIdentifier` and also carry a
/// user name used by administrative lookups. A locked account is disabled
/// and cannot be resolved into a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable account identifier.
    id: UserIdentifier,
    /// Login name, unique within the store.
    user_name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    /// IANA time zone name, e.g. "Europe/London".
    #[serde(default)]
    time_zone: Option<String>,
    #[serde(default)]
    roles: BTreeSet<String>,
    #[serde(default)]
    permissions: BTreeSet<String>,
    /// When the account was locked, if it is locked.
    #[serde(default)]
    locked_at: Option<DateTime<Utc>>,
    /// Free-form extension data copied into sessions by profile population.
    #[serde(default)]
    meta: BTreeMap<String, String>,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
}

impl Account {
    /// Creates an unlocked account with no roles or profile data.
    #[must_use]
    pub fn new(id: UserIdentifier, user_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_name: user_name.into(),
            email: None,
            first_name: None,
            last_name: None,
            display_name: None,
            time_zone: None,
            roles: BTreeSet::new(),
            permissions: BTreeSet::new(),
            locked_at: None,
            meta: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the role set.
    #[must_use]
    pub fn with_roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the permission set.
    #[must_use]
    pub fn with_permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn id(&self) -> &UserIdentifier {
        &self.id
    }

    #[must_use]
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
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
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    #[must_use]
    pub fn time_zone(&self) -> Option<&str> {
        self.time_zone.as_deref()
    }

    /// Returns the roles recorded on this snapshot of the account.
    ///
    /// The store's `list_roles` is authoritative after a mutation.
    #[must_use]
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    /// Returns the permissions recorded on this snapshot of the account.
    #[must_use]
    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    #[must_use]
    pub fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta
    }

    #[must_use]
    pub fn locked_at(&self) -> Option<DateTime<Utc>> {
        self.locked_at
    }

    /// Returns true if the account is disabled.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked_at.is_some()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn set_email(&mut self, email: Option<String>) {
        self.email = email;
        self.updated_at = Utc::now();
    }

    /// Sets the first and last name.
    pub fn set_names(&mut self, first_name: Option<String>, last_name: Option<String>) {
        self.first_name = first_name;
        self.last_name = last_name;
        self.updated_at = Utc::now();
    }

    pub fn set_display_name(&mut self, display_name: Option<String>) {
        self.display_name = display_name;
        self.updated_at = Utc::now();
    }

    /// Sets the time zone (IANA name).
    pub fn set_time_zone(&mut self, time_zone: Option<String>) {
        self.time_zone = time_zone;
        self.updated_at = Utc::now();
    }

    /// Inserts or replaces a meta entry.
    pub fn insert_meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.meta.insert(key.into(), value.into());
        self.updated_at = Utc::now();
    }

    /// Locks (disables) the account.
    pub fn lock(&mut self) {
        let now = Utc::now();
        self.locked_at = Some(now);
        self.updated_at = now;
    }

    /// Unlocks the account.
    pub fn unlock(&mut self) {
        self.locked_at = None;
        self.updated_at = Utc::now();
    }

    /// Removes the given roles and permissions. Returns true if anything changed.
    pub(crate) fn remove_assignments(
        &mut self,
        roles: &BTreeSet<String>,
        permissions: &BTreeSet<String>,
    ) -> bool {
        let before = (self.roles.len(), self.permissions.len());
        self.roles.retain(|r| !roles.contains(r));
        self.permissions.retain(|p| !permissions.contains(p));
        let changed = before != (self.roles.len(), self.permissions.len());
        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }

    /// Adds the given roles and permissions. Returns true if anything changed.
    pub(crate) fn add_assignments(
        &mut self,
        roles: &BTreeSet<String>,
        permissions: &BTreeSet<String>,
    ) -> bool {
        let before = (self.roles.len(), self.permissions.len());
        self.roles.extend(roles.iter().cloned());
        self.permissions.extend(permissions.iter().cloned());
        let changed = before != (self.roles.len(), self.permissions.len());
        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }
}

/// Tokens and identity data stored for one external provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTokens {
    /// Provider name, e.g. "github".
    pub provider: String,
    /// The user's subject id at the provider.
    pub user_id: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ProviderTokens {
    /// Creates a token record with only the provider subject set.
    #[must_use]
    pub fn new(provider: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            user_id: user_id.into(),
            access_token: None,
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Sets the access token.
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }
}
