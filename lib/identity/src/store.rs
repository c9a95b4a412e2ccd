//! Account store abstraction.
//!
//! The account store is the external system of record for accounts, roles
//! and permissions, and the only shared mutable resource this crate touches.
//! Implementations must make each call atomic for a single account.
//! `InMemoryAccountStore` is provided for composition and tests.

use async_trait::async_trait;
use keyward_core::UserIdentifier;
use rootcause::prelude::Report;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::account::{Account, ProviderTokens};
use crate::error::StoreError;

/// Trait for account storage.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Looks up an account by its identifier.
    async fn get_account_by_id(
        &self,
        id: &UserIdentifier,
    ) -> Result<Option<Account>, Report<StoreError>>;

    /// Looks up an account by its user name.
    async fn get_account_by_username(
        &self,
        user_name: &str,
    ) -> Result<Option<Account>, Report<StoreError>>;

    /// Returns the provider tokens stored for an account.
    ///
    /// Accounts without linked providers return an empty list.
    async fn get_provider_tokens(
        &self,
        id: &UserIdentifier,
    ) -> Result<Vec<ProviderTokens>, Report<StoreError>>;

    /// Removes roles and permissions from an account in one atomic write.
    async fn remove_roles_and_permissions(
        &self,
        account: &Account,
        roles: &BTreeSet<String>,
        permissions: &BTreeSet<String>,
    ) -> Result<(), Report<StoreError>>;

    /// Adds roles and permissions to an account in one atomic write.
    async fn assign_roles_and_permissions(
        &self,
        account: &Account,
        roles: &BTreeSet<String>,
        permissions: &BTreeSet<String>,
    ) -> Result<(), Report<StoreError>>;

    /// Returns the account's current role set.
    async fn list_roles(&self, account: &Account) -> Result<BTreeSet<String>, Report<StoreError>>;

    /// Returns the account's current permission set.
    async fn list_permissions(
        &self,
        account: &Account,
    ) -> Result<BTreeSet<String>, Report<StoreError>>;
}

#[derive(Debug, Default)]
struct Accounts {
    by_id: HashMap<UserIdentifier, Account>,
    tokens: HashMap<UserIdentifier, Vec<ProviderTokens>>,
}

impl Accounts {
    /// User names match case-insensitively.
    fn find_by_username(&self, user_name: &str) -> Option<&Account> {
        self.by_id
            .values()
            .find(|a| a.user_name().eq_ignore_ascii_case(user_name))
    }

    /// User names are unique, compared case-insensitively.
    fn insert(&mut self, account: Account) -> Result<(), StoreError> {
        let taken = self
            .find_by_username(account.user_name())
            .is_some_and(|existing| existing.id() != account.id());
        if taken {
            return Err(StoreError::Conflict {
                reason: format!("user name '{}' is already taken", account.user_name()),
            });
        }
        self.by_id.insert(account.id().clone(), account);
        Ok(())
    }

    fn get_mut(&mut self, id: &UserIdentifier) -> Result<&mut Account, StoreError> {
        self.by_id
            .get_mut(id)
            .ok_or_else(|| StoreError::AccountMissing { user_id: id.clone() })
    }

    fn get(&self, id: &UserIdentifier) -> Result<&Account, StoreError> {
        self.by_id
            .get(id)
            .ok_or_else(|| StoreError::AccountMissing { user_id: id.clone() })
    }
}

/// Account store held in process memory.
///
/// Every call takes the lock once and releases it before returning, so each
/// mutation is atomic and no lock outlives a call.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    inner: RwLock<Accounts>,
}

impl InMemoryAccountStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with accounts.
    ///
    /// Later accounts replace earlier ones with the same identifier.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if two accounts share a user name.
    pub fn with_accounts(
        accounts: impl IntoIterator<Item = Account>,
    ) -> Result<Self, Report<StoreError>> {
        let mut inner = Accounts::default();
        for account in accounts {
            inner.insert(account)?;
        }
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    /// Inserts or replaces an account.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if another account already uses the same user name.
    pub async fn insert(&self, account: Account) -> Result<(), Report<StoreError>> {
        self.inner.write().await.insert(account)?;
        Ok(())
    }

    /// Replaces the provider tokens stored for an account.
    ///
    /// # Errors
    ///
    /// Returns `AccountMissing` if the account does not exist.
    pub async fn set_provider_tokens(
        &self,
        id: &UserIdentifier,
        tokens: Vec<ProviderTokens>,
    ) -> Result<(), Report<StoreError>> {
        let mut inner = self.inner.write().await;
        inner.get(id)?;
        inner.tokens.insert(id.clone(), tokens);
        Ok(())
    }

    /// Locks the account with the given identifier.
    ///
    /// # Errors
    ///
    /// Returns `AccountMissing` if the account does not exist.
    pub async fn lock(&self, id: &UserIdentifier) -> Result<(), Report<StoreError>> {
        let mut inner = self.inner.write().await;
        inner.get_mut(id)?.lock();
        Ok(())
    }

    /// Returns the number of stored accounts.
    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    /// Returns true if the store holds no accounts.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.by_id.is_empty()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get_account_by_id(
        &self,
        id: &UserIdentifier,
    ) -> Result<Option<Account>, Report<StoreError>> {
        Ok(self.inner.read().await.by_id.get(id).cloned())
    }

    async fn get_account_by_username(
        &self,
        user_name: &str,
    ) -> Result<Option<Account>, Report<StoreError>> {
        Ok(self.inner.read().await.find_by_username(user_name).cloned())
    }

    async fn get_provider_tokens(
        &self,
        id: &UserIdentifier,
    ) -> Result<Vec<ProviderTokens>, Report<StoreError>> {
        Ok(self
            .inner
            .read()
            .await
            .tokens
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    #[instrument(skip(self, account), fields(user_id = %account.id()))]
    async fn remove_roles_and_permissions(
        &self,
        account: &Account,
        roles: &BTreeSet<String>,
        permissions: &BTreeSet<String>,
    ) -> Result<(), Report<StoreError>> {
        let mut inner = self.inner.write().await;
        let changed = inner
            .get_mut(account.id())?
            .remove_assignments(roles, permissions);
        debug!(changed, "removed role assignments");
        Ok(())
    }

    #[instrument(skip(self, account), fields(user_id = %account.id()))]
    async fn assign_roles_and_permissions(
        &self,
        account: &Account,
        roles: &BTreeSet<String>,
        permissions: &BTreeSet<String>,
    ) -> Result<(), Report<StoreError>> {
        let mut inner = self.inner.write().await;
        let changed = inner
            .get_mut(account.id())?
            .add_assignments(roles, permissions);
        debug!(changed, "added role assignments");
        Ok(())
    }

    async fn list_roles(&self, account: &Account) -> Result<BTreeSet<String>, Report<StoreError>> {
        Ok(self.inner.read().await.get(account.id())?.roles().clone())
    }

    async fn list_permissions(
        &self,
        account: &Account,
    ) -> Result<BTreeSet<String>, Report<StoreError>> {
        Ok(self
            .inner
            .read()
            .await
            .get(account.id())?
            .permissions()
            .clone())
    }
}
