//! Role and permission administration.
//!
//! `RoleAdmin` changes the roles and permissions assigned to an account. Each
//! call gates on the configured admin role, validates the user name, looks
//! the account up, performs one atomic store write and then re-reads the
//! account's full role and permission sets.

use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::account::Account;
use crate::config::IdentityConfig;
use crate::error::IdentityError;
use crate::request::RequestContext;
use crate::store::AccountStore;

/// Request to remove roles and permissions from an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnAssignRoles {
    pub user_name: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

/// Request to add roles and permissions to an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignRoles {
    pub user_name: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

/// The account's complete role and permission sets after a change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignmentResult {
    pub all_roles: BTreeSet<String>,
    pub all_permissions: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy)]
enum Change {
    Remove,
    Assign,
}

/// Admin endpoint for role and permission assignments.
#[derive(Clone)]
pub struct RoleAdmin {
    store: Arc<dyn AccountStore>,
    admin_role: String,
}

impl RoleAdmin {
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>, admin_role: impl Into<String>) -> Self {
        Self {
            store,
            admin_role: admin_role.into(),
        }
    }

    /// Creates an admin endpoint guarded by the configured admin role.
    #[must_use]
    pub fn from_config(store: Arc<dyn AccountStore>, config: &IdentityConfig) -> Self {
        Self::new(store, config.admin_role())
    }

    #[must_use]
    pub fn admin_role(&self) -> &str {
        &self.admin_role
    }

    /// Removes roles and permissions from the named account.
    ///
    /// Entries the account does not hold are ignored.
    ///
    /// # Errors
    ///
    /// - `Forbidden` if the caller lacks the admin role
    /// - `InvalidArgument` if the user name is empty
    /// - `NotFound` if no account has this user name
    /// - `Store` / `Cancelled` from the store calls
    #[instrument(skip_all, fields(request_id = %request.request_id(), user_name = %req.user_name))]
    pub async fn unassign_roles<S>(
        &self,
        request: &RequestContext<S>,
        req: &UnAssignRoles,
    ) -> Result<RoleAssignmentResult, Report<IdentityError>> {
        self.apply(
            request,
            Change::Remove,
            &req.user_name,
            &req.roles,
            &req.permissions,
        )
        .await
    }

    /// Adds roles and permissions to the named account.
    ///
    /// Entries the account already holds are not duplicated.
    ///
    /// # Errors
    ///
    /// Same as [`RoleAdmin::unassign_roles`].
    #[instrument(skip_all, fields(request_id = %request.request_id(), user_name = %req.user_name))]
    pub async fn assign_roles<S>(
        &self,
        request: &RequestContext<S>,
        req: &AssignRoles,
    ) -> Result<RoleAssignmentResult, Report<IdentityError>> {
        self.apply(
            request,
            Change::Assign,
            &req.user_name,
            &req.roles,
            &req.permissions,
        )
        .await
    }

    async fn apply<S>(
        &self,
        request: &RequestContext<S>,
        change: Change,
        user_name: &str,
        roles: &BTreeSet<String>,
        permissions: &BTreeSet<String>,
    ) -> Result<RoleAssignmentResult, Report<IdentityError>> {
        request.assert_caller_has_role(&self.admin_role)?;

        let user_name = user_name.trim();
        if user_name.is_empty() {
            return Err(IdentityError::InvalidArgument {
                reason: "user name must not be empty".to_string(),
            }
            .into());
        }

        let account = self.find_account(request, user_name).await?;
        debug!(user_id = %account.id(), ?change, "account found");

        match change {
            Change::Remove => {
                request
                    .run_store(
                        self.store
                            .remove_roles_and_permissions(&account, roles, permissions),
                    )
                    .await?;
            }
            Change::Assign => {
                request
                    .run_store(
                        self.store
                            .assign_roles_and_permissions(&account, roles, permissions),
                    )
                    .await?;
            }
        }

        let all_roles = request.run_store(self.store.list_roles(&account)).await?;
        let all_permissions = request
            .run_store(self.store.list_permissions(&account))
            .await?;

        info!(
            user_id = %account.id(),
            ?change,
            roles = all_roles.len(),
            permissions = all_permissions.len(),
            "role assignments updated"
        );
        Ok(RoleAssignmentResult {
            all_roles,
            all_permissions,
        })
    }

    async fn find_account<S>(
        &self,
        request: &RequestContext<S>,
        user_name: &str,
    ) -> Result<Account, Report<IdentityError>> {
        request
            .run_store(self.store.get_account_by_username(user_name))
            .await?
            .ok_or_else(|| {
                IdentityError::NotFound {
                    key: user_name.to_string(),
                }
                .into()
            })
    }
}

impl fmt::Debug for RoleAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleAdmin")
            .field("admin_role", &self.admin_role)
            .finish_non_exhaustive()
    }
}
