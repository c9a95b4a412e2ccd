//! Principals: immutable, verified claim sets.
//!
//! A `Principal` is produced once per resolution call from a stored account
//! and never mutated afterwards. Its claims are a deterministic projection
//! of the account, so resolving the same account twice yields equal values.
//! `PrincipalBuilder` performs the store lookup and the disabled-account
//! check before projecting.

use keyward_core::UserIdentifier;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::account::{Account, ProviderTokens};
use crate::error::IdentityError;
use crate::request::RequestContext;
use crate::scheme::AuthMethod;
use crate::store::AccountStore;

/// Well-known claim types.
pub mod claim_types {
    /// Account identifier.
    pub const SUBJECT: &str = "sub";
    /// Login name.
    pub const USER_NAME: &str = "preferred_username";
    pub const DISPLAY_NAME: &str = "name";
    pub const GIVEN_NAME: &str = "given_name";
    pub const FAMILY_NAME: &str = "family_name";
    pub const EMAIL: &str = "email";
    /// One claim per granted role.
    pub const ROLE: &str = "role";
    /// One claim per granted permission.
    pub const PERMISSION: &str = "perm";
}

/// Per-provider claim fields, rendered as `provider:<name>:<field>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderClaim {
    Subject,
    AccessToken,
    RefreshToken,
    ExpiresAt,
}

impl ProviderClaim {
    fn as_str(self) -> &'static str {
        match self {
            Self::Subject => "sub",
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
            Self::ExpiresAt => "expires_at",
        }
    }

    /// Returns the claim type for this field of the given provider.
    #[must_use]
    pub fn claim_type(self, provider: &str) -> String {
        format!("provider:{provider}:{}", self.as_str())
    }
}

/// A single key/value assertion about a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    #[serde(rename = "type")]
    claim_type: String,
    value: String,
}

impl Claim {
    #[must_use]
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn claim_type(&self) -> &str {
        &self.claim_type
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true for a provider access or refresh token claim.
    #[must_use]
    pub fn is_provider_secret(&self) -> bool {
        self.claim_type
            .strip_prefix("provider:")
            .and_then(|rest| rest.rsplit_once(':'))
            .is_some_and(|(_, field)| {
                field == ProviderClaim::AccessToken.as_str()
                    || field == ProviderClaim::RefreshToken.as_str()
            })
    }
}

/// Verified, immutable identity claims for an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    claims: Vec<Claim>,
    auth_method: AuthMethod,
}

impl Principal {
    /// Creates a principal from an explicit claim list.
    ///
    /// Claim order is preserved. Prefer `from_account` for store-backed
    /// principals.
    #[must_use]
    pub fn new(claims: Vec<Claim>, auth_method: AuthMethod) -> Self {
        Self {
            claims,
            auth_method,
        }
    }

    /// Projects a stored account and its provider tokens into claims.
    ///
    /// Order: subject, user name, display name, given/family name, email,
    /// roles (sorted), permissions (sorted), then provider claims sorted by
    /// provider name.
    #[must_use]
    pub fn from_account(
        account: &Account,
        provider_tokens: &[ProviderTokens],
        auth_method: AuthMethod,
    ) -> Self {
        use claim_types::*;

        let mut claims = vec![
            Claim::new(SUBJECT, account.id().as_str()),
            Claim::new(USER_NAME, account.user_name()),
        ];
        let optional = [
            (DISPLAY_NAME, account.display_name()),
            (GIVEN_NAME, account.first_name()),
            (FAMILY_NAME, account.last_name()),
            (EMAIL, account.email()),
        ];
        claims.extend(
            optional
                .into_iter()
                .filter_map(|(kind, value)| value.map(|v| Claim::new(kind, v))),
        );
        claims.extend(account.roles().iter().map(|r| Claim::new(ROLE, r.as_str())));
        claims.extend(
            account
                .permissions()
                .iter()
                .map(|p| Claim::new(PERMISSION, p.as_str())),
        );

        let mut tokens: Vec<&ProviderTokens> = provider_tokens.iter().collect();
        tokens.sort_by(|a, b| a.provider.cmp(&b.provider));
        for token in tokens {
            let provider = token.provider.as_str();
            claims.push(Claim::new(
                ProviderClaim::Subject.claim_type(provider),
                token.user_id.as_str(),
            ));
            if let Some(access) = &token.access_token {
                claims.push(Claim::new(
                    ProviderClaim::AccessToken.claim_type(provider),
                    access.as_str(),
                ));
            }
            if let Some(refresh) = &token.refresh_token {
                claims.push(Claim::new(
                    ProviderClaim::RefreshToken.claim_type(provider),
                    refresh.as_str(),
                ));
            }
            if let Some(expires_at) = token.expires_at {
                claims.push(Claim::new(
                    ProviderClaim::ExpiresAt.claim_type(provider),
                    expires_at.to_rfc3339(),
                ));
            }
        }

        Self {
            claims,
            auth_method,
        }
    }

    #[must_use]
    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    #[must_use]
    pub fn auth_method(&self) -> AuthMethod {
        self.auth_method
    }

    /// Returns the first value of the given claim type.
    #[must_use]
    pub fn first(&self, claim_type: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    /// Returns every value of the given claim type, in claim order.
    pub fn all<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.claims
            .iter()
            .filter(move |c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    /// Returns the account identifier claim, if present.
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        self.first(claim_types::SUBJECT)
    }

    /// Returns the value of a provider-specific claim.
    #[must_use]
    pub fn provider_claim(&self, provider: &str, field: ProviderClaim) -> Option<&str> {
        self.first(&field.claim_type(provider))
    }

    /// Returns true if the principal carries the given role claim.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.all(claim_types::ROLE).any(|r| r == role)
    }
}

/// Builds principals from the account store.
#[derive(Clone)]
pub struct PrincipalBuilder {
    store: Arc<dyn AccountStore>,
}

impl PrincipalBuilder {
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Resolves `user_id` into a principal.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no account has this identifier
    /// - `Unauthorized` if the account is locked
    /// - `Store` / `Cancelled` from the underlying lookups
    #[instrument(skip(self, request), fields(request_id = %request.request_id()))]
    pub async fn build<S>(
        &self,
        request: &RequestContext<S>,
        user_id: &UserIdentifier,
    ) -> Result<Principal, Report<IdentityError>> {
        let account = request
            .run_store(self.store.get_account_by_id(user_id))
            .await?
            .ok_or_else(|| IdentityError::NotFound {
                key: user_id.to_string(),
            })?;

        if account.is_locked() {
            warn!("account is locked");
            return Err(IdentityError::Unauthorized {
                user_id: user_id.clone(),
            }
            .into());
        }

        let tokens = request
            .run_store(self.store.get_provider_tokens(user_id))
            .await?;

        let auth_method = request
            .scheme()
            .map_or(AuthMethod::Identifier, |scheme| scheme.auth_method());
        let principal = Principal::from_account(&account, &tokens, auth_method);
        debug!(claims = principal.claims().len(), "principal built");
        Ok(principal)
    }
}
