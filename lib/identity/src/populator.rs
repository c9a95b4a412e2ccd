//! Session populators and the process-wide populator registry.
//!
//! A populator fills a fresh session from a principal, optionally calling
//! back into the account store. Populators are keyed by `AuthScheme` and
//! dispatched through an explicit table; there is no runtime type lookup.
//!
//! Every populator must be idempotent: it overwrites the fields it owns and
//! never appends, so populating two fresh sessions from one principal gives
//! equal sessions. Required claims are checked and store reads are done
//! before the session is touched, so a failed population leaves it empty.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyward_core::UserIdentifier;
use rootcause::prelude::Report;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::account::ProviderTokens;
use crate::config::IdentityConfig;
use crate::error::IdentityError;
use crate::principal::{Principal, ProviderClaim, claim_types};
use crate::request::RequestContext;
use crate::scheme::AuthScheme;
use crate::session::Session;
use crate::store::AccountStore;

/// Fills a session of type `S` from a principal.
#[async_trait]
pub trait SessionPopulator<S = Session>: Send + Sync {
    /// The scheme this populator is registered under.
    fn scheme(&self) -> &AuthScheme;

    /// Populates `session` from `principal`.
    ///
    /// # Errors
    ///
    /// Returns `PopulationFailed` when the principal lacks a claim this
    /// populator structurally requires. Optional claims never cause errors.
    async fn populate(
        &self,
        request: &RequestContext<S>,
        session: &mut S,
        principal: &Principal,
    ) -> Result<(), Report<IdentityError>>;
}

/// Process-wide table of populators keyed by scheme.
pub struct PopulatorRegistry<S = Session> {
    populators: HashMap<AuthScheme, Arc<dyn SessionPopulator<S>>>,
    default_scheme: Option<AuthScheme>,
}

impl<S> PopulatorRegistry<S> {
    /// Creates an empty registry with no default scheme.
    #[must_use]
    pub fn new() -> Self {
        Self {
            populators: HashMap::new(),
            default_scheme: None,
        }
    }

    /// Sets the scheme used when a request names none.
    #[must_use]
    pub fn with_default_scheme(mut self, scheme: AuthScheme) -> Self {
        self.default_scheme = Some(scheme);
        self
    }

    /// Registers a populator under its own scheme.
    #[must_use]
    pub fn with_populator(mut self, populator: Arc<dyn SessionPopulator<S>>) -> Self {
        self.register(populator);
        self
    }

    /// Registers a populator under its own scheme, returning the one it replaced.
    pub fn register(
        &mut self,
        populator: Arc<dyn SessionPopulator<S>>,
    ) -> Option<Arc<dyn SessionPopulator<S>>> {
        self.populators.insert(populator.scheme().clone(), populator)
    }

    #[must_use]
    pub fn get(&self, scheme: &AuthScheme) -> Option<&Arc<dyn SessionPopulator<S>>> {
        self.populators.get(scheme)
    }

    #[must_use]
    pub fn default_scheme(&self) -> Option<&AuthScheme> {
        self.default_scheme.as_ref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.populators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.populators.is_empty()
    }

    /// Finds the populator that applies to `request`.
    ///
    /// The request-local populator wins. Otherwise the registry is consulted
    /// with the request's scheme, or the default scheme if the request names
    /// none. A named scheme with no registered populator yields `None`; it
    /// does not fall back to the default.
    #[must_use]
    pub fn resolve(&self, request: &RequestContext<S>) -> Option<Arc<dyn SessionPopulator<S>>> {
        if let Some(local) = request.local_populator() {
            return Some(Arc::clone(local));
        }
        let scheme = request.scheme().or(self.default_scheme.as_ref())?;
        self.populators.get(scheme).cloned()
    }
}

impl PopulatorRegistry<Session> {
    /// Builds the registry of built-in populators described by `config`.
    ///
    /// Registers credentials (profile-loading if configured), JWT and API key
    /// populators, plus one OAuth populator per configured provider.
    #[must_use]
    pub fn standard(config: &IdentityConfig, store: Arc<dyn AccountStore>) -> Self {
        let credentials: Arc<dyn SessionPopulator> = if config.load_profile() {
            Arc::new(AccountProfilePopulator::new(AuthScheme::Credentials, store))
        } else {
            Arc::new(ClaimsPopulator::new(AuthScheme::Credentials))
        };

        let mut registry = Self::new()
            .with_populator(credentials)
            .with_populator(Arc::new(ClaimsPopulator::new(AuthScheme::Jwt)))
            .with_populator(Arc::new(ClaimsPopulator::new(AuthScheme::ApiKey)));
        for provider in config.oauth_providers() {
            registry.register(Arc::new(OAuthPopulator::new(provider)));
        }
        if let Some(scheme) = config.default_scheme() {
            if registry.get(scheme).is_none() {
                warn!(
                    scheme = %scheme,
                    "default scheme has no registered populator; requests without a scheme get no session"
                );
            }
            registry = registry.with_default_scheme(scheme.clone());
        }
        registry
    }
}

impl<S> Default for PopulatorRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for PopulatorRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes: Vec<String> = self.populators.keys().map(ToString::to_string).collect();
        schemes.sort();
        f.debug_struct("PopulatorRegistry")
            .field("schemes", &schemes)
            .field("default_scheme", &self.default_scheme)
            .finish()
    }
}

/// Returns the principal's identifier or a `PopulationFailed` error.
fn required_identifier(
    scheme: &AuthScheme,
    principal: &Principal,
) -> Result<UserIdentifier, Report<IdentityError>> {
    principal
        .identifier()
        .and_then(|id| UserIdentifier::new(id).ok())
        .ok_or_else(|| {
            IdentityError::PopulationFailed {
                scheme: scheme.clone(),
                claim: claim_types::SUBJECT.to_string(),
            }
            .into()
        })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

/// Joins first and last name, using whichever is present.
fn full_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
    match (first, last) {
        (Some(first), Some(last)) => Some(format!("{first} {last}")),
        (Some(name), None) | (None, Some(name)) => Some(name.to_string()),
        (None, None) => None,
    }
}

/// Copies the standard claims onto the session.
///
/// Display name falls back to the user name, then to "first last".
fn apply_claims(
    scheme: &AuthScheme,
    session: &mut Session,
    principal: &Principal,
) -> Result<(), Report<IdentityError>> {
    let id = required_identifier(scheme, principal)?;

    let user_name = non_empty(principal.first(claim_types::USER_NAME));
    let first_name = non_empty(principal.first(claim_types::GIVEN_NAME));
    let last_name = non_empty(principal.first(claim_types::FAMILY_NAME));
    let display_name = non_empty(principal.first(claim_types::DISPLAY_NAME))
        .or_else(|| user_name.clone())
        .or_else(|| full_name(first_name.as_deref(), last_name.as_deref()));

    session.set_user_auth_id(Some(id));
    session.set_user_name(user_name);
    session.set_display_name(display_name);
    session.set_names(first_name, last_name);
    session.set_email(non_empty(principal.first(claim_types::EMAIL)));
    session.set_roles(
        principal
            .all(claim_types::ROLE)
            .map(str::to_string)
            .collect(),
    );
    session.set_permissions(
        principal
            .all(claim_types::PERMISSION)
            .map(str::to_string)
            .collect(),
    );
    session.set_auth_provider(Some(scheme.provider_name().to_string()));
    session.set_authenticated(true);
    Ok(())
}

/// Populates a session from the principal's claims alone.
#[derive(Debug, Clone)]
pub struct ClaimsPopulator {
    scheme: AuthScheme,
}

impl ClaimsPopulator {
    #[must_use]
    pub fn new(scheme: AuthScheme) -> Self {
        Self { scheme }
    }
}

#[async_trait]
impl SessionPopulator for ClaimsPopulator {
    fn scheme(&self) -> &AuthScheme {
        &self.scheme
    }

    async fn populate(
        &self,
        _request: &RequestContext,
        session: &mut Session,
        principal: &Principal,
    ) -> Result<(), Report<IdentityError>> {
        apply_claims(&self.scheme, session, principal)?;
        debug!(scheme = %self.scheme, "session populated from claims");
        Ok(())
    }
}

/// Populates a session for an OAuth provider login.
///
/// Requires the provider-specific subject claim and records the provider's
/// token data on the session.
#[derive(Debug, Clone)]
pub struct OAuthPopulator {
    scheme: AuthScheme,
}

impl OAuthPopulator {
    #[must_use]
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            scheme: AuthScheme::OAuth(provider.into()),
        }
    }

    fn provider(&self) -> &str {
        self.scheme.provider_name()
    }

    fn expires_at(&self, principal: &Principal) -> Option<DateTime<Utc>> {
        let raw = principal.provider_claim(self.provider(), ProviderClaim::ExpiresAt)?;
        match DateTime::parse_from_rfc3339(raw) {
            Ok(at) => Some(at.with_timezone(&Utc)),
            Err(e) => {
                warn!(provider = self.provider(), error = %e, "ignoring malformed token expiry");
                None
            }
        }
    }
}

#[async_trait]
impl SessionPopulator for OAuthPopulator {
    fn scheme(&self) -> &AuthScheme {
        &self.scheme
    }

    async fn populate(
        &self,
        _request: &RequestContext,
        session: &mut Session,
        principal: &Principal,
    ) -> Result<(), Report<IdentityError>> {
        let provider = self.provider();
        let subject = principal
            .provider_claim(provider, ProviderClaim::Subject)
            .ok_or_else(|| IdentityError::PopulationFailed {
                scheme: self.scheme.clone(),
                claim: ProviderClaim::Subject.claim_type(provider),
            })?;

        let mut tokens = ProviderTokens::new(provider, subject);
        tokens.access_token = principal
            .provider_claim(provider, ProviderClaim::AccessToken)
            .map(str::to_string);
        tokens.refresh_token = principal
            .provider_claim(provider, ProviderClaim::RefreshToken)
            .map(str::to_string);
        tokens.expires_at = self.expires_at(principal);

        apply_claims(&self.scheme, session, principal)?;
        session.set_provider_tokens(vec![tokens]);
        debug!(provider, "session populated for oauth provider");
        Ok(())
    }
}

/// Populates a session from claims, then loads extended profile fields and
/// provider tokens from the account store.
#[derive(Clone)]
pub struct AccountProfilePopulator {
    scheme: AuthScheme,
    store: Arc<dyn AccountStore>,
}

impl AccountProfilePopulator {
    #[must_use]
    pub fn new(scheme: AuthScheme, store: Arc<dyn AccountStore>) -> Self {
        Self { scheme, store }
    }
}

impl fmt::Debug for AccountProfilePopulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountProfilePopulator")
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionPopulator for AccountProfilePopulator {
    fn scheme(&self) -> &AuthScheme {
        &self.scheme
    }

    async fn populate(
        &self,
        request: &RequestContext,
        session: &mut Session,
        principal: &Principal,
    ) -> Result<(), Report<IdentityError>> {
        let id = required_identifier(&self.scheme, principal)?;
        let account = request
            .run_store(self.store.get_account_by_id(&id))
            .await?
            .ok_or_else(|| IdentityError::NotFound { key: id.to_string() })?;
        let tokens = request
            .run_store(self.store.get_provider_tokens(&id))
            .await?;

        apply_claims(&self.scheme, session, principal)?;
        session.set_time_zone(account.time_zone().map(str::to_string));
        session.set_extensions(account.meta().clone());
        session.set_provider_tokens(tokens);
        debug!(user_id = %id, "session populated with account profile");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::principal::Claim;
    use crate::scheme::AuthMethod;
    use crate::session::{DefaultSessionFactory, SessionFactory};
    use crate::store::InMemoryAccountStore;

    fn id(value: &str) -> UserIdentifier {
        UserIdentifier::new(value).expect("valid id")
    }

    fn principal(extra: Vec<Claim>) -> Principal {
        let mut claims = vec![
            Claim::new(claim_types::SUBJECT, "1"),
            Claim::new(claim_types::USER_NAME, "alice"),
            Claim::new(claim_types::ROLE, "Admin"),
            Claim::new(claim_types::PERMISSION, "Publish"),
        ];
        claims.extend(extra);
        Principal::new(claims, AuthMethod::Credentials)
    }

    async fn populate_fresh(
        populator: &dyn SessionPopulator,
        principal: &Principal,
    ) -> Result<Session, Report<IdentityError>> {
        let request = RequestContext::internal();
        let mut session = DefaultSessionFactory.create_session();
        populator.populate(&request, &mut session, principal).await?;
        Ok(session)
    }

    #[tokio::test]
    async fn claims_populator_projects_claims() {
        let populator = ClaimsPopulator::new(AuthScheme::Credentials);
        let session = populate_fresh(&populator, &principal(Vec::new()))
            .await
            .unwrap();

        assert_eq!(session.user_auth_id(), Some(&id("1")));
        assert_eq!(session.user_name(), Some("alice"));
        assert_eq!(session.display_name(), Some("alice"));
        assert!(session.has_role("Admin"));
        assert!(session.has_permission("Publish"));
        assert_eq!(session.auth_provider(), Some("credentials"));
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn claims_populator_is_idempotent() {
        let populator = ClaimsPopulator::new(AuthScheme::Jwt);
        let principal = principal(vec![Claim::new(claim_types::EMAIL, "a@example.com")]);

        let first = populate_fresh(&populator, &principal).await.unwrap();
        let second = populate_fresh(&populator, &principal).await.unwrap();
        assert_eq!(first, second);

        let request = RequestContext::internal();
        let mut twice = first.clone();
        populator
            .populate(&request, &mut twice, &principal)
            .await
            .unwrap();
        assert_eq!(first, twice);
    }

    #[tokio::test]
    async fn display_name_falls_back_to_full_name() {
        let populator = ClaimsPopulator::new(AuthScheme::Credentials);
        let principal = Principal::new(
            vec![
                Claim::new(claim_types::SUBJECT, "2"),
                Claim::new(claim_types::GIVEN_NAME, "Ada"),
                Claim::new(claim_types::FAMILY_NAME, "Lovelace"),
            ],
            AuthMethod::Credentials,
        );
        let session = populate_fresh(&populator, &principal).await.unwrap();
        assert_eq!(session.display_name(), Some("Ada Lovelace"));
        assert!(session.user_name().is_none());
        assert!(session.email().is_none());
    }

    #[tokio::test]
    async fn missing_subject_fails_population() {
        let populator = ClaimsPopulator::new(AuthScheme::Credentials);
        let principal = Principal::new(
            vec![Claim::new(claim_types::USER_NAME, "alice")],
            AuthMethod::Credentials,
        );
        let err = populate_fresh(&populator, &principal).await.unwrap_err();
        assert_eq!(
            err.current_context(),
            &IdentityError::PopulationFailed {
                scheme: AuthScheme::Credentials,
                claim: "sub".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn oauth_populator_requires_provider_subject() {
        let populator = OAuthPopulator::new("github");
        let request = RequestContext::internal();
        let mut session = Session::default();

        let err = populator
            .populate(&request, &mut session, &principal(Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            IdentityError::PopulationFailed { claim, .. } if claim == "provider:github:sub"
        ));
        assert_eq!(session, Session::default());
    }

    #[tokio::test]
    async fn oauth_populator_records_provider_tokens() {
        let populator = OAuthPopulator::new("github");
        let principal = principal(vec![
            Claim::new("provider:github:sub", "gh-1"),
            Claim::new("provider:github:access_token", "access"),
            Claim::new("provider:github:expires_at", "not-a-date"),
            Claim::new("provider:google:sub", "g-1"),
        ]);

        let session = populate_fresh(&populator, &principal).await.unwrap();
        assert_eq!(session.auth_provider(), Some("github"));
        assert_eq!(session.provider_tokens().len(), 1);
        let tokens = &session.provider_tokens()[0];
        assert_eq!(tokens.user_id, "gh-1");
        assert_eq!(tokens.access_token.as_deref(), Some("access"));
        assert!(tokens.refresh_token.is_none());
        assert!(tokens.expires_at.is_none());

        let again = populate_fresh(&populator, &principal).await.unwrap();
        assert_eq!(session, again);
    }

    #[tokio::test]
    async fn profile_populator_loads_from_store() {
        let mut account = Account::new(id("1"), "alice").with_roles(["Admin"]);
        account.set_time_zone(Some("Europe/London".to_string()));
        account.insert_meta("team", "blue");
        let store = Arc::new(InMemoryAccountStore::with_accounts([account]).unwrap());
        store
            .set_provider_tokens(&id("1"), vec![ProviderTokens::new("github", "gh-1")])
            .await
            .unwrap();

        let populator = AccountProfilePopulator::new(AuthScheme::Credentials, store);
        let session = populate_fresh(&populator, &principal(Vec::new()))
            .await
            .unwrap();

        assert_eq!(session.time_zone(), Some("Europe/London"));
        assert_eq!(
            session.extensions().get("team").map(String::as_str),
            Some("blue")
        );
        assert_eq!(session.provider_tokens().len(), 1);

        let again = populate_fresh(&populator, &principal(Vec::new()))
            .await
            .unwrap();
        assert_eq!(session, again);
    }

    #[tokio::test]
    async fn profile_populator_reports_vanished_account() {
        let store = Arc::new(InMemoryAccountStore::new());
        let populator = AccountProfilePopulator::new(AuthScheme::Credentials, store);
        let err = populate_fresh(&populator, &principal(Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            IdentityError::NotFound { .. }
        ));
    }

    #[test]
    fn standard_registry_follows_config() {
        let config = IdentityConfig::builder()
            .add_oauth_provider("github")
            .default_scheme(AuthScheme::Jwt)
            .build();
        let registry =
            PopulatorRegistry::standard(&config, Arc::new(InMemoryAccountStore::new()));

        assert_eq!(registry.len(), 4);
        assert!(
            registry
                .get(&AuthScheme::OAuth("github".to_string()))
                .is_some()
        );
        assert_eq!(registry.default_scheme(), Some(&AuthScheme::Jwt));
    }

    #[test]
    fn standard_registry_with_unregistered_default_scheme() {
        let config = IdentityConfig::builder()
            .add_oauth_provider("github")
            .default_scheme(AuthScheme::OAuth("gitlab".to_string()))
            .build();
        let registry =
            PopulatorRegistry::standard(&config, Arc::new(InMemoryAccountStore::new()));

        assert_eq!(
            registry.default_scheme(),
            Some(&AuthScheme::OAuth("gitlab".to_string()))
        );
        assert!(
            registry
                .get(&AuthScheme::OAuth("gitlab".to_string()))
                .is_none()
        );
        assert!(registry.resolve(&RequestContext::internal()).is_none());
    }

    #[test]
    fn resolve_prefers_request_local_populator() {
        let registry = PopulatorRegistry::<Session>::new()
            .with_populator(Arc::new(ClaimsPopulator::new(AuthScheme::Credentials)))
            .with_default_scheme(AuthScheme::Credentials);

        let plain: RequestContext = RequestContext::internal();
        let resolved = registry.resolve(&plain).expect("default populator");
        assert_eq!(resolved.scheme(), &AuthScheme::Credentials);

        let local = RequestContext::<Session>::internal()
            .with_populator(Arc::new(OAuthPopulator::new("github")));
        let resolved = registry.resolve(&local).expect("local populator");
        assert_eq!(resolved.scheme(), &AuthScheme::OAuth("github".to_string()));
    }

    #[test]
    fn resolve_with_unregistered_scheme_finds_nothing() {
        let registry = PopulatorRegistry::<Session>::new()
            .with_populator(Arc::new(ClaimsPopulator::new(AuthScheme::Credentials)))
            .with_default_scheme(AuthScheme::Credentials);

        let request: RequestContext = RequestContext::internal().with_scheme(AuthScheme::ApiKey);
        assert!(registry.resolve(&request).is_none());

        let empty: PopulatorRegistry = PopulatorRegistry::new();
        assert!(empty.resolve(&RequestContext::internal()).is_none());
    }
}
