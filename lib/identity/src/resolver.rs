//! Identity resolution entry point.
//!
//! `IdentityResolver` turns a user identifier into a principal and, when a
//! populator applies to the request, a freshly populated session.

use keyward_core::UserIdentifier;
use rootcause::prelude::Report;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::IdentityError;
use crate::populator::PopulatorRegistry;
use crate::principal::{Principal, PrincipalBuilder};
use crate::request::RequestContext;
use crate::session::{Session, SessionFactory};
use crate::store::AccountStore;

/// Resolves identities and materializes sessions of type `S`.
pub struct IdentityResolver<S = Session> {
    principals: PrincipalBuilder,
    populators: PopulatorRegistry<S>,
    factory: Arc<dyn SessionFactory<S>>,
}

impl<S> IdentityResolver<S> {
    #[must_use]
    pub fn new(
        store: Arc<dyn AccountStore>,
        populators: PopulatorRegistry<S>,
        factory: Arc<dyn SessionFactory<S>>,
    ) -> Self {
        Self {
            principals: PrincipalBuilder::new(store),
            populators,
            factory,
        }
    }

    #[must_use]
    pub fn populators(&self) -> &PopulatorRegistry<S> {
        &self.populators
    }

    /// Resolves `user_id` into a principal.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no account has this identifier
    /// - `Unauthorized` if the account is disabled
    /// - `Store` / `Cancelled` from the account lookups
    #[instrument(skip(self, request), fields(request_id = %request.request_id()))]
    pub async fn resolve_principal(
        &self,
        request: &RequestContext<S>,
        user_id: &UserIdentifier,
    ) -> Result<Principal, Report<IdentityError>> {
        request.ensure_active()?;
        self.principals.build(request, user_id).await
    }

    /// Creates and populates a session for `principal`.
    ///
    /// Returns `Ok(None)` when no populator applies to the request. The
    /// session is built locally and only returned once populated, so a
    /// failure or cancellation never yields a partial session.
    ///
    /// # Errors
    ///
    /// - `PopulationFailed` if the populator's required claims are missing
    /// - `Cancelled` if the request is cancelled during population
    /// - any error the populator reports from the account store
    #[instrument(skip_all, fields(request_id = %request.request_id()))]
    pub async fn create_session(
        &self,
        request: &RequestContext<S>,
        principal: &Principal,
    ) -> Result<Option<S>, Report<IdentityError>> {
        let Some(populator) = self.populators.resolve(request) else {
            debug!("no session populator applies");
            return Ok(None);
        };

        request.ensure_active()?;
        let mut session = self.factory.create_session();
        populator.populate(request, &mut session, principal).await?;
        request.ensure_active()?;

        debug!(scheme = %populator.scheme(), "session created");
        Ok(Some(session))
    }

    /// Resolves `user_id` and creates its session in one call.
    ///
    /// # Errors
    ///
    /// Any error from `resolve_principal` or `create_session`.
    #[instrument(skip(self, request), fields(request_id = %request.request_id()))]
    pub async fn resolve_session(
        &self,
        request: &RequestContext<S>,
        user_id: &UserIdentifier,
    ) -> Result<(Principal, Option<S>), Report<IdentityError>> {
        let principal = self.resolve_principal(request, user_id).await?;
        let session = self.create_session(request, &principal).await?;
        Ok((principal, session))
    }
}

impl<S> fmt::Debug for IdentityResolver<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("populators", &self.populators)
            .finish_non_exhaustive()
    }
}
