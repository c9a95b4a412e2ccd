//! Per-request context passed through resolution and admin flows.
//!
//! A `RequestContext` carries everything the core needs to know about the
//! current request: who is calling, which auth scheme is active, an optional
//! request-local session populator, and the request's cancellation token.

use keyward_core::{RequestId, UserIdentifier};
use rootcause::prelude::Report;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{IdentityError, StoreError};
use crate::populator::SessionPopulator;
use crate::principal::{Principal, claim_types};
use crate::scheme::AuthScheme;
use crate::session::Session;

/// Who issued the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// In-process caller; bypasses role gates.
    Internal,
    /// No identity was presented.
    Anonymous,
    /// An identified user with their granted roles.
    User {
        id: UserIdentifier,
        roles: BTreeSet<String>,
    },
}

impl Caller {
    /// Builds a user caller from a resolved principal.
    ///
    /// Returns `None` if the principal carries no valid identifier claim.
    #[must_use]
    pub fn from_principal(principal: &Principal) -> Option<Self> {
        let id = UserIdentifier::new(principal.identifier()?).ok()?;
        let roles = principal
            .all(claim_types::ROLE)
            .map(str::to_string)
            .collect();
        Some(Self::User { id, roles })
    }

    /// Returns true if the caller holds `role`.
    ///
    /// Internal callers hold every role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        match self {
            Self::Internal => true,
            Self::Anonymous => false,
            Self::User { roles, .. } => roles.contains(role),
        }
    }
}

/// Context for one unit of work.
///
/// `S` is the session type produced for this request; it ties the
/// request-local populator to the same session shape as the process-wide
/// registry.
pub struct RequestContext<S = Session> {
    request_id: RequestId,
    caller: Caller,
    scheme: Option<AuthScheme>,
    local_populator: Option<Arc<dyn SessionPopulator<S>>>,
    cancellation: CancellationToken,
}

impl<S> RequestContext<S> {
    /// Creates a context for the given caller with a fresh request id.
    #[must_use]
    pub fn new(caller: Caller) -> Self {
        Self {
            request_id: RequestId::new(),
            caller,
            scheme: None,
            local_populator: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Creates a context for an in-process caller.
    #[must_use]
    pub fn internal() -> Self {
        Self::new(Caller::Internal)
    }

    /// Sets the active auth scheme.
    #[must_use]
    pub fn with_scheme(mut self, scheme: AuthScheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    /// Registers a request-local populator, which takes precedence over the
    /// process-wide registry.
    #[must_use]
    pub fn with_populator(mut self, populator: Arc<dyn SessionPopulator<S>>) -> Self {
        self.local_populator = Some(populator);
        self
    }

    /// Uses the given cancellation token instead of a fresh one.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    #[must_use]
    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    #[must_use]
    pub fn scheme(&self) -> Option<&AuthScheme> {
        self.scheme.as_ref()
    }

    #[must_use]
    pub fn local_populator(&self) -> Option<&Arc<dyn SessionPopulator<S>>> {
        self.local_populator.as_ref()
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fails with `Cancelled` if the request has been cancelled.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Cancelled` once the token has fired.
    pub fn ensure_active(&self) -> Result<(), Report<IdentityError>> {
        if self.is_cancelled() {
            return Err(IdentityError::Cancelled.into());
        }
        Ok(())
    }

    /// Asserts the caller holds `role`; internal callers always pass.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Forbidden` if the caller lacks the role.
    pub fn assert_caller_has_role(&self, role: &str) -> Result<(), Report<IdentityError>> {
        if self.caller.has_role(role) {
            return Ok(());
        }
        Err(IdentityError::Forbidden {
            required_role: role.to_string(),
        }
        .into())
    }

    /// Runs a store call, racing it against the request's cancellation.
    ///
    /// Store failures are wrapped as `IdentityError::Store` with the store's
    /// report as the cause.
    pub(crate) async fn run_store<T, F>(&self, operation: F) -> Result<T, Report<IdentityError>>
    where
        F: Future<Output = Result<T, Report<StoreError>>>,
    {
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(IdentityError::Cancelled.into()),
            result = operation => result.map_err(|report| report.context(IdentityError::Store)),
        }
    }
}

impl<S> Clone for RequestContext<S> {
    fn clone(&self) -> Self {
        Self {
            request_id: self.request_id,
            caller: self.caller.clone(),
            scheme: self.scheme.clone(),
            local_populator: self.local_populator.clone(),
            cancellation: self.cancellation.clone(),
        }
    }
}

impl<S> fmt::Debug for RequestContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("caller", &self.caller)
            .field("scheme", &self.scheme)
            .field("local_populator", &self.local_populator.is_some())
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::Claim;
    use crate::scheme::AuthMethod;

    fn user_caller(roles: &[&str]) -> Caller {
        Caller::User {
            id: UserIdentifier::new("1").expect("valid id"),
            roles: roles.iter().map(|r| (*r).to_string()).collect(),
        }
    }

    #[test]
    fn internal_caller_passes_every_gate() {
        let request: RequestContext = RequestContext::internal();
        assert!(request.assert_caller_has_role("Admin").is_ok());
    }

    #[test]
    fn user_caller_needs_role() {
        let request: RequestContext = RequestContext::new(user_caller(&["Editor"]));
        let err = request.assert_caller_has_role("Admin").unwrap_err();
        assert_eq!(
            err.current_context(),
            &IdentityError::Forbidden {
                required_role: "Admin".to_string()
            }
        );

        let admin: RequestContext = RequestContext::new(user_caller(&["Admin"]));
        assert!(admin.assert_caller_has_role("Admin").is_ok());
    }

    #[test]
    fn anonymous_caller_is_forbidden() {
        let request: RequestContext = RequestContext::new(Caller::Anonymous);
        assert!(request.assert_caller_has_role("Admin").is_err());
    }

    #[test]
    fn caller_from_principal_collects_roles() {
        let principal = Principal::new(
            vec![
                Claim::new(claim_types::SUBJECT, "1"),
                Claim::new(claim_types::ROLE, "Admin"),
                Claim::new(claim_types::ROLE, "Editor"),
            ],
            AuthMethod::Identifier,
        );
        assert_eq!(
            Caller::from_principal(&principal),
            Some(user_caller(&["Admin", "Editor"]))
        );

        let anonymous = Principal::new(Vec::new(), AuthMethod::Identifier);
        assert!(Caller::from_principal(&anonymous).is_none());
    }

    #[tokio::test]
    async fn run_store_wraps_store_errors() {
        let request: RequestContext = RequestContext::internal();
        let err = request
            .run_store(async {
                Err::<(), _>(Report::from(StoreError::Unavailable {
                    reason: "down".to_string(),
                }))
            })
            .await
            .unwrap_err();
        assert_eq!(err.current_context(), &IdentityError::Store);
    }

    #[tokio::test]
    async fn run_store_honours_cancellation() {
        let token = CancellationToken::new();
        let request: RequestContext = RequestContext::internal().with_cancellation(token.clone());
        token.cancel();

        let err = request
            .run_store(async { Ok::<_, Report<StoreError>>(1) })
            .await
            .unwrap_err();
        assert_eq!(err.current_context(), &IdentityError::Cancelled);
        assert!(request.ensure_active().is_err());
    }
}
