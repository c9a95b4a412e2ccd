//! Shared application state and the request-context extractor.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use keyward_core::UserIdentifier;
use keyward_identity::{
    AccountStore, AuthScheme, Caller, DefaultSessionFactory, IdentityConfig, IdentityError,
    IdentityResolver, PopulatorRegistry, RequestContext, RoleAdmin,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;

/// Header naming the calling user.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header selecting the active auth scheme.
pub const AUTH_SCHEME_HEADER: &str = "x-auth-scheme";

/// State shared by all handlers.
pub struct AppState {
    pub resolver: IdentityResolver,
    pub admin: RoleAdmin,
    /// Parent of every request's cancellation token; cancelled on shutdown.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wires the resolver and admin endpoint over `store`.
    #[must_use]
    pub fn new(config: &IdentityConfig, store: Arc<dyn AccountStore>) -> Self {
        let populators = PopulatorRegistry::standard(config, Arc::clone(&store));
        Self {
            resolver: IdentityResolver::new(
                Arc::clone(&store),
                populators,
                Arc::new(DefaultSessionFactory),
            ),
            admin: RoleAdmin::from_config(store, config),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Extracts the request context from request headers.
///
/// A present `x-user-id` is resolved through the identity resolver and its
/// principal's roles become the caller's roles. No header means anonymous.
pub struct Request(pub RequestContext);

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    parts
        .headers
        .get(name)
        .map(|value| {
            value.to_str().map_err(|_| {
                ApiError::from(IdentityError::InvalidArgument {
                    reason: format!("header '{name}' is not valid text"),
                })
            })
        })
        .transpose()
}

impl<S> FromRequestParts<S> for Request
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let token = app_state.shutdown.child_token();

        let scheme = header(parts, AUTH_SCHEME_HEADER)?
            .map(|raw| {
                raw.parse::<AuthScheme>()
                    .map_err(|e| IdentityError::InvalidArgument {
                        reason: e.to_string(),
                    })
            })
            .transpose()?;

        let caller = match header(parts, USER_ID_HEADER)? {
            None => Caller::Anonymous,
            Some(raw) => {
                let user_id =
                    UserIdentifier::new(raw).map_err(|e| IdentityError::InvalidArgument {
                        reason: e.to_string(),
                    })?;
                let lookup: RequestContext =
                    RequestContext::internal().with_cancellation(token.clone());
                let principal = app_state
                    .resolver
                    .resolve_principal(&lookup, &user_id)
                    .await
                    .map_err(|report| match report.current_context() {
                        IdentityError::NotFound { .. } => {
                            ApiError::from(IdentityError::Unauthorized {
                                user_id: user_id.clone(),
                            })
                        }
                        _ => ApiError::from(report),
                    })?;
                Caller::from_principal(&principal).unwrap_or(Caller::Anonymous)
            }
        };

        let mut context = RequestContext::new(caller).with_cancellation(token);
        if let Some(scheme) = scheme {
            context = context.with_scheme(scheme);
        }
        Ok(Request(context))
    }
}
