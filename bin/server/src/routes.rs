//! HTTP routes over the identity core.
//!
//! Lookups are limited to the user themself or an admin. Responses never
//! carry provider access or refresh tokens.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use keyward_core::UserIdentifier;
use keyward_identity::{
    AssignRoles, AuthMethod, Caller, Claim, IdentityError, Principal, ProviderTokens,
    RequestContext, RoleAssignmentResult, Session, UnAssignRoles,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::state::{AppState, Request};

/// Principal as returned over HTTP, without provider secrets.
#[derive(Debug, Serialize)]
pub struct PrincipalView {
    pub claims: Vec<Claim>,
    pub auth_method: AuthMethod,
}

impl From<&Principal> for PrincipalView {
    fn from(principal: &Principal) -> Self {
        Self {
            claims: principal
                .claims()
                .iter()
                .filter(|claim| !claim.is_provider_secret())
                .cloned()
                .collect(),
            auth_method: principal.auth_method(),
        }
    }
}

/// Linked provider identity, without tokens.
#[derive(Debug, Serialize)]
pub struct ProviderView {
    pub provider: String,
    pub user_id: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&ProviderTokens> for ProviderView {
    fn from(tokens: &ProviderTokens) -> Self {
        Self {
            provider: tokens.provider.clone(),
            user_id: tokens.user_id.clone(),
            expires_at: tokens.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub user_auth_id: Option<UserIdentifier>,
    pub user_name: Option<String>,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub time_zone: Option<String>,
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
    pub auth_provider: Option<String>,
    pub providers: Vec<ProviderView>,
    pub extensions: BTreeMap<String, String>,
    pub is_authenticated: bool,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            user_auth_id: session.user_auth_id().cloned(),
            user_name: session.user_name().map(str::to_string),
            display_name: session.display_name().map(str::to_string),
            first_name: session.first_name().map(str::to_string),
            last_name: session.last_name().map(str::to_string),
            email: session.email().map(str::to_string),
            time_zone: session.time_zone().map(str::to_string),
            roles: session.roles().clone(),
            permissions: session.permissions().clone(),
            auth_provider: session.auth_provider().map(str::to_string),
            providers: session
                .provider_tokens()
                .iter()
                .map(ProviderView::from)
                .collect(),
            extensions: session.extensions().clone(),
            is_authenticated: session.is_authenticated(),
        }
    }
}

/// Response for session resolution; `session` is null when no populator applies.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub principal: PrincipalView,
    pub session: Option<SessionView>,
}

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/principal/{user_id}", get(principal))
        .route("/auth/session/{user_id}", get(session))
        .route("/admin/roles/unassign", post(unassign_roles))
        .route("/admin/roles/assign", post(assign_roles))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn parse_user_id(raw: String) -> Result<UserIdentifier, ApiError> {
    UserIdentifier::new(raw).map_err(|e| {
        IdentityError::InvalidArgument {
            reason: e.to_string(),
        }
        .into()
    })
}

/// Lets a user look themself up; anyone else needs the admin role.
fn authorize_lookup(
    state: &AppState,
    request: &RequestContext,
    user_id: &UserIdentifier,
) -> Result<(), ApiError> {
    if matches!(request.caller(), Caller::User { id, .. } if id == user_id) {
        return Ok(());
    }
    request.assert_caller_has_role(state.admin.admin_role())?;
    Ok(())
}

async fn principal(
    State(state): State<Arc<AppState>>,
    Request(request): Request,
    Path(user_id): Path<String>,
) -> Result<Json<PrincipalView>, ApiError> {
    let user_id = parse_user_id(user_id)?;
    authorize_lookup(&state, &request, &user_id)?;
    let principal = state.resolver.resolve_principal(&request, &user_id).await?;
    Ok(Json(PrincipalView::from(&principal)))
}

async fn session(
    State(state): State<Arc<AppState>>,
    Request(request): Request,
    Path(user_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let user_id = parse_user_id(user_id)?;
    authorize_lookup(&state, &request, &user_id)?;
    let (principal, session) = state.resolver.resolve_session(&request, &user_id).await?;
    Ok(Json(SessionResponse {
        principal: PrincipalView::from(&principal),
        session: session.as_ref().map(SessionView::from),
    }))
}

async fn unassign_roles(
    State(state): State<Arc<AppState>>,
    Request(request): Request,
    Json(body): Json<UnAssignRoles>,
) -> Result<Json<RoleAssignmentResult>, ApiError> {
    let result = state.admin.unassign_roles(&request, &body).await?;
    Ok(Json(result))
}

async fn assign_roles(
    State(state): State<Arc<AppState>>,
    Request(request): Request,
    Json(body): Json<AssignRoles>,
) -> Result<Json<RoleAssignmentResult>, ApiError> {
    let result = state.admin.assign_roles(&request, &body).await?;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{self, StatusCode},
    };
    use keyward_identity::{Account, AuthScheme, IdentityConfig, InMemoryAccountStore};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const ACCESS: &str = "gh-access-7f3a";
    const REFRESH: &str = "gh-refresh-91bc";

    async fn app(config: IdentityConfig) -> Router {
        let alice = UserIdentifier::new("1").unwrap();
        let store = InMemoryAccountStore::with_accounts([
            Account::new(alice.clone(), "alice")
                .with_roles(["Admin", "Editor"])
                .with_permissions(["Publish"]),
            Account::new(UserIdentifier::new("2").unwrap(), "bob").with_roles(["Editor"]),
            Account::new(UserIdentifier::new("3").unwrap(), "carol"),
        ])
        .unwrap();
        store
            .set_provider_tokens(
                &alice,
                vec![
                    ProviderTokens::new("github", "gh-1")
                        .with_access_token(ACCESS)
                        .with_refresh_token(REFRESH),
                ],
            )
            .await
            .unwrap();
        router(Arc::new(AppState::new(&config, Arc::new(store))))
    }

    async fn send_raw(app: Router, request: http::Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn send(app: Router, request: http::Request<Body>) -> (StatusCode, Value) {
        let (status, raw) = send_raw(app, request).await;
        (status, serde_json::from_str(&raw).unwrap_or(Value::Null))
    }

    fn get(uri: &str) -> http::request::Builder {
        http::Request::builder().method(http::Method::GET).uri(uri)
    }

    fn get_as(uri: &str, caller: &str) -> http::request::Builder {
        get(uri).header("x-user-id", caller)
    }

    fn post_json(uri: &str, caller: &str, body: &Value) -> http::Request<Body> {
        http::Request::builder()
            .method(http::Method::POST)
            .uri(uri)
            .header(http::header::CONTENT_TYPE, "application/json")
            .header("x-user-id", caller)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn assert_no_tokens(raw: &str) {
        assert!(!raw.contains(ACCESS), "access token leaked: {raw}");
        assert!(!raw.contains(REFRESH), "refresh token leaked: {raw}");
    }

    #[tokio::test]
    async fn principal_lookup() {
        let (status, body) = send(
            app(IdentityConfig::default()).await,
            get_as("/auth/principal/1", "1").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["claims"][0], json!({"type": "sub", "value": "1"}));

        let (status, body) = send(
            app(IdentityConfig::default()).await,
            get_as("/auth/principal/404", "1").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Account not found");
    }

    #[tokio::test]
    async fn anonymous_lookups_are_forbidden() {
        for uri in ["/auth/principal/1", "/auth/session/1"] {
            let (status, raw) = send_raw(
                app(IdentityConfig::default()).await,
                get(uri)
                    .header("x-auth-scheme", "oauth:github")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
            assert_no_tokens(&raw);
        }
    }

    #[tokio::test]
    async fn users_cannot_look_up_others() {
        let (status, raw) = send_raw(
            app(IdentityConfig::default()).await,
            get_as("/auth/principal/1", "2").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_no_tokens(&raw);

        let (status, body) = send(
            app(IdentityConfig::default()).await,
            get_as("/auth/principal/2", "2").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["claims"][0], json!({"type": "sub", "value": "2"}));
    }

    #[tokio::test]
    async fn principal_response_omits_provider_tokens() {
        let (status, raw) = send_raw(
            app(IdentityConfig::default()).await,
            get_as("/auth/principal/1", "1").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_no_tokens(&raw);

        let body: Value = serde_json::from_str(&raw).unwrap();
        assert!(
            body["claims"]
                .as_array()
                .unwrap()
                .contains(&json!({"type": "provider:github:sub", "value": "gh-1"}))
        );
    }

    #[tokio::test]
    async fn session_response_omits_provider_tokens() {
        let config = IdentityConfig::builder()
            .add_oauth_provider("github")
            .build();
        let (status, raw) = send_raw(
            app(config).await,
            get_as("/auth/session/1", "1")
                .header("x-auth-scheme", "oauth:github")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_no_tokens(&raw);

        let body: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(body["session"]["auth_provider"], "github");
        assert_eq!(
            body["session"]["providers"][0],
            json!({"provider": "github", "user_id": "gh-1", "expires_at": null})
        );
    }

    #[tokio::test]
    async fn session_follows_scheme_header() {
        let config = IdentityConfig::default();

        let (status, body) = send(
            app(config.clone()).await,
            get_as("/auth/session/1", "1").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["session"].is_null());

        let (status, body) = send(
            app(config).await,
            get_as("/auth/session/1", "1")
                .header("x-auth-scheme", "jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["user_name"], "alice");
        assert_eq!(body["session"]["auth_provider"], "jwt");
    }

    #[tokio::test]
    async fn default_scheme_creates_session() {
        let config = IdentityConfig::builder()
            .default_scheme(AuthScheme::Credentials)
            .build();
        let (status, body) = send(
            app(config).await,
            get_as("/auth/session/2", "1").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["user_name"], "bob");
        assert_eq!(body["session"]["is_authenticated"], true);
    }

    #[tokio::test]
    async fn invalid_scheme_header_is_bad_request() {
        let (status, _) = send(
            app(IdentityConfig::default()).await,
            get_as("/auth/session/1", "1")
                .header("x-auth-scheme", "saml")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_can_unassign_roles() {
        let (status, body) = send(
            app(IdentityConfig::default()).await,
            post_json(
                "/admin/roles/unassign",
                "1",
                &json!({"user_name": "alice", "roles": ["Editor"]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["all_roles"], json!(["Admin"]));
        assert_eq!(body["all_permissions"], json!(["Publish"]));
    }

    #[tokio::test]
    async fn non_admin_cannot_assign_roles() {
        let (status, body) = send(
            app(IdentityConfig::default()).await,
            post_json(
                "/admin/roles/assign",
                "2",
                &json!({"user_name": "bob", "roles": ["Admin"]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Access denied");
    }

    #[tokio::test]
    async fn unknown_caller_is_unauthorized() {
        let (status, _) = send(
            app(IdentityConfig::default()).await,
            post_json(
                "/admin/roles/unassign",
                "99",
                &json!({"user_name": "alice", "roles": ["Editor"]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn empty_user_name_is_bad_request() {
        let (status, _) = send(
            app(IdentityConfig::default()).await,
            post_json("/admin/roles/unassign", "1", &json!({"user_name": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
