//! Login-required middleware.
//!
//! Resolves the session token from the `prdispatch_session` cookie or an
//! `Authorization: Bearer` header, then attaches the signed-in user and a
//! provider client acting as them to the request.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use prdispatch_core::{
    DispatchError,
    auth::provider_for_user,
    db::{
        sessions::{SESSION_TTL_DAYS, SessionRepo},
        users::UserRepo,
    },
    models::User,
    providers::ProviderClient,
};

use crate::state::AppState;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "prdispatch_session";

/// Where unauthenticated users are sent.
pub const LOGIN_PATH: &str = "/github/login";

/// The signed-in user, inserted as a request extension.
#[derive(Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub provider: Arc<dyn ProviderClient>,
}

/// Builds the `Set-Cookie` value for a new session.
pub fn session_cookie(token: &str, secure: bool) -> String {
    let max_age = SESSION_TTL_DAYS * 24 * 60 * 60;
    let mut cookie = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, token, max_age
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Extracts the session token, preferring the cookie over a bearer token.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value);

    from_cookie
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        })
        .filter(|token| !token.is_empty())
}

/// Requires a valid session; otherwise redirects to the login flow.
pub async fn require_login(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let integration = match state.require_integration() {
        Ok(integration) => integration.clone(),
        Err(rejection) => return rejection.into_response(),
    };

    let Some(token) = session_token(req.headers()).map(str::to_string) else {
        return Redirect::to(LOGIN_PATH).into_response();
    };

    let user_id = match SessionRepo::get_user_id(&state.db, &token).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => return Redirect::to(LOGIN_PATH).into_response(),
        Err(e) => return internal_error("resolve session", e),
    };

    let user = match UserRepo::get_by_id(&state.db, user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return Redirect::to(LOGIN_PATH).into_response(),
        Err(e) => return internal_error("load user", e),
    };

    let provider = match provider_for_user(
        &state.db,
        &integration.encryption_key,
        integration.providers.as_ref(),
        user.id,
    )
    .await
    {
        Ok(provider) => provider,
        Err(DispatchError::NotAuthorized(_)) => {
            return Redirect::to(LOGIN_PATH).into_response();
        }
        Err(e) => return internal_error("load provider authorization", e),
    };

    req.extensions_mut()
        .insert(AuthenticatedUser { user, provider });

    next.run(req).await
}

fn internal_error(action: &str, e: DispatchError) -> Response {
    tracing::error!("Failed to {}: {}", action, e);
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}
