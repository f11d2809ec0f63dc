//! GitHub OAuth login endpoints.

use axum::{
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use prdispatch_core::db::{
    sessions::{OAuthStateRepo, SessionRepo},
    users::{ProviderAuthorizationRepo, UserRepo},
};
use serde::Deserialize;

use super::error_response;
use crate::middleware::session_cookie;
use crate::state::AppState;

/// Where a completed login lands.
pub const AFTER_LOGIN_PATH: &str = "/configure";

/// Query string GitHub appends to the callback URL.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set instead of `code` when the user denied access.
    pub error: Option<String>,
}

/// GET /github/login - Starts the OAuth flow.
pub async fn login(State(state): State<AppState>) -> Response {
    let integration = match state.require_integration() {
        Ok(integration) => integration,
        Err(rejection) => return rejection.into_response(),
    };

    let oauth_state = match OAuthStateRepo::create(&state.db).await {
        Ok(oauth_state) => oauth_state,
        Err(e) => return error_response(&e).into_response(),
    };

    let url = integration
        .oauth
        .authorize_url(&oauth_state.state, &state.config.oauth_callback_url());

    Redirect::to(&url).into_response()
}

/// GET /github/callback - Completes the OAuth flow and signs the user in.
pub async fn callback(State(state): State<AppState>, Query(query): Query<CallbackQuery>) -> Response {
    let integration = match state.require_integration() {
        Ok(integration) => integration,
        Err(rejection) => return rejection.into_response(),
    };

    if let Some(error) = query.error {
        tracing::info!("GitHub authorization declined: {}", error);
        return (
            StatusCode::BAD_REQUEST,
            format!("GitHub authorization failed: {}", error),
        )
            .into_response();
    }

    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return (StatusCode::BAD_REQUEST, "Missing code or state").into_response();
    };

    match OAuthStateRepo::consume(&state.db, &oauth_state).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!("Rejected OAuth callback with unknown or reused state");
            return (StatusCode::BAD_REQUEST, "Invalid or expired OAuth state").into_response();
        }
        Err(e) => return error_response(&e).into_response(),
    }

    let token = match integration
        .oauth
        .exchange_code(&code, &state.config.oauth_callback_url())
        .await
    {
        Ok(token) => token,
        Err(e) => return error_response(&e).into_response(),
    };

    let provider_user = match integration
        .providers
        .client_for_token(&token.access_token)
    {
        Ok(provider) => match provider.authenticated_user().await {
            Ok(provider_user) => provider_user,
            Err(e) => return error_response(&e).into_response(),
        },
        Err(e) => return error_response(&e).into_response(),
    };

    let user = match UserRepo::upsert_provider_user(&state.db, &provider_user).await {
        Ok(user) => user,
        Err(e) => return error_response(&e).into_response(),
    };

    if let Err(e) = ProviderAuthorizationRepo::store(
        &state.db,
        &integration.encryption_key,
        user.id,
        &token.access_token,
        token.scope.as_deref(),
    )
    .await
    {
        return error_response(&e).into_response();
    }

    let session = match SessionRepo::create(&state.db, user.id).await {
        Ok(session) => session,
        Err(e) => return error_response(&e).into_response(),
    };

    tracing::info!("User {} signed in with GitHub", user.username);

    let cookie = session_cookie(&session, !state.config.dev_mode);
    (
        [(header::SET_COOKIE, cookie)],
        Redirect::to(AFTER_LOGIN_PATH),
    )
        .into_response()
}
