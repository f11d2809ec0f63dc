//! Repository configuration endpoints.

use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Redirect, Response},
};
use prdispatch_core::configure::{configure_repository, list_configurable_repositories};
use serde::Deserialize;

use super::error_response;
use crate::middleware::AuthenticatedUser;
use crate::state::AppState;

/// Body of `POST /configure`, as a form or JSON.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigureRequest {
    #[serde(default)]
    pub repo: Option<String>,
}

impl ConfigureRequest {
    /// Parses the body according to its content type. An unreadable body
    /// yields an empty request.
    fn from_body(headers: &HeaderMap, body: &[u8]) -> Self {
        let is_json = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        if is_json {
            return serde_json::from_slice(body).unwrap_or_default();
        }

        Self {
            repo: url::form_urlencoded::parse(body)
                .find(|(key, _)| key == "repo")
                .map(|(_, value)| value.into_owned()),
        }
    }
}

/// GET /configure - Lists repositories the user can opt in.
pub async fn list_repositories(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Response {
    match list_configurable_repositories(&state.db, auth.provider.as_ref(), &auth.user).await {
        Ok(repos) => Json(repos).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

/// POST /configure - Opts a repository in and registers its webhook.
pub async fn configure(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = ConfigureRequest::from_body(&headers, &body);

    match configure_repository(
        &state.db,
        auth.provider.as_ref(),
        &auth.user,
        request.repo.as_deref(),
        &state.config.base_url,
    )
    .await
    {
        Ok(_) => Redirect::to("/").into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}
