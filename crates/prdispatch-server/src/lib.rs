//! prdispatch server library.
//!
//! Exposes the router and its components for the binary and the
//! integration tests.

pub mod middleware;
pub mod routes;
pub mod state;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_mw,
    routing::{get, post},
};
use prdispatch_core::crypto::MAX_WEBHOOK_SIZE;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

pub use middleware::{AuthenticatedUser, require_login};
pub use state::{AppState, Integration, IntegrationConfig, ServerConfig};

// Re-export prdispatch_core for convenience
pub use prdispatch_core;

// Test utilities are available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

/// Health and version endpoints, nested under `/api`.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/version", get(routes::health::version))
}

/// Routes of the GitHub-to-builds integration.
pub fn integration_router(state: AppState) -> Router<AppState> {
    let login_required = Router::new()
        .route(
            "/configure",
            get(routes::configure::list_repositories).post(routes::configure::configure),
        )
        .route_layer(axum_mw::from_fn_with_state(state, require_login));

    let webhook = Router::new()
        .route("/webhook/{record_id}", post(routes::webhook::handle_webhook))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_WEBHOOK_SIZE));

    Router::new()
        .route("/github/login", get(routes::github_oauth::login))
        .route("/github/callback", get(routes::github_oauth::callback))
        .merge(login_required)
        .merge(webhook)
}

/// Builds the application router.
///
/// Integration routes are only mounted when the integration is enabled.
pub fn build_router(state: AppState) -> Router {
    let mut app = Router::new().nest("/api", api_router());

    if state.integration.is_some() {
        app = app.merge(integration_router(state.clone()));
    } else {
        tracing::warn!("GitHub integration disabled; only /api routes are served");
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}
