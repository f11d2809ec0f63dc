//! HTTP route handlers.

pub mod configure;
pub mod github_oauth;
pub mod health;
pub mod webhook;

use axum::http::StatusCode;
use prdispatch_core::DispatchError;

/// Maps a core error to a plain-text response.
///
/// Caller mistakes are answered with their message; collaborator failures
/// with a short summary, the detail goes to the log.
pub fn error_response(err: &DispatchError) -> (StatusCode, String) {
    match err {
        e if e.is_rejection() => (StatusCode::BAD_REQUEST, e.to_string()),
        DispatchError::NotAuthorized(_) => (
            StatusCode::UNAUTHORIZED,
            "Sign in with GitHub again".to_string(),
        ),
        DispatchError::Provider(_) | DispatchError::OAuth(_) => {
            tracing::error!("GitHub request failed: {}", err);
            (StatusCode::BAD_GATEWAY, "GitHub request failed".to_string())
        }
        DispatchError::Builds(_) => {
            tracing::error!("Builds service request failed: {}", err);
            (
                StatusCode::BAD_GATEWAY,
                "Builds service request failed".to_string(),
            )
        }
        _ => {
            tracing::error!("Internal error: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}
