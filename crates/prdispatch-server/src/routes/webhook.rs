//! Inbound pull-request webhook endpoint.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use prdispatch_core::dispatch::dispatch_webhook;

use super::error_response;
use crate::state::AppState;

/// POST /webhook/{record_id}
///
/// Answers with the dispatch outcome as plain text. Forwarded events carry
/// the builds service's status and body.
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(record_id): Path<String>,
    body: Bytes,
) -> Response {
    let integration = match state.require_integration() {
        Ok(integration) => integration,
        Err(rejection) => return rejection.into_response(),
    };

    match dispatch_webhook(&state.db, integration.submitter.as_ref(), &record_id, &body).await {
        Ok(outcome) => {
            let status = StatusCode::from_u16(outcome.status()).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, outcome.body()).into_response()
        }
        Err(e) => error_response(&e).into_response(),
    }
}
