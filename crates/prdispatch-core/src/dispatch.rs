//! Inbound pull-request event validation and dispatch.
//!
//! The record id in the webhook URL is the only credential: any caller that
//! knows it can trigger a dispatch.

use serde_json::Value;

use crate::builds::{BuildSubmitter, PayloadHead, PayloadRepository, SubmissionResponse};
use crate::db::DbPool;
use crate::db::records::WebhookRecordRepo;
use crate::error::{DispatchError, Result};
use crate::models::WebhookRecordId;

/// Acknowledgment for payloads that are not pull-request events.
pub const NO_COMMITS: &str = "Got request, but it has no commits";

/// Acknowledgment for pull-request actions that bring no new commits.
pub const NO_NEW_COMMITS: &str = "Got update, but there are no new commits";

/// Actions that push new commits to a pull request.
pub const FORWARDED_ACTIONS: [&str; 2] = ["opened", "synchronize"];

/// Result of handling one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No record has this id.
    UnknownRecord(WebhookRecordId),
    /// Payload lacks a pull request, an action, or a usable head and base.
    NoCommits,
    /// Pull-request action that does not forward.
    NoNewCommits,
    /// Submitter response, passed through unchanged.
    Forwarded(SubmissionResponse),
}

impl DispatchOutcome {
    pub fn status(&self) -> u16 {
        match self {
            DispatchOutcome::UnknownRecord(_) => 404,
            DispatchOutcome::NoCommits | DispatchOutcome::NoNewCommits => 200,
            DispatchOutcome::Forwarded(response) => response.status,
        }
    }

    pub fn body(&self) -> String {
        match self {
            DispatchOutcome::UnknownRecord(id) => format!("Unknown hook {}", id),
            DispatchOutcome::NoCommits => NO_COMMITS.to_string(),
            DispatchOutcome::NoNewCommits => NO_NEW_COMMITS.to_string(),
            DispatchOutcome::Forwarded(response) => response.body.clone(),
        }
    }
}

/// The parts of a qualifying event handed to the submitter.
struct PullRequestEvent<'a> {
    repo: &'a Value,
    head: &'a Value,
}

/// Handles a webhook POST for `record_id` with the raw request `body`.
///
/// Fails with [`DispatchError::InvalidRecordId`] if `record_id` is not a
/// record id at all. Submitter errors propagate unchanged.
pub async fn dispatch_webhook(
    db: &DbPool,
    submitter: &dyn BuildSubmitter,
    record_id: &str,
    body: &[u8],
) -> Result<DispatchOutcome> {
    let id = WebhookRecordId::from_string(record_id)
        .map_err(|_| DispatchError::InvalidRecordId(record_id.to_string()))?;

    let Some(record) = WebhookRecordRepo::get_by_id(db, &id).await? else {
        tracing::warn!("Webhook for unknown record {}", id);
        return Ok(DispatchOutcome::UnknownRecord(id));
    };

    let payload: Value = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!("Unparsable webhook body for record {}: {}", id, e);
            return Ok(DispatchOutcome::NoCommits);
        }
    };

    let (Some(pull_request), Some(action)) = (
        payload.get("pull_request").filter(|pr| pr.is_object()),
        payload.get("action").and_then(Value::as_str),
    ) else {
        tracing::debug!("Webhook for record {} is not a pull-request event", id);
        return Ok(DispatchOutcome::NoCommits);
    };

    if !FORWARDED_ACTIONS.contains(&action) {
        tracing::debug!(
            "Ignoring pull-request action '{}' for {} (record {})",
            action,
            record.repository,
            id
        );
        return Ok(DispatchOutcome::NoNewCommits);
    }

    let event = match extract_event(pull_request) {
        Ok(event) => event,
        Err(reason) => {
            tracing::debug!("Incomplete pull request for record {}: {}", id, reason);
            return Ok(DispatchOutcome::NoCommits);
        }
    };

    tracing::info!(
        "Forwarding '{}' pull-request event for {} (record {})",
        action,
        record.repository,
        id
    );

    let response = submitter.submit(&record, event.repo, event.head).await?;
    Ok(DispatchOutcome::Forwarded(response))
}

/// Picks the base repository and head out of `pull_request`, checking that
/// both carry every field the submitter reads.
fn extract_event(pull_request: &Value) -> Result<PullRequestEvent<'_>> {
    let present = |v: &&Value| !v.is_null();

    let head = pull_request
        .get("head")
        .filter(present)
        .ok_or(DispatchError::MissingField("pull_request.head"))?;
    let repo = pull_request
        .get("base")
        .and_then(|base| base.get("repo"))
        .filter(present)
        .ok_or(DispatchError::MissingField("pull_request.base.repo"))?;

    PayloadRepository::from_value(repo)?;
    PayloadHead::from_value(head)?.repository()?;

    Ok(PullRequestEvent { repo, head })
}
