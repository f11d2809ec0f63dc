//! Webhook record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::{TaskId, UserId};

/// Provider webhook id stored until the provider confirms registration.
pub const UNREGISTERED_WEBHOOK_ID: i64 = -1;

/// Name of the task definition every record's task is created under.
pub const TASKDEF_NAME: &str = "github_pr_to_build";

/// Unique identifier for a webhook record.
///
/// Doubles as the path segment of the inbound webhook URL, so it must never
/// be derived from anything guessable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebhookRecordId(pub Ulid);

impl WebhookRecordId {
    /// Creates a new random record ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates a record ID from a string.
    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for WebhookRecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WebhookRecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Ulid> for WebhookRecordId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

/// A repository opted in to pull-request builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRecord {
    pub id: WebhookRecordId,
    pub user_id: UserId,
    pub task_id: TaskId,
    /// Repository full name, `owner/name`.
    pub repository: String,
    /// Id of the hook on the provider side, or [`UNREGISTERED_WEBHOOK_ID`].
    pub provider_webhook_id: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl WebhookRecord {
    /// Whether the provider confirmed the webhook registration.
    pub fn is_registered(&self) -> bool {
        self.provider_webhook_id != UNREGISTERED_WEBHOOK_ID
    }
}

/// Builds the inbound webhook URL for a record id.
pub fn webhook_url(base_url: &str, id: &WebhookRecordId) -> String {
    format!("{}/webhook/{}", base_url.trim_end_matches('/'), id)
}

/// Builds the task name for a repository.
pub fn task_name(repository: &str) -> String {
    format!("{}::{}", repository, TASKDEF_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_url_trims_trailing_slash() {
        let id = WebhookRecordId::from_string("01HQ9RHHSFA5HRGFH1A7X0Y1FJ").unwrap();
        assert_eq!(
            webhook_url("https://dispatch.example.com/", &id),
            "https://dispatch.example.com/webhook/01HQ9RHHSFA5HRGFH1A7X0Y1FJ"
        );
    }

    #[test]
    fn test_task_name_scopes_repository() {
        assert_eq!(task_name("octo/widgets"), "octo/widgets::github_pr_to_build");
    }

    #[test]
    fn test_invalid_record_id_is_rejected() {
        assert!(WebhookRecordId::from_string("not-a-ulid").is_err());
        assert!(WebhookRecordId::from_string("").is_err());
    }
}
