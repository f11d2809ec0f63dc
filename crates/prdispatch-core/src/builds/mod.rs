//! Build submission for pull-request events.
//!
//! The dispatcher hands the base repository and the PR head (both as they
//! appear in the provider payload) to a [`BuildSubmitter`]. The production
//! submitter is [`BuildsClient`], which turns the head's build manifests
//! into jobs on the builds service.

pub mod client;
pub mod manifest;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{DispatchError, Result};
use crate::models::WebhookRecord;

pub use client::{BuildsClient, BuildsConfig};
pub use manifest::{JobRequest, Manifest};

/// Status and plain-text body returned to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionResponse {
    pub status: u16,
    pub body: String,
}

impl SubmissionResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// Forwards a qualifying pull-request event downstream.
#[async_trait]
pub trait BuildSubmitter: Send + Sync {
    /// Submits builds for `head` against base repository `repo`.
    ///
    /// Called at most once per inbound event.
    async fn submit(
        &self,
        record: &WebhookRecord,
        repo: &serde_json::Value,
        head: &serde_json::Value,
    ) -> Result<SubmissionResponse>;
}

/// Repository fields read from a pull-request payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PayloadRepository {
    pub name: String,
    pub full_name: String,
    pub clone_url: String,
}

impl PayloadRepository {
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        Self::deserialize(value)
            .map_err(|e| DispatchError::InvalidPayload(format!("repository: {}", e)))
    }
}

/// PR head fields read from a pull-request payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PayloadHead {
    pub sha: String,
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    /// Null when the head fork has been deleted.
    #[serde(default)]
    pub repo: Option<PayloadRepository>,
}

impl PayloadHead {
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        Self::deserialize(value).map_err(|e| DispatchError::InvalidPayload(format!("head: {}", e)))
    }

    /// The head repository, which may differ from the base for forks.
    pub fn repository(&self) -> Result<&PayloadRepository> {
        self.repo.as_ref().ok_or(DispatchError::MissingField("head.repo"))
    }

    /// Human-readable name of the head, e.g. `octocat:feature`.
    pub fn display_name(&self) -> &str {
        self.label
            .as_deref()
            .or(self.git_ref.as_deref())
            .unwrap_or(&self.sha)
    }

    pub fn short_sha(&self) -> &str {
        self.sha.get(..7).unwrap_or(&self.sha)
    }
}
