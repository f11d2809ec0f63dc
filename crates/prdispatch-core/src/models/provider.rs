//! Hosting provider API shapes.

use serde::{Deserialize, Serialize};

/// A repository as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRepository {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub fork: bool,
    pub clone_url: String,
    /// Caller's permissions; only present on authenticated listings.
    #[serde(default)]
    pub permissions: Option<RepositoryPermissions>,
}

impl ProviderRepository {
    /// Whether the authenticated user administers this repository.
    pub fn is_admin(&self) -> bool {
        self.permissions.as_ref().is_some_and(|p| p.admin)
    }
}

/// Permissions the authenticated user holds on a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryPermissions {
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub pull: bool,
}

/// Webhook registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookConfig {
    pub url: String,
    pub content_type: String,
    pub events: Vec<String>,
    pub active: bool,
}

impl HookConfig {
    /// An active JSON hook delivering only pull-request events.
    pub fn pull_requests(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_type: "json".to_string(),
            events: vec!["pull_request".to_string()],
            active: true,
        }
    }
}

/// Webhook as returned by the provider after creation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderWebhook {
    pub id: i64,
}

/// The user an access token belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderUser {
    pub id: i64,
    pub login: String,
}

/// Summary shown by the configuration listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub full_name: String,
    pub description: Option<String>,
    pub private: bool,
    /// A record already exists for this repository and user.
    pub configured: bool,
}

impl RepositorySummary {
    pub fn from_repository(repo: &ProviderRepository, configured: bool) -> Self {
        Self {
            full_name: repo.full_name.clone(),
            description: repo.description.clone(),
            private: repo.private,
            configured,
        }
    }
}
