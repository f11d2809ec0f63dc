//! Hosting provider integration.
//!
//! The flows only talk to the provider through the traits in this module so
//! they can run against an in-process fake.

pub mod github;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{DispatchError, Result};
use crate::models::{HookConfig, ProviderRepository, ProviderUser, ProviderWebhook};

pub use github::{GitHubClient, GitHubClientFactory, GitHubOAuth};

/// Page size used when listing repositories.
pub const REPOS_PER_PAGE: usize = 100;

/// REST operations performed on behalf of one authenticated user.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// The user the access token belongs to.
    async fn authenticated_user(&self) -> Result<ProviderUser>;

    /// Every repository visible to the user, across all pages.
    async fn list_repos_for_user(&self, sort: &str) -> Result<Vec<ProviderRepository>>;

    /// Resolves `owner/name`. Unknown repositories and malformed identifiers
    /// yield `None`.
    async fn get_repo(&self, full_name: &str) -> Result<Option<ProviderRepository>>;

    /// Registers a webhook on the repository.
    async fn create_webhook(&self, full_name: &str, hook: &HookConfig) -> Result<ProviderWebhook>;

    /// Raw file contents at `git_ref`, or `None` if the file does not exist.
    async fn get_file_contents(
        &self,
        full_name: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>>;

    /// Names of the files directly under `path` at `git_ref`. A missing
    /// directory is empty.
    async fn list_directory(&self, full_name: &str, path: &str, git_ref: &str)
    -> Result<Vec<String>>;
}

/// Builds provider clients from stored access tokens.
pub trait ProviderClientFactory: Send + Sync {
    fn client_for_token(&self, access_token: &str) -> Result<Arc<dyn ProviderClient>>;
}

/// Token returned by a successful OAuth code exchange.
#[derive(Debug, Clone)]
pub struct OAuthToken {
    pub access_token: String,
    pub scope: Option<String>,
}

/// The provider's OAuth web flow.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// URL the browser is sent to in order to grant access.
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> String;

    /// Trades the callback `code` for an access token.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<OAuthToken>;
}

/// Checks that `full_name` has the `owner/name` shape.
pub fn is_repository_full_name(full_name: &str) -> bool {
    let valid_part = |part: &str| {
        !part.is_empty()
            && part != "."
            && part != ".."
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };

    match full_name.split_once('/') {
        Some((owner, name)) => valid_part(owner) && valid_part(name),
        None => false,
    }
}

/// Creates the HTTP client shared by provider and builds requests.
pub fn create_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .user_agent(concat!("prdispatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| DispatchError::Configuration(format!("Failed to create HTTP client: {}", e)))
}
