//! In-process fakes for the provider and builds collaborators.
//!
//! Compiled for unit tests and behind the `test-utils` feature for the
//! server's integration tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::builds::{BuildSubmitter, SubmissionResponse};
use crate::crypto::EncryptionKey;
use crate::error::{DispatchError, Result};
use crate::models::{
    HookConfig, ProviderRepository, ProviderUser, ProviderWebhook, RepositoryPermissions,
    WebhookRecord, WebhookRecordId,
};
use crate::providers::{OAuthProvider, OAuthToken, ProviderClient, ProviderClientFactory};

/// Provider account id of every [`FakeProvider`] user.
pub const FAKE_PROVIDER_USER_ID: i64 = 1;

/// Fixed key for encrypting tokens in tests.
pub fn test_encryption_key() -> EncryptionKey {
    EncryptionKey::from_bytes([7u8; 32])
}

/// Repository fixture as the provider would list it.
pub fn repository(full_name: &str, admin: bool, fork: bool) -> ProviderRepository {
    let name = full_name.rsplit('/').next().unwrap_or(full_name);
    ProviderRepository {
        id: 1,
        name: name.to_string(),
        full_name: full_name.to_string(),
        description: Some(format!("{} description", name)),
        private: false,
        fork,
        clone_url: format!("https://github.com/{}.git", full_name),
        permissions: Some(RepositoryPermissions {
            admin,
            push: admin,
            pull: true,
        }),
    }
}

/// A webhook registration observed by [`FakeProvider`].
#[derive(Debug, Clone)]
pub struct CreatedHook {
    pub full_name: String,
    pub config: HookConfig,
}

/// Provider serving fixed repositories and files.
pub struct FakeProvider {
    login: String,
    repos: Vec<ProviderRepository>,
    /// Keyed by `(full_name, path)`.
    files: BTreeMap<(String, String), String>,
    fail_webhooks: bool,
    next_hook_id: AtomicI64,
    hooks: Mutex<Vec<CreatedHook>>,
}

impl FakeProvider {
    pub fn new(login: &str) -> Self {
        Self {
            login: login.to_string(),
            repos: Vec::new(),
            files: BTreeMap::new(),
            fail_webhooks: false,
            next_hook_id: AtomicI64::new(1000),
            hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_repo(mut self, repo: ProviderRepository) -> Self {
        self.repos.push(repo);
        self
    }

    pub fn with_file(mut self, full_name: &str, path: &str, contents: &str) -> Self {
        self.files
            .insert((full_name.to_string(), path.to_string()), contents.to_string());
        self
    }

    /// Makes every webhook registration fail.
    pub fn failing_webhooks(mut self) -> Self {
        self.fail_webhooks = true;
        self
    }

    pub fn created_hooks(&self) -> Vec<CreatedHook> {
        self.hooks.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    async fn authenticated_user(&self) -> Result<ProviderUser> {
        Ok(ProviderUser {
            id: FAKE_PROVIDER_USER_ID,
            login: self.login.clone(),
        })
    }

    async fn list_repos_for_user(&self, _sort: &str) -> Result<Vec<ProviderRepository>> {
        Ok(self.repos.clone())
    }

    async fn get_repo(&self, full_name: &str) -> Result<Option<ProviderRepository>> {
        Ok(self.repos.iter().find(|r| r.full_name == full_name).cloned())
    }

    async fn create_webhook(&self, full_name: &str, hook: &HookConfig) -> Result<ProviderWebhook> {
        if self.fail_webhooks {
            return Err(DispatchError::Provider(
                "GitHub API error 422 Unprocessable Entity: hook rejected".to_string(),
            ));
        }

        if let Ok(mut hooks) = self.hooks.lock() {
            hooks.push(CreatedHook {
                full_name: full_name.to_string(),
                config: hook.clone(),
            });
        }

        Ok(ProviderWebhook {
            id: self.next_hook_id.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn get_file_contents(
        &self,
        full_name: &str,
        path: &str,
        _git_ref: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .files
            .get(&(full_name.to_string(), path.to_string()))
            .cloned())
    }

    async fn list_directory(
        &self,
        full_name: &str,
        path: &str,
        _git_ref: &str,
    ) -> Result<Vec<String>> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        Ok(self
            .files
            .keys()
            .filter(|(repo, _)| repo == full_name)
            .filter_map(|(_, file)| file.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }
}

/// Hands out one shared [`FakeProvider`] and remembers the tokens it saw.
pub struct FakeProviderFactory {
    provider: Arc<FakeProvider>,
    tokens: Mutex<Vec<String>>,
}

impl FakeProviderFactory {
    pub fn new(provider: Arc<FakeProvider>) -> Self {
        Self {
            provider,
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

impl ProviderClientFactory for FakeProviderFactory {
    fn client_for_token(&self, access_token: &str) -> Result<Arc<dyn ProviderClient>> {
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.push(access_token.to_string());
        }
        Ok(self.provider.clone())
    }
}

/// OAuth flow that accepts a single known code.
pub struct FakeOAuth {
    pub code: String,
    pub access_token: String,
}

impl FakeOAuth {
    pub const AUTHORIZE_URL: &'static str = "https://provider.test/login/oauth/authorize";

    pub fn new(code: &str, access_token: &str) -> Self {
        Self {
            code: code.to_string(),
            access_token: access_token.to_string(),
        }
    }
}

#[async_trait]
impl OAuthProvider for FakeOAuth {
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> String {
        format!(
            "{}?redirect_uri={}&state={}",
            Self::AUTHORIZE_URL,
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> Result<OAuthToken> {
        if code != self.code {
            return Err(DispatchError::OAuth("bad_verification_code".to_string()));
        }
        Ok(OAuthToken {
            access_token: self.access_token.clone(),
            scope: Some("repo,admin:repo_hook".to_string()),
        })
    }
}

/// One call observed by [`RecordingSubmitter`].
#[derive(Debug, Clone)]
pub struct SubmittedBuild {
    pub record_id: WebhookRecordId,
    pub repo: serde_json::Value,
    pub head: serde_json::Value,
}

/// Submitter that records its calls and answers with a fixed response.
pub struct RecordingSubmitter {
    response: SubmissionResponse,
    calls: Mutex<Vec<SubmittedBuild>>,
}

impl RecordingSubmitter {
    pub fn new() -> Self {
        Self::responding(SubmissionResponse::ok("Submitted 1 build(s): test"))
    }

    pub fn responding(response: SubmissionResponse) -> Self {
        Self {
            response,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<SubmittedBuild> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Default for RecordingSubmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BuildSubmitter for RecordingSubmitter {
    async fn submit(
        &self,
        record: &WebhookRecord,
        repo: &serde_json::Value,
        head: &serde_json::Value,
    ) -> Result<SubmissionResponse> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(SubmittedBuild {
                record_id: record.id,
                repo: repo.clone(),
                head: head.clone(),
            });
        }
        Ok(self.response.clone())
    }
}
