//! GitHub REST API client and OAuth web flow.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::{
    OAuthProvider, OAuthToken, ProviderClient, ProviderClientFactory, REPOS_PER_PAGE,
    create_http_client, is_repository_full_name,
};
use crate::error::{DispatchError, Result};
use crate::models::{HookConfig, ProviderRepository, ProviderUser, ProviderWebhook};

/// Default REST API base.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default web origin serving the OAuth endpoints.
pub const DEFAULT_OAUTH_URL: &str = "https://github.com";

/// Scopes needed to see private repositories and manage their hooks.
pub const OAUTH_SCOPES: &str = "repo admin:repo_hook";

const API_VERSION: &str = "2022-11-28";

/// GitHub API client acting as one user.
pub struct GitHubClient {
    client: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl GitHubClient {
    /// Creates a client for `access_token` against `api_base`.
    pub fn new(client: reqwest::Client, api_base: &str, access_token: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder, accept: &str) -> reqwest::RequestBuilder {
        request
            .header("Accept", accept)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.authorized(self.client.get(url), "application/vnd.github+json")
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request
            .send()
            .await
            .map_err(|e| DispatchError::Provider(format!("GitHub API request failed: {}", e)))
    }

    /// Sends a GET and returns `None` on 404.
    async fn get_optional(&self, request: reqwest::RequestBuilder) -> Result<Option<reqwest::Response>> {
        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(response).await.map(Some)
    }
}

#[async_trait]
impl ProviderClient for GitHubClient {
    async fn authenticated_user(&self) -> Result<ProviderUser> {
        let response = self.send(self.get(&self.url("/user"))).await?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| DispatchError::Provider(format!("Failed to parse user response: {}", e)))
    }

    async fn list_repos_for_user(&self, sort: &str) -> Result<Vec<ProviderRepository>> {
        let mut repos = Vec::new();
        let mut page = 1;

        loop {
            let url = format!(
                "{}?sort={}&per_page={}&page={}",
                self.url("/user/repos"),
                urlencoding::encode(sort),
                REPOS_PER_PAGE,
                page
            );

            let response = self.send(self.get(&url)).await?;
            let batch: Vec<ProviderRepository> = check_status(response)
                .await?
                .json()
                .await
                .map_err(|e| {
                    DispatchError::Provider(format!("Failed to parse repositories: {}", e))
                })?;

            let done = batch.len() < REPOS_PER_PAGE;
            repos.extend(batch);
            if done {
                break;
            }
            page += 1;
        }

        tracing::debug!("Listed {} repositories ({} page(s))", repos.len(), page);
        Ok(repos)
    }

    async fn get_repo(&self, full_name: &str) -> Result<Option<ProviderRepository>> {
        if !is_repository_full_name(full_name) {
            return Ok(None);
        }

        let url = self.url(&format!("/repos/{}", full_name));
        let Some(response) = self.get_optional(self.get(&url)).await? else {
            return Ok(None);
        };

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| DispatchError::Provider(format!("Failed to parse repository: {}", e)))
    }

    async fn create_webhook(&self, full_name: &str, hook: &HookConfig) -> Result<ProviderWebhook> {
        if !is_repository_full_name(full_name) {
            return Err(DispatchError::RepositoryNotFound(full_name.to_string()));
        }

        let body = serde_json::json!({
            "name": "web",
            "active": hook.active,
            "events": hook.events,
            "config": {
                "url": hook.url,
                "content_type": hook.content_type,
            },
        });

        let url = self.url(&format!("/repos/{}/hooks", full_name));
        let request = self
            .authorized(self.client.post(&url), "application/vnd.github+json")
            .json(&body);

        let response = self.send(request).await?;
        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| DispatchError::Provider(format!("Failed to parse webhook response: {}", e)))
    }

    async fn get_file_contents(
        &self,
        full_name: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>> {
        let url = contents_url(&self.api_base, full_name, path, git_ref);
        let request = self.authorized(self.client.get(&url), "application/vnd.github.raw+json");

        let Some(response) = self.get_optional(request).await? else {
            return Ok(None);
        };

        response
            .text()
            .await
            .map(Some)
            .map_err(|e| DispatchError::Provider(format!("Failed to read file contents: {}", e)))
    }

    async fn list_directory(
        &self,
        full_name: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct Entry {
            name: String,
            #[serde(rename = "type")]
            entry_type: String,
        }

        let url = contents_url(&self.api_base, full_name, path, git_ref);
        let Some(response) = self.get_optional(self.get(&url)).await? else {
            return Ok(Vec::new());
        };

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| DispatchError::Provider(format!("Failed to parse directory: {}", e)))?;

        // A file path answers with a single object rather than a listing.
        if !value.is_array() {
            return Ok(Vec::new());
        }

        let entries: Vec<Entry> = serde_json::from_value(value)?;
        Ok(entries
            .into_iter()
            .filter(|e| e.entry_type == "file")
            .map(|e| e.name)
            .collect())
    }
}

/// Creates [`GitHubClient`]s sharing one connection pool.
pub struct GitHubClientFactory {
    client: reqwest::Client,
    api_base: String,
}

impl GitHubClientFactory {
    pub fn new(api_base: &str) -> Result<Self> {
        Ok(Self {
            client: create_http_client()?,
            api_base: api_base.to_string(),
        })
    }
}

impl ProviderClientFactory for GitHubClientFactory {
    fn client_for_token(&self, access_token: &str) -> Result<Arc<dyn ProviderClient>> {
        Ok(Arc::new(GitHubClient::new(
            self.client.clone(),
            &self.api_base,
            access_token,
        )))
    }
}

/// GitHub OAuth app credentials and endpoints.
pub struct GitHubOAuth {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    oauth_base: String,
}

impl GitHubOAuth {
    pub fn new(client_id: &str, client_secret: &str) -> Result<Self> {
        Ok(Self {
            client: create_http_client()?,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            oauth_base: DEFAULT_OAUTH_URL.to_string(),
        })
    }

    /// Overrides the web origin (GitHub Enterprise).
    pub fn with_oauth_base(mut self, oauth_base: &str) -> Self {
        self.oauth_base = oauth_base.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl OAuthProvider for GitHubOAuth {
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> String {
        format!(
            "{}/login/oauth/authorize?client_id={}&redirect_uri={}&scope={}&state={}",
            self.oauth_base,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(OAUTH_SCOPES),
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<OAuthToken> {
        // GitHub reports exchange failures with a 200 and an `error` field.
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: Option<String>,
            scope: Option<String>,
            error: Option<String>,
            error_description: Option<String>,
        }

        let url = format!("{}/login/oauth/access_token", self.oauth_base);
        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| DispatchError::OAuth(format!("GitHub OAuth request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::OAuth(format!(
                "GitHub OAuth error {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::OAuth(format!("Failed to parse token response: {}", e)))?;

        match (token.access_token, token.error) {
            (Some(access_token), None) => Ok(OAuthToken {
                access_token,
                scope: token.scope.filter(|s| !s.is_empty()),
            }),
            (_, error) => Err(DispatchError::OAuth(format!(
                "GitHub rejected the code: {}",
                token
                    .error_description
                    .or(error)
                    .unwrap_or_else(|| "no access token".to_string())
            ))),
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(DispatchError::Provider(format!(
        "GitHub API error {}: {}",
        status, body
    )))
}

fn contents_url(api_base: &str, full_name: &str, path: &str, git_ref: &str) -> String {
    let path = path
        .trim_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");

    format!(
        "{}/repos/{}/contents/{}?ref={}",
        api_base,
        full_name,
        path,
        urlencoding::encode(git_ref)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_url() {
        let oauth = GitHubOAuth::new("client id", "secret").unwrap();
        let url = oauth.authorize_url("abc123", "https://d.example.com/github/callback");

        assert_eq!(
            url,
            "https://github.com/login/oauth/authorize?client_id=client%20id\
             &redirect_uri=https%3A%2F%2Fd.example.com%2Fgithub%2Fcallback\
             &scope=repo%20admin%3Arepo_hook&state=abc123"
        );
    }

    #[test]
    fn test_authorize_url_with_enterprise_origin() {
        let oauth = GitHubOAuth::new("id", "secret")
            .unwrap()
            .with_oauth_base("https://ghe.example.com/");
        let url = oauth.authorize_url("s", "http://localhost/cb");

        assert!(url.starts_with("https://ghe.example.com/login/oauth/authorize?"));
    }

    #[test]
    fn test_contents_url_encodes_segments() {
        let url = contents_url(
            "https://api.github.com",
            "octo/widgets",
            ".builds/linux build.yml",
            "abc123",
        );
        assert_eq!(
            url,
            "https://api.github.com/repos/octo/widgets/contents/.builds/linux%20build.yml?ref=abc123"
        );

        let dir = contents_url("https://api.github.com", "octo/widgets", ".builds/", "main");
        assert_eq!(
            dir,
            "https://api.github.com/repos/octo/widgets/contents/.builds?ref=main"
        );
    }

    #[tokio::test]
    async fn test_malformed_full_name_skips_request() {
        // Unroutable base: any request would fail rather than return None.
        let client = GitHubClient::new(reqwest::Client::new(), "http://127.0.0.1:1", "token");

        assert!(client.get_repo("doesNotExist").await.unwrap().is_none());
        assert!(client.get_repo("").await.unwrap().is_none());
    }

    mod against_mock_server {
        use super::*;
        use serde_json::{Value, json};
        use wiremock::matchers::{body_json, header, method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        const TOKEN: &str = "gho_test";

        fn client(server: &MockServer) -> GitHubClient {
            GitHubClient::new(reqwest::Client::new(), &server.uri(), TOKEN)
        }

        fn repo_json(n: usize) -> Value {
            json!({
                "id": n,
                "name": format!("repo{}", n),
                "full_name": format!("octo/repo{}", n),
                "clone_url": format!("https://github.com/octo/repo{}.git", n),
                "permissions": { "admin": true, "push": true, "pull": true }
            })
        }

        #[tokio::test]
        async fn test_repo_listing_stops_on_short_page() {
            let server = MockServer::start().await;

            let full_page: Vec<Value> = (0..REPOS_PER_PAGE).map(repo_json).collect();
            Mock::given(method("GET"))
                .and(path("/user/repos"))
                .and(query_param("sort", "updated"))
                .and(query_param("per_page", "100"))
                .and(query_param("page", "1"))
                .and(header("Authorization", format!("Bearer {}", TOKEN).as_str()))
                .respond_with(ResponseTemplate::new(200).set_body_json(full_page))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/user/repos"))
                .and(query_param("page", "2"))
                .respond_with(ResponseTemplate::new(200).set_body_json(vec![repo_json(100)]))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/user/repos"))
                .and(query_param("page", "3"))
                .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<Value>::new()))
                .expect(0)
                .mount(&server)
                .await;

            let repos = client(&server).list_repos_for_user("updated").await.unwrap();

            assert_eq!(repos.len(), REPOS_PER_PAGE + 1);
            assert_eq!(repos[100].full_name, "octo/repo100");
            assert!(repos[0].is_admin());
        }

        #[tokio::test]
        async fn test_missing_repo_and_file_are_none() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/repos/octo/gone"))
                .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/repos/octo/widgets/contents/.build.yml"))
                .and(query_param("ref", "abc123"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;

            let client = client(&server);

            assert!(client.get_repo("octo/gone").await.unwrap().is_none());
            assert!(
                client
                    .get_file_contents("octo/widgets", ".build.yml", "abc123")
                    .await
                    .unwrap()
                    .is_none()
            );
        }

        #[tokio::test]
        async fn test_raw_file_contents() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/repos/octo/widgets/contents/.build.yml"))
                .and(query_param("ref", "abc123"))
                .and(header("Accept", "application/vnd.github.raw+json"))
                .respond_with(ResponseTemplate::new(200).set_body_string("image: alpine/edge\n"))
                .mount(&server)
                .await;

            let contents = client(&server)
                .get_file_contents("octo/widgets", ".build.yml", "abc123")
                .await
                .unwrap();

            assert_eq!(contents.as_deref(), Some("image: alpine/edge\n"));
        }

        #[tokio::test]
        async fn test_directory_lists_only_files() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/repos/octo/widgets/contents/.builds"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                    { "name": "linux.yml", "type": "file" },
                    { "name": "nested", "type": "dir" },
                    { "name": "macos.yml", "type": "file" }
                ])))
                .mount(&server)
                .await;

            let names = client(&server)
                .list_directory("octo/widgets", ".builds", "main")
                .await
                .unwrap();

            assert_eq!(names, vec!["linux.yml", "macos.yml"]);
        }

        #[tokio::test]
        async fn test_create_webhook_request_body() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/repos/octo/widgets/hooks"))
                .and(header("Authorization", format!("Bearer {}", TOKEN).as_str()))
                .and(body_json(json!({
                    "name": "web",
                    "active": true,
                    "events": ["pull_request"],
                    "config": {
                        "url": "https://dispatch.example.com/webhook/01HQ9RHHSFA5HRGFH1A7X0Y1FJ",
                        "content_type": "json"
                    }
                })))
                .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 42 })))
                .expect(1)
                .mount(&server)
                .await;

            let hook = HookConfig::pull_requests(
                "https://dispatch.example.com/webhook/01HQ9RHHSFA5HRGFH1A7X0Y1FJ",
            );
            let created = client(&server)
                .create_webhook("octo/widgets", &hook)
                .await
                .unwrap();

            assert_eq!(created.id, 42);
        }

        #[tokio::test]
        async fn test_create_webhook_failure_is_provider_error() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/repos/octo/widgets/hooks"))
                .respond_with(ResponseTemplate::new(422).set_body_string("Hook already exists"))
                .mount(&server)
                .await;

            let err = client(&server)
                .create_webhook("octo/widgets", &HookConfig::pull_requests("https://x/webhook/1"))
                .await
                .unwrap_err();

            assert!(matches!(err, DispatchError::Provider(ref msg) if msg.contains("422")));
        }

        #[tokio::test]
        async fn test_exchange_code() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/login/oauth/access_token"))
                .and(header("Accept", "application/json"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "access_token": "gho_fresh",
                    "scope": "repo,admin:repo_hook",
                    "token_type": "bearer"
                })))
                .mount(&server)
                .await;

            let oauth = GitHubOAuth::new("id", "secret")
                .unwrap()
                .with_oauth_base(&server.uri());
            let token = oauth.exchange_code("code", "http://localhost/cb").await.unwrap();

            assert_eq!(token.access_token, "gho_fresh");
            assert_eq!(token.scope.as_deref(), Some("repo,admin:repo_hook"));
        }

        #[tokio::test]
        async fn test_exchange_code_error_body() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/login/oauth/access_token"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "error": "bad_verification_code",
                    "error_description": "The code passed is incorrect or expired."
                })))
                .mount(&server)
                .await;

            let oauth = GitHubOAuth::new("id", "secret")
                .unwrap()
                .with_oauth_base(&server.uri());
            let err = oauth
                .exchange_code("stale", "http://localhost/cb")
                .await
                .unwrap_err();

            assert!(matches!(err, DispatchError::OAuth(ref msg) if msg.contains("incorrect")));
        }
    }
}
