//! Application state for the prdispatch server.

use std::sync::Arc;

use axum::http::StatusCode;
use prdispatch_core::builds::{BuildSubmitter, BuildsClient, BuildsConfig};
use prdispatch_core::crypto::EncryptionKey;
use prdispatch_core::db::DbPool;
use prdispatch_core::providers::github::{DEFAULT_API_URL, DEFAULT_OAUTH_URL};
use prdispatch_core::providers::{
    GitHubClientFactory, GitHubOAuth, OAuthProvider, ProviderClientFactory,
};
use url::Url;

/// Default listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Server configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Public origin used to build webhook and callback URLs.
    pub base_url: String,
    /// Parsed base URL.
    pub base_url_parsed: Url,
    /// Listen address.
    pub bind: String,
    /// Database URL.
    pub database_url: String,
    /// Relaxes the HTTPS requirement and drops `Secure` from cookies.
    pub dev_mode: bool,
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        let base_url = std::env::var("PRDISPATCH_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());
        let base_url = base_url.trim_end_matches('/').to_string();

        let base_url_parsed =
            Url::parse(&base_url).map_err(|e| format!("Invalid PRDISPATCH_BASE_URL: {}", e))?;

        let dev_mode = std::env::var("PRDISPATCH_DEV_MODE").ok().as_deref() == Some("true");

        // Webhook URLs carry the record id as their only credential.
        if !dev_mode && base_url_parsed.scheme() != "https" {
            let host = base_url_parsed.host_str().unwrap_or("");
            let is_loopback = host == "localhost" || host == "127.0.0.1" || host == "[::1]";
            if !is_loopback {
                return Err("PRDISPATCH_BASE_URL must use HTTPS in production. Set PRDISPATCH_DEV_MODE=true for development.".to_string());
            }
        }

        Ok(Self {
            base_url,
            base_url_parsed,
            bind: std::env::var("PRDISPATCH_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:prdispatch.db".to_string()),
            dev_mode,
        })
    }

    /// The OAuth redirect URI registered with the provider.
    pub fn oauth_callback_url(&self) -> String {
        format!("{}/github/callback", self.base_url)
    }
}

/// Settings of the GitHub-to-builds integration.
#[derive(Debug, Clone)]
pub struct IntegrationConfig {
    pub github_client_id: Option<String>,
    pub github_client_secret: Option<String>,
    pub github_api_url: String,
    /// Web origin serving the OAuth endpoints (differs on GitHub Enterprise).
    pub github_oauth_url: String,
    pub builds_origin: Option<String>,
    pub builds_token: Option<String>,
    pub encryption_key: Option<EncryptionKey>,
}

impl IntegrationConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let encryption_key =
            EncryptionKey::from_env().map_err(|e| format!("Invalid ENCRYPTION_KEY: {}", e))?;

        Ok(Self {
            github_client_id: non_empty("GITHUB_CLIENT_ID"),
            github_client_secret: non_empty("GITHUB_CLIENT_SECRET"),
            github_api_url: non_empty("GITHUB_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            github_oauth_url: non_empty("GITHUB_OAUTH_URL")
                .unwrap_or_else(|| DEFAULT_OAUTH_URL.to_string()),
            builds_origin: non_empty("BUILDS_ORIGIN"),
            builds_token: non_empty("BUILDS_TOKEN"),
            encryption_key,
        })
    }

    /// OAuth app, builds service and encryption key are all configured.
    pub fn is_enabled(&self) -> bool {
        self.github_client_id.is_some()
            && self.github_client_secret.is_some()
            && self.builds_origin.is_some()
            && self.encryption_key.is_some()
    }

    /// Names the settings still missing, for the startup log.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.github_client_id.is_none() {
            missing.push("GITHUB_CLIENT_ID");
        }
        if self.github_client_secret.is_none() {
            missing.push("GITHUB_CLIENT_SECRET");
        }
        if self.builds_origin.is_none() {
            missing.push("BUILDS_ORIGIN");
        }
        if self.encryption_key.is_none() {
            missing.push("ENCRYPTION_KEY");
        }
        missing
    }
}

/// Collaborators of the enabled integration.
#[derive(Clone)]
pub struct Integration {
    pub encryption_key: EncryptionKey,
    pub providers: Arc<dyn ProviderClientFactory>,
    pub oauth: Arc<dyn OAuthProvider>,
    pub submitter: Arc<dyn BuildSubmitter>,
}

impl Integration {
    /// Wires the GitHub and builds-service clients, or `None` if the
    /// integration is disabled.
    pub fn from_config(config: &IntegrationConfig, db: &DbPool) -> Result<Option<Self>, String> {
        let (Some(client_id), Some(client_secret), Some(builds_origin), Some(encryption_key)) = (
            config.github_client_id.as_deref(),
            config.github_client_secret.as_deref(),
            config.builds_origin.as_deref(),
            config.encryption_key.clone(),
        ) else {
            return Ok(None);
        };

        let providers: Arc<dyn ProviderClientFactory> = Arc::new(
            GitHubClientFactory::new(&config.github_api_url).map_err(|e| e.to_string())?,
        );
        let oauth = GitHubOAuth::new(client_id, client_secret)
            .map_err(|e| e.to_string())?
            .with_oauth_base(&config.github_oauth_url);
        let submitter = BuildsClient::new(
            BuildsConfig {
                origin: builds_origin.to_string(),
                token: config.builds_token.clone(),
            },
            db.clone(),
            encryption_key.clone(),
            providers.clone(),
        )
        .map_err(|e| e.to_string())?;

        Ok(Some(Self {
            encryption_key,
            providers,
            oauth: Arc::new(oauth),
            submitter: Arc::new(submitter),
        }))
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Present when the integration is enabled.
    pub integration: Option<Integration>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(db: DbPool, config: ServerConfig, integration: Option<Integration>) -> Self {
        Self {
            db,
            config: Arc::new(config),
            integration,
        }
    }

    /// Gets the integration, or a 503 response if it is disabled.
    pub fn require_integration(&self) -> Result<&Integration, (StatusCode, String)> {
        self.integration.as_ref().ok_or((
            StatusCode::SERVICE_UNAVAILABLE,
            "GitHub integration is not configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn test_server_config_defaults() {
        temp_env::with_vars(
            [
                ("PRDISPATCH_BASE_URL", None::<&str>),
                ("PRDISPATCH_BIND", None),
                ("PRDISPATCH_DEV_MODE", None),
                ("DATABASE_URL", None),
            ],
            || {
                let config = ServerConfig::from_env().unwrap();
                assert_eq!(config.base_url, "http://localhost:8080");
                assert_eq!(config.bind, DEFAULT_BIND);
                assert_eq!(config.database_url, "sqlite:prdispatch.db");
                assert!(!config.dev_mode);
                assert_eq!(
                    config.oauth_callback_url(),
                    "http://localhost:8080/github/callback"
                );
            },
        );
    }

    #[test]
    fn test_server_config_requires_https_outside_dev_mode() {
        temp_env::with_vars(
            [
                ("PRDISPATCH_BASE_URL", Some("http://dispatch.example.com")),
                ("PRDISPATCH_DEV_MODE", None),
            ],
            || {
                assert!(ServerConfig::from_env().is_err());
            },
        );

        temp_env::with_vars(
            [
                ("PRDISPATCH_BASE_URL", Some("http://dispatch.example.com")),
                ("PRDISPATCH_DEV_MODE", Some("true")),
            ],
            || {
                assert!(ServerConfig::from_env().unwrap().dev_mode);
            },
        );
    }

    #[test]
    fn test_server_config_trims_trailing_slash() {
        temp_env::with_vars(
            [("PRDISPATCH_BASE_URL", Some("https://dispatch.example.com/"))],
            || {
                let config = ServerConfig::from_env().unwrap();
                assert_eq!(config.base_url, "https://dispatch.example.com");
            },
        );
    }

    #[test]
    fn test_integration_enabled_only_when_complete() {
        let full = [
            ("GITHUB_CLIENT_ID", Some("id")),
            ("GITHUB_CLIENT_SECRET", Some("secret")),
            ("BUILDS_ORIGIN", Some("https://builds.example.com")),
            ("ENCRYPTION_KEY", Some(KEY)),
            ("GITHUB_API_URL", None),
            ("GITHUB_OAUTH_URL", None),
        ];

        temp_env::with_vars(full, || {
            let config = IntegrationConfig::from_env().unwrap();
            assert!(config.is_enabled());
            assert!(config.missing().is_empty());
            assert_eq!(config.github_api_url, DEFAULT_API_URL);
            assert_eq!(config.github_oauth_url, DEFAULT_OAUTH_URL);
        });

        temp_env::with_vars(
            [
                ("GITHUB_CLIENT_ID", Some("id")),
                ("GITHUB_CLIENT_SECRET", Some("secret")),
                ("BUILDS_ORIGIN", None),
                ("ENCRYPTION_KEY", Some(KEY)),
            ],
            || {
                let config = IntegrationConfig::from_env().unwrap();
                assert!(!config.is_enabled());
                assert_eq!(config.missing(), vec!["BUILDS_ORIGIN"]);
            },
        );
    }

    #[test]
    fn test_invalid_encryption_key_is_an_error() {
        temp_env::with_var("ENCRYPTION_KEY", Some("too-short"), || {
            assert!(IntegrationConfig::from_env().is_err());
        });
    }

    #[test]
    fn test_enterprise_urls_from_env() {
        temp_env::with_vars(
            [
                ("GITHUB_API_URL", Some("https://ghe.example.com/api/v3")),
                ("GITHUB_OAUTH_URL", Some("https://ghe.example.com")),
                ("ENCRYPTION_KEY", None),
            ],
            || {
                let config = IntegrationConfig::from_env().unwrap();
                assert_eq!(config.github_api_url, "https://ghe.example.com/api/v3");
                assert_eq!(config.github_oauth_url, "https://ghe.example.com");
            },
        );
    }

    #[tokio::test]
    async fn test_login_uses_configured_oauth_origin() {
        let db = prdispatch_core::db::create_pool("sqlite::memory:")
            .await
            .unwrap();
        let config = IntegrationConfig {
            github_client_id: Some("id".to_string()),
            github_client_secret: Some("secret".to_string()),
            github_api_url: "https://ghe.example.com/api/v3".to_string(),
            github_oauth_url: "https://ghe.example.com".to_string(),
            builds_origin: Some("https://builds.example.com".to_string()),
            builds_token: None,
            encryption_key: Some(EncryptionKey::from_string(KEY).unwrap()),
        };

        let integration = Integration::from_config(&config, &db).unwrap().unwrap();
        let url = integration
            .oauth
            .authorize_url("state", "https://dispatch.example.com/github/callback");

        assert!(url.starts_with("https://ghe.example.com/login/oauth/authorize?"));
    }
}
