//! HTTP client for the builds service job API.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::manifest::{JobRequest, load_manifests, prepare_jobs};
use super::{BuildSubmitter, PayloadHead, PayloadRepository, SubmissionResponse};
use crate::auth::provider_for_user;
use crate::crypto::EncryptionKey;
use crate::db::DbPool;
use crate::error::{DispatchError, Result};
use crate::models::WebhookRecord;
use crate::providers::{ProviderClientFactory, create_http_client};

/// Builds service location and credentials.
#[derive(Debug, Clone)]
pub struct BuildsConfig {
    /// Origin of the builds service, e.g. `https://builds.example.com`.
    pub origin: String,
    /// Token sent as `Authorization: token ...` on job submission.
    pub token: Option<String>,
}

impl BuildsConfig {
    pub fn jobs_url(&self) -> String {
        format!("{}/api/jobs", self.origin.trim_end_matches('/'))
    }

    pub fn job_url(&self, job_id: i64) -> String {
        format!("{}/job/{}", self.origin.trim_end_matches('/'), job_id)
    }
}

enum JobOutcome {
    Created(i64),
    /// Passed back to the provider unchanged.
    Rejected(SubmissionResponse),
}

/// Submits one job per manifest found at the PR head.
pub struct BuildsClient {
    client: reqwest::Client,
    config: BuildsConfig,
    db: DbPool,
    encryption_key: EncryptionKey,
    providers: Arc<dyn ProviderClientFactory>,
}

impl BuildsClient {
    pub fn new(
        config: BuildsConfig,
        db: DbPool,
        encryption_key: EncryptionKey,
        providers: Arc<dyn ProviderClientFactory>,
    ) -> Result<Self> {
        Ok(Self {
            client: create_http_client()?,
            config,
            db,
            encryption_key,
            providers,
        })
    }

    async fn post_job(&self, job: &JobRequest) -> Result<JobOutcome> {
        #[derive(Deserialize)]
        struct JobResponse {
            id: i64,
        }

        let mut request = self.client.post(self.config.jobs_url()).json(job);
        if let Some(token) = &self.config.token {
            request = request.header("Authorization", format!("token {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| DispatchError::Builds(format!("Job submission failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Builds service rejected job with {}: {}", status, body);
            return Ok(JobOutcome::Rejected(SubmissionResponse {
                status: status.as_u16(),
                body,
            }));
        }

        let created: JobResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::Builds(format!("Failed to parse job response: {}", e)))?;

        Ok(JobOutcome::Created(created.id))
    }
}

#[async_trait]
impl BuildSubmitter for BuildsClient {
    async fn submit(
        &self,
        record: &WebhookRecord,
        repo: &serde_json::Value,
        head: &serde_json::Value,
    ) -> Result<SubmissionResponse> {
        let base = PayloadRepository::from_value(repo)?;
        let head = PayloadHead::from_value(head)?;
        let head_repository = head.repository()?;

        let provider = provider_for_user(
            &self.db,
            &self.encryption_key,
            self.providers.as_ref(),
            record.user_id,
        )
        .await?;

        let manifests =
            load_manifests(provider.as_ref(), &head_repository.full_name, &head.sha).await?;
        let jobs = prepare_jobs(&manifests, &base, &head, head_repository);
        if jobs.is_empty() {
            tracing::info!(
                "No build manifests in {}@{} for record {}",
                head_repository.full_name,
                head.short_sha(),
                record.id
            );
            return Ok(SubmissionResponse::ok("No build manifests found"));
        }

        let mut urls = Vec::with_capacity(jobs.len());
        for job in &jobs {
            match self.post_job(job).await? {
                JobOutcome::Created(job_id) => urls.push(self.config.job_url(job_id)),
                JobOutcome::Rejected(rejection) => {
                    if !urls.is_empty() {
                        tracing::warn!(
                            "Job rejected for {} after {} build(s) were submitted: {}",
                            record.repository,
                            urls.len(),
                            urls.join(", ")
                        );
                    }
                    return Ok(rejection);
                }
            }
        }

        tracing::info!(
            "Submitted {} build(s) for {} ({})",
            urls.len(),
            record.repository,
            head.display_name()
        );

        Ok(SubmissionResponse::ok(format!(
            "Submitted {} build(s): {}",
            urls.len(),
            urls.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{create_user, setup_test_db};
    use crate::db::records::WebhookRecordRepo;
    use crate::db::users::ProviderAuthorizationRepo;
    use crate::testing::{FakeProvider, FakeProviderFactory, test_encryption_key};
    use serde_json::json;

    #[test]
    fn test_builds_urls() {
        let config = BuildsConfig {
            origin: "https://builds.example.com/".to_string(),
            token: None,
        };

        assert_eq!(config.jobs_url(), "https://builds.example.com/api/jobs");
        assert_eq!(config.job_url(42), "https://builds.example.com/job/42");
    }

    #[tokio::test]
    async fn test_no_manifests_short_circuits() {
        let pool = setup_test_db().await;
        let key = test_encryption_key();
        let user = create_user(&pool, "octocat").await;
        ProviderAuthorizationRepo::store(&pool, &key, user.id, "gho_token", None)
            .await
            .unwrap();
        let record = WebhookRecordRepo::create(&pool, user.id, "octo/widgets")
            .await
            .unwrap();

        let factory = Arc::new(FakeProviderFactory::new(Arc::new(FakeProvider::new("octocat"))));
        let client = BuildsClient::new(
            BuildsConfig {
                // Never contacted: there is nothing to submit.
                origin: "http://127.0.0.1:1".to_string(),
                token: None,
            },
            pool.clone(),
            key,
            factory,
        )
        .unwrap();

        let repo = json!({
            "name": "widgets",
            "full_name": "octo/widgets",
            "clone_url": "https://github.com/octo/widgets.git"
        });
        let head = json!({ "sha": "abc123", "repo": repo.clone() });

        let response = client.submit(&record, &repo, &head).await.unwrap();

        assert_eq!(response, SubmissionResponse::ok("No build manifests found"));
    }

    #[tokio::test]
    async fn test_head_without_repo_is_rejected() {
        let pool = setup_test_db().await;
        let key = test_encryption_key();
        let user = create_user(&pool, "octocat").await;
        let record = WebhookRecordRepo::create(&pool, user.id, "octo/widgets")
            .await
            .unwrap();
        let factory = Arc::new(FakeProviderFactory::new(Arc::new(FakeProvider::new("octocat"))));
        let client = BuildsClient::new(
            BuildsConfig {
                origin: "http://127.0.0.1:1".to_string(),
                token: None,
            },
            pool.clone(),
            key,
            factory,
        )
        .unwrap();

        let repo = json!({
            "name": "widgets",
            "full_name": "octo/widgets",
            "clone_url": "https://github.com/octo/widgets.git"
        });

        let err = client
            .submit(&record, &repo, &json!({ "sha": "abc123", "repo": null }))
            .await
            .unwrap_err();

        assert!(err.is_rejection());
    }

    mod job_submission {
        use super::*;
        use wiremock::matchers::{body_partial_json, header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        const MANIFEST: &str = "image: alpine/edge\nsources:\n- https://github.com/octo/widgets.git\n";

        async fn setup(
            provider: FakeProvider,
            origin: &str,
            token: Option<&str>,
        ) -> (BuildsClient, WebhookRecord) {
            let pool = setup_test_db().await;
            let key = test_encryption_key();
            let user = create_user(&pool, "octocat").await;
            ProviderAuthorizationRepo::store(&pool, &key, user.id, "gho_token", None)
                .await
                .unwrap();
            let record = WebhookRecordRepo::create(&pool, user.id, "octo/widgets")
                .await
                .unwrap();

            let client = BuildsClient::new(
                BuildsConfig {
                    origin: origin.to_string(),
                    token: token.map(str::to_string),
                },
                pool,
                key,
                Arc::new(FakeProviderFactory::new(Arc::new(provider))),
            )
            .unwrap();

            (client, record)
        }

        fn event() -> (serde_json::Value, serde_json::Value) {
            let base = json!({
                "name": "widgets",
                "full_name": "octo/widgets",
                "clone_url": "https://github.com/octo/widgets.git"
            });
            let head = json!({
                "sha": "0123456789abcdef",
                "ref": "feature",
                "label": "fork:feature",
                "repo": {
                    "name": "widgets",
                    "full_name": "fork/widgets",
                    "clone_url": "https://github.com/fork/widgets.git"
                }
            });
            (base, head)
        }

        #[tokio::test]
        async fn test_jobs_posted_with_token() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/api/jobs"))
                .and(header("Authorization", "token builds-secret"))
                .and(body_partial_json(json!({
                    "note": "Pull request fork:feature (0123456) on octo/widgets",
                    "tags": ["widgets", "pull_request"],
                    "execute": true
                })))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 7 })))
                .expect(2)
                .mount(&server)
                .await;

            let provider = FakeProvider::new("octocat")
                .with_file("fork/widgets", ".builds/linux.yml", MANIFEST)
                .with_file("fork/widgets", ".builds/macos.yml", MANIFEST);
            let (client, record) = setup(provider, &server.uri(), Some("builds-secret")).await;
            let (base, head) = event();

            let response = client.submit(&record, &base, &head).await.unwrap();

            let job_url = format!("{}/job/7", server.uri());
            assert_eq!(response.status, 200);
            assert_eq!(
                response.body,
                format!("Submitted 2 build(s): {}, {}", job_url, job_url)
            );

            let requests = server.received_requests().await.unwrap();
            let job: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
            let manifest = job["manifest"].as_str().unwrap();
            assert!(manifest.contains("https://github.com/fork/widgets.git#0123456789abcdef"));
            assert!(!manifest.contains("octo/widgets"));
        }

        #[tokio::test]
        async fn test_no_token_sends_no_authorization() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/api/jobs"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1 })))
                .expect(1)
                .mount(&server)
                .await;

            let provider =
                FakeProvider::new("octocat").with_file("fork/widgets", ".build.yml", MANIFEST);
            let (client, record) = setup(provider, &server.uri(), None).await;
            let (base, head) = event();

            let response = client.submit(&record, &base, &head).await.unwrap();
            assert_eq!(
                response.body,
                format!("Submitted 1 build(s): {}/job/1", server.uri())
            );

            let requests = server.received_requests().await.unwrap();
            assert!(requests[0].headers.get("authorization").is_none());
        }

        #[tokio::test]
        async fn test_rejection_passes_through() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/api/jobs"))
                .respond_with(ResponseTemplate::new(400).set_body_string("Invalid manifest: image"))
                .expect(1)
                .mount(&server)
                .await;

            let provider = FakeProvider::new("octocat")
                .with_file("fork/widgets", ".builds/a.yml", MANIFEST)
                .with_file("fork/widgets", ".builds/b.yml", MANIFEST);
            let (client, record) = setup(provider, &server.uri(), Some("builds-secret")).await;
            let (base, head) = event();

            let response = client.submit(&record, &base, &head).await.unwrap();

            assert_eq!(
                response,
                SubmissionResponse {
                    status: 400,
                    body: "Invalid manifest: image".to_string(),
                }
            );
        }
    }
}
