//! Repository selection and webhook registration.

use std::collections::HashSet;

use crate::db::DbPool;
use crate::db::records::WebhookRecordRepo;
use crate::error::{DispatchError, Result};
use crate::models::{HookConfig, RepositorySummary, User, WebhookRecord, webhook_url};
use crate::providers::ProviderClient;

/// Lists the repositories `user` may configure: ones they administer and
/// that are not forks, most recently updated first.
pub async fn list_configurable_repositories(
    db: &DbPool,
    provider: &dyn ProviderClient,
    user: &User,
) -> Result<Vec<RepositorySummary>> {
    let repos = provider.list_repos_for_user("updated").await?;

    let configured: HashSet<String> = WebhookRecordRepo::list_by_owner(db, user.id)
        .await?
        .into_iter()
        .map(|record| record.repository)
        .collect();

    Ok(repos
        .iter()
        .filter(|repo| repo.is_admin() && !repo.fork)
        .map(|repo| RepositorySummary::from_repository(repo, configured.contains(&repo.full_name)))
        .collect())
}

/// Opts `repo` in: creates the record and its task, then registers the
/// webhook pointing at `{base_url}/webhook/{record_id}`.
///
/// If the provider refuses the webhook the record is kept with the
/// unregistered sentinel id and the provider error is returned.
pub async fn configure_repository(
    db: &DbPool,
    provider: &dyn ProviderClient,
    user: &User,
    repo: Option<&str>,
    base_url: &str,
) -> Result<WebhookRecord> {
    let requested = repo
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or(DispatchError::MissingField("repo"))?;

    let repository = provider
        .get_repo(requested)
        .await?
        .ok_or_else(|| DispatchError::RepositoryNotFound(requested.to_string()))?;

    let mut record = WebhookRecordRepo::create(db, user.id, &repository.full_name).await?;

    let hook = HookConfig::pull_requests(webhook_url(base_url, &record.id));
    let webhook = match provider.create_webhook(&repository.full_name, &hook).await {
        Ok(webhook) => webhook,
        Err(e) => {
            tracing::error!(
                "Webhook registration failed for {} (record {} left unregistered): {}",
                repository.full_name,
                record.id,
                e
            );
            return Err(e);
        }
    };

    WebhookRecordRepo::set_provider_webhook_id(db, &record.id, webhook.id).await?;
    record.provider_webhook_id = webhook.id;

    tracing::info!(
        "User {} configured {} (record {}, webhook {})",
        user.username,
        repository.full_name,
        record.id,
        webhook.id
    );

    Ok(record)
}
