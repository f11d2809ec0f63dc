//! Database operations for webhook records.

use chrono::Utc;
use sqlx::Row;

use super::tasks::TaskRepo;
use super::{DbPool, parse_datetime};
use crate::error::{DispatchError, Result};
use crate::models::{
    TASKDEF_NAME, TaskId, UNREGISTERED_WEBHOOK_ID, UserId, WebhookRecord, WebhookRecordId,
    task_name,
};

/// Webhook record database operations.
pub struct WebhookRecordRepo;

impl WebhookRecordRepo {
    /// Creates a record and its task in one transaction.
    ///
    /// The record starts with [`UNREGISTERED_WEBHOOK_ID`] until
    /// [`Self::set_provider_webhook_id`] is called.
    pub async fn create(pool: &DbPool, user_id: UserId, repository: &str) -> Result<WebhookRecord> {
        let mut tx = pool.begin().await?;

        let task = TaskRepo::insert(&mut *tx, user_id, &task_name(repository), TASKDEF_NAME).await?;

        let now = Utc::now();
        let record = WebhookRecord {
            id: WebhookRecordId::new(),
            user_id,
            task_id: task.id,
            repository: repository.to_string(),
            provider_webhook_id: UNREGISTERED_WEBHOOK_ID,
            created: now,
            updated: now,
        };

        sqlx::query(
            r#"
            INSERT INTO github_pr_to_build (
                id, created, updated, user_id, task_id, repo, github_webhook_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.created.to_rfc3339())
        .bind(record.updated.to_rfc3339())
        .bind(record.user_id.0)
        .bind(record.task_id.0)
        .bind(&record.repository)
        .bind(record.provider_webhook_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            "Created webhook record {} for {} (task {})",
            record.id,
            record.repository,
            record.task_id
        );

        Ok(record)
    }

    /// Records the provider-assigned webhook id. Last write wins.
    pub async fn set_provider_webhook_id(
        pool: &DbPool,
        id: &WebhookRecordId,
        provider_webhook_id: i64,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE github_pr_to_build SET github_webhook_id = ?, updated = ? WHERE id = ?")
            .bind(provider_webhook_id)
            .bind(&now)
            .bind(id.to_string())
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Gets a record by ID.
    pub async fn get_by_id(pool: &DbPool, id: &WebhookRecordId) -> Result<Option<WebhookRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, created, updated, user_id, task_id, repo, github_webhook_id
            FROM github_pr_to_build
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

        row.map(|r| Self::row_to_record(&r)).transpose()
    }

    /// Lists a user's records, newest first.
    pub async fn list_by_owner(pool: &DbPool, user_id: UserId) -> Result<Vec<WebhookRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, created, updated, user_id, task_id, repo, github_webhook_id
            FROM github_pr_to_build
            WHERE user_id = ?
            ORDER BY created DESC
            "#,
        )
        .bind(user_id.0)
        .fetch_all(pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<WebhookRecord> {
        let id_str: String = row.get("id");
        let created: String = row.get("created");
        let updated: String = row.get("updated");

        Ok(WebhookRecord {
            id: WebhookRecordId::from_string(&id_str)
                .map_err(|e| DispatchError::Database(sqlx::Error::Decode(Box::new(e))))?,
            user_id: UserId(row.get("user_id")),
            task_id: TaskId(row.get("task_id")),
            repository: row.get("repo"),
            provider_webhook_id: row.get("github_webhook_id"),
            created: parse_datetime(&created, "github_pr_to_build.created")?,
            updated: parse_datetime(&updated, "github_pr_to_build.updated")?,
        })
    }
}
