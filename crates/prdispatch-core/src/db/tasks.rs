//! Database operations for tasks.

use chrono::Utc;
use sqlx::{Row, SqliteConnection};

use super::{DbPool, parse_datetime};
use crate::error::Result;
use crate::models::{Task, TaskId, UserId};

/// Task database operations.
pub struct TaskRepo;

impl TaskRepo {
    /// Inserts a task on an open connection, so callers can group it with
    /// dependent rows in one transaction.
    pub(crate) async fn insert(
        conn: &mut SqliteConnection,
        user_id: UserId,
        name: &str,
        taskdef: &str,
    ) -> Result<Task> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query(
            r#"
            INSERT INTO tasks (name, user_id, taskdef, created, updated)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, name, user_id, taskdef, created, updated
            "#,
        )
        .bind(name)
        .bind(user_id.0)
        .bind(taskdef)
        .bind(&now)
        .bind(&now)
        .fetch_one(conn)
        .await?;

        Self::row_to_task(&row)
    }

    /// Gets a task by ID.
    pub async fn get_by_id(pool: &DbPool, id: TaskId) -> Result<Option<Task>> {
        let row = sqlx::query(
            "SELECT id, name, user_id, taskdef, created, updated FROM tasks WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(pool)
        .await?;

        row.map(|r| Self::row_to_task(&r)).transpose()
    }

    /// Lists a user's tasks, newest first.
    pub async fn list_by_user(pool: &DbPool, user_id: UserId) -> Result<Vec<Task>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, user_id, taskdef, created, updated
            FROM tasks
            WHERE user_id = ?
            ORDER BY id DESC
            "#,
        )
        .bind(user_id.0)
        .fetch_all(pool)
        .await?;

        rows.iter().map(Self::row_to_task).collect()
    }

    /// Deletes a task. The record that owns it cascades.
    pub async fn delete(pool: &DbPool, id: TaskId) -> Result<()> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.0)
            .execute(pool)
            .await?;

        Ok(())
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task> {
        let created: String = row.get("created");
        let updated: String = row.get("updated");

        Ok(Task {
            id: TaskId(row.get("id")),
            name: row.get("name"),
            user_id: UserId(row.get("user_id")),
            taskdef: row.get("taskdef"),
            created: parse_datetime(&created, "task.created")?,
            updated: parse_datetime(&updated, "task.updated")?,
        })
    }
}
