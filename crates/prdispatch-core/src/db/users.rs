//! Database operations for users and their provider authorizations.

use chrono::Utc;
use sqlx::Row;

use super::{DbPool, parse_datetime};
use crate::crypto::{EncryptionKey, decrypt_with_aad, encrypt_with_aad};
use crate::error::{DispatchError, Result};
use crate::models::{ProviderUser, User, UserId};

const AUTHORIZATIONS_TABLE: &str = "provider_authorizations";

/// User database operations.
pub struct UserRepo;

impl UserRepo {
    /// Creates the user on first sign-in. Later sign-ins match on the
    /// provider account id and refresh the stored login.
    pub async fn upsert_provider_user(pool: &DbPool, provider_user: &ProviderUser) -> Result<User> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query(
            r#"
            INSERT INTO users (provider_id, username, created, updated)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(provider_id) DO UPDATE SET
                username = excluded.username,
                updated = excluded.updated
            RETURNING id, provider_id, username, created, updated
            "#,
        )
        .bind(provider_user.id)
        .bind(&provider_user.login)
        .bind(&now)
        .bind(&now)
        .fetch_one(pool)
        .await?;

        Self::row_to_user(&row)
    }

    /// Gets a user by ID.
    pub async fn get_by_id(pool: &DbPool, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, provider_id, username, created, updated FROM users WHERE id = ?",
        )
            .bind(id.0)
            .fetch_optional(pool)
            .await?;

        row.map(|r| Self::row_to_user(&r)).transpose()
    }

    /// Deletes a user. Tasks, records, sessions and authorizations cascade.
    pub async fn delete(pool: &DbPool, id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.0)
            .execute(pool)
            .await?;

        Ok(())
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
        let created: String = row.get("created");
        let updated: String = row.get("updated");

        Ok(User {
            id: UserId(row.get("id")),
            provider_id: row.get("provider_id"),
            username: row.get("username"),
            created: parse_datetime(&created, "user.created")?,
            updated: parse_datetime(&updated, "user.updated")?,
        })
    }
}

/// Provider OAuth tokens, encrypted at rest.
pub struct ProviderAuthorizationRepo;

impl ProviderAuthorizationRepo {
    /// Stores (or replaces) the access token for a user.
    pub async fn store(
        pool: &DbPool,
        key: &EncryptionKey,
        user_id: UserId,
        access_token: &str,
        scope: Option<&str>,
    ) -> Result<()> {
        let (ciphertext, nonce) = encrypt_with_aad(
            key,
            access_token.as_bytes(),
            AUTHORIZATIONS_TABLE,
            &user_id.to_string(),
        )?;

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO provider_authorizations (
                user_id, access_token_encrypted, access_token_nonce, scope, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                access_token_encrypted = excluded.access_token_encrypted,
                access_token_nonce = excluded.access_token_nonce,
                scope = excluded.scope,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id.0)
        .bind(&ciphertext)
        .bind(&nonce)
        .bind(scope)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Returns the decrypted access token, if the user ever authorized.
    pub async fn get_token(
        pool: &DbPool,
        key: &EncryptionKey,
        user_id: UserId,
    ) -> Result<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT access_token_encrypted, access_token_nonce
            FROM provider_authorizations
            WHERE user_id = ?
            "#,
        )
        .bind(user_id.0)
        .fetch_optional(pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let ciphertext: Vec<u8> = row.get("access_token_encrypted");
        let nonce: Vec<u8> = row.get("access_token_nonce");
        let plaintext = decrypt_with_aad(
            key,
            &ciphertext,
            &nonce,
            AUTHORIZATIONS_TABLE,
            &user_id.to_string(),
        )?;

        String::from_utf8(plaintext)
            .map(Some)
            .map_err(|e| DispatchError::Encryption(format!("Invalid UTF-8 in access token: {}", e)))
    }
}
