//! Login sessions and OAuth state tokens.

use chrono::{DateTime, Duration, Utc};
use sqlx::Row;

use super::{DbPool, parse_datetime};
use crate::crypto::{generate_token, sha256_hex};
use crate::error::Result;
use crate::models::UserId;

/// Lifetime of a login session.
pub const SESSION_TTL_DAYS: i64 = 30;

/// Lifetime of an OAuth state token.
pub const OAUTH_STATE_TTL_MINUTES: i64 = 10;

/// Login session repository.
///
/// Only the SHA-256 of the session token is stored; the raw token lives in
/// the client's cookie.
pub struct SessionRepo;

impl SessionRepo {
    /// Creates a session for a user and returns the raw token.
    pub async fn create(pool: &DbPool, user_id: UserId) -> Result<String> {
        let token = generate_token();
        let now = Utc::now();
        let expires_at = now + Duration::days(SESSION_TTL_DAYS);

        sqlx::query(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(sha256_hex(token.as_bytes()))
        .bind(user_id.0)
        .bind(now.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(pool)
        .await?;

        Ok(token)
    }

    /// Resolves a raw session token to its user, ignoring expired sessions.
    pub async fn get_user_id(pool: &DbPool, token: &str) -> Result<Option<UserId>> {
        let row = sqlx::query("SELECT user_id, expires_at FROM sessions WHERE token_hash = ?")
            .bind(sha256_hex(token.as_bytes()))
            .fetch_optional(pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: String = row.get("expires_at");
        if parse_datetime(&expires_at, "session.expires_at")? <= Utc::now() {
            return Ok(None);
        }

        Ok(Some(UserId(row.get("user_id"))))
    }

    /// Deletes expired sessions.
    pub async fn delete_expired(pool: &DbPool) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
            .bind(&now)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// OAuth state for CSRF protection of the login flow.
#[derive(Debug, Clone)]
pub struct OAuthState {
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// OAuth state repository.
pub struct OAuthStateRepo;

impl OAuthStateRepo {
    /// Creates and stores a new state token.
    pub async fn create(pool: &DbPool) -> Result<OAuthState> {
        let now = Utc::now();
        let state = OAuthState {
            state: generate_token(),
            created_at: now,
            expires_at: now + Duration::minutes(OAUTH_STATE_TTL_MINUTES),
        };

        sqlx::query("INSERT INTO oauth_state (state, created_at, expires_at) VALUES (?, ?, ?)")
            .bind(&state.state)
            .bind(state.created_at.to_rfc3339())
            .bind(state.expires_at.to_rfc3339())
            .execute(pool)
            .await?;

        Ok(state)
    }

    /// Atomically consumes a state token. Returns false if it is unknown,
    /// expired or already consumed.
    pub async fn consume(pool: &DbPool, state: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE oauth_state
            SET consumed_at = ?
            WHERE state = ? AND consumed_at IS NULL AND expires_at > ?
            "#,
        )
        .bind(&now)
        .bind(state)
        .bind(&now)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Deletes expired OAuth states.
    pub async fn delete_expired(pool: &DbPool) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query("DELETE FROM oauth_state WHERE expires_at < ?")
            .bind(&now)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{create_user, setup_test_db};
    use crate::db::users::UserRepo;

    #[tokio::test]
    async fn test_session_resolves_to_user() {
        let pool = setup_test_db().await;
        let user = create_user(&pool, "octocat").await;

        let token = SessionRepo::create(&pool, user.id).await.unwrap();

        assert_eq!(
            SessionRepo::get_user_id(&pool, &token).await.unwrap(),
            Some(user.id)
        );
        assert_eq!(SessionRepo::get_user_id(&pool, "bogus").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_session_is_ignored() {
        let pool = setup_test_db().await;
        let user = create_user(&pool, "octocat").await;
        let token = SessionRepo::create(&pool, user.id).await.unwrap();

        let past = (Utc::now() - Duration::minutes(1)).to_rfc3339();
        sqlx::query("UPDATE sessions SET expires_at = ?")
            .bind(&past)
            .execute(&pool)
            .await
            .unwrap();

        assert_eq!(SessionRepo::get_user_id(&pool, &token).await.unwrap(), None);
        assert_eq!(SessionRepo::delete_expired(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sessions_removed_with_user() {
        let pool = setup_test_db().await;
        let user = create_user(&pool, "octocat").await;
        let token = SessionRepo::create(&pool, user.id).await.unwrap();

        UserRepo::delete(&pool, user.id).await.unwrap();

        assert_eq!(SessionRepo::get_user_id(&pool, &token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oauth_state_is_single_use() {
        let pool = setup_test_db().await;
        let state = OAuthStateRepo::create(&pool).await.unwrap();

        assert!(OAuthStateRepo::consume(&pool, &state.state).await.unwrap());
        assert!(!OAuthStateRepo::consume(&pool, &state.state).await.unwrap());
        assert!(!OAuthStateRepo::consume(&pool, "unknown").await.unwrap());
    }
}
