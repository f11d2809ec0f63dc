//! Resolving a user's provider access.
//!
//! Provider tokens are stored encrypted per user; this turns a user id back
//! into a client acting on that user's behalf.

use std::sync::Arc;

use crate::crypto::EncryptionKey;
use crate::db::DbPool;
use crate::db::users::ProviderAuthorizationRepo;
use crate::error::{DispatchError, Result};
use crate::models::UserId;
use crate::providers::{ProviderClient, ProviderClientFactory};

/// Builds a provider client authenticated as `user_id`.
///
/// Fails with [`DispatchError::NotAuthorized`] if the user never completed
/// the OAuth flow.
pub async fn provider_for_user(
    db: &DbPool,
    encryption_key: &EncryptionKey,
    factory: &dyn ProviderClientFactory,
    user_id: UserId,
) -> Result<Arc<dyn ProviderClient>> {
    let token = ProviderAuthorizationRepo::get_token(db, encryption_key, user_id)
        .await?
        .ok_or_else(|| DispatchError::NotAuthorized(format!("user {}", user_id)))?;

    tracing::debug!("Using stored provider token for user {}", user_id);

    factory.client_for_token(&token)
}
