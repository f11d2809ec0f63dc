//! User model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Database identifier for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user who signed in through the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Provider account id; stable across login renames.
    pub provider_id: i64,
    /// Provider login name as of the last sign-in.
    pub username: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}
