//! Error types for the prdispatch core library.

use thiserror::Error;

/// Core error type for prdispatch.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Date parsing error in {field}: {message}")]
    DateParse {
        field: &'static str,
        message: String,
    },

    #[error("Invalid record ID: {0}")]
    InvalidRecordId(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("Not authorized with provider: {0}")]
    NotAuthorized(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Builds service error: {0}")]
    Builds(String),

    #[error("OAuth error: {0}")]
    OAuth(String),
}

impl DispatchError {
    /// Returns true for errors caused by the caller's input rather than by a
    /// collaborator or the store.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            DispatchError::InvalidRecordId(_)
                | DispatchError::MissingField(_)
                | DispatchError::InvalidPayload(_)
                | DispatchError::RepositoryNotFound(_)
        )
    }
}

/// Result type alias for prdispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
