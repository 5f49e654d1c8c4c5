use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Rate limited: retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Image not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Attempted to use insecure protocol for {0}, set non_ssl to force it")]
    Insecure(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Errors produced while turning tags and constraints into versions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("The tag '{tag}' doesn't start with the tag prefix '{prefix}'")]
    PrefixMismatch { tag: String, prefix: String },

    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("Invalid constraint '{constraint}': {reason}")]
    InvalidConstraint { constraint: String, reason: String },
}
