use thiserror::Error;

use crate::image::ParseImageError;
use crate::version::error::{CacheError, RegistryError, VersionError};

pub type Result<T> = std::result::Result<T, CheckError>;

/// Everything that can go wrong while checking an image
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Invalid image reference: {0}")]
    InvalidImageReference(#[from] ParseImageError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(#[from] RegistryError),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(#[from] CacheError),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Evaluation expired or missing: {0}")]
    EvaluationExpired(String),

    #[error("Job queue is closed")]
    QueueClosed,
}

impl CheckError {
    /// HTTP status used when this error reaches a client
    pub fn status_code(&self) -> u16 {
        match self {
            CheckError::InvalidImageReference(_) | CheckError::Version(_) => 400,
            CheckError::JobNotFound(_) | CheckError::EvaluationExpired(_) => 404,
            CheckError::RegistryUnavailable(_) => 502,
            CheckError::CacheUnavailable(_) | CheckError::QueueClosed => 500,
        }
    }

    /// Failures on our side; everything else is an expected answer to a bad
    /// or stale request
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}

/// Errors raised while talking to a remote fresh-container server
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{url} - Response code: {status} - Body {body}")]
    UnexpectedStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("{url} - Missing Location header in {status} response")]
    MissingLocation { url: String, status: u16 },

    #[error("{url} - Invalid response body: {reason}")]
    InvalidBody { url: String, reason: String },
}
