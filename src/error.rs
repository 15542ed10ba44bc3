use std::time::Duration;

use thiserror::Error;

/// Fatal failures of a report-generation call. Image fetch problems never
/// surface here; they degrade to an omitted photo inside the resolver.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("invalid inspection input: {0}")]
    InvalidInput(String),
    #[error("failed to decode inspection record: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("cannot embed image `{reference}`: {message}")]
    UnsupportedImage { reference: String, message: String },
    #[error("pdf encoding failed: {0}")]
    Encode(String),
    #[error("report rendering exceeded its {0:?} deadline")]
    Deadline(Duration),
    #[error("report not found: {key}")]
    NotFound { key: String },
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReportError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn encode(message: impl std::fmt::Display) -> Self {
        Self::Encode(message.to_string())
    }
}

/// Failures reported by object-store and directory collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }

    pub fn not_found(bucket: &str, key: &str) -> Self {
        Self::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}
