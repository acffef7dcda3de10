//! Error taxonomy for the external capabilities.
//!
//! Every capability error knows how to represent a timeout and whether it is
//! worth retrying, so that [`CallPolicy`](super::CallPolicy) can treat search,
//! extraction and classification uniformly.

use std::time::Duration;
use thiserror::Error;

/// Behaviour shared by all capability errors.
pub trait CapabilityError: std::error::Error + Send + Sync + 'static {
    /// Build the error used when a call exceeds its deadline.
    fn timeout(after: Duration) -> Self;

    /// Whether a new attempt could plausibly succeed.
    fn is_retryable(&self) -> bool;

    /// Short label for logs and metrics.
    fn kind(&self) -> &'static str;
}

/// Errors returned by a music search provider.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SearchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Search timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Provider error: {0}")]
    Provider(String),
}

impl CapabilityError for SearchError {
    fn timeout(after: Duration) -> Self {
        SearchError::Timeout(after)
    }

    fn is_retryable(&self) -> bool {
        !matches!(self, SearchError::Malformed(_))
    }

    fn kind(&self) -> &'static str {
        match self {
            SearchError::Network(_) => "network",
            SearchError::Timeout(_) => "timeout",
            SearchError::Malformed(_) => "malformed",
            SearchError::Provider(_) => "provider",
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SearchError::Malformed(e.to_string())
        } else {
            SearchError::Network(e.to_string())
        }
    }
}

/// Errors returned while turning a track identifier into playable audio.
///
/// `Clone` because a single failed extraction is reported to every caller
/// that was waiting on it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("Track not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Extraction was abandoned before completing")]
    Abandoned,
}

impl CapabilityError for ExtractionError {
    fn timeout(after: Duration) -> Self {
        ExtractionError::Timeout(after)
    }

    fn is_retryable(&self) -> bool {
        !matches!(self, ExtractionError::NotFound(_))
    }

    fn kind(&self) -> &'static str {
        match self {
            ExtractionError::Network(_) => "network",
            ExtractionError::Timeout(_) => "timeout",
            ExtractionError::NotFound(_) => "not_found",
            ExtractionError::Storage(_) => "storage",
            ExtractionError::Provider(_) => "provider",
            ExtractionError::Abandoned => "abandoned",
        }
    }
}

impl From<reqwest::Error> for ExtractionError {
    fn from(e: reqwest::Error) -> Self {
        ExtractionError::Network(e.to_string())
    }
}

impl From<std::io::Error> for ExtractionError {
    fn from(e: std::io::Error) -> Self {
        ExtractionError::Storage(e.to_string())
    }
}

/// Errors returned by the mood classifier.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClassificationError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Classification timed out after {0:?}")]
    Timeout(Duration),

    #[error("Classifier error: {0}")]
    Provider(String),
}

impl CapabilityError for ClassificationError {
    fn timeout(after: Duration) -> Self {
        ClassificationError::Timeout(after)
    }

    fn is_retryable(&self) -> bool {
        !matches!(self, ClassificationError::InvalidImage(_))
    }

    fn kind(&self) -> &'static str {
        match self {
            ClassificationError::InvalidImage(_) => "invalid_image",
            ClassificationError::Timeout(_) => "timeout",
            ClassificationError::Provider(_) => "provider",
        }
    }
}

impl From<reqwest::Error> for ClassificationError {
    fn from(e: reqwest::Error) -> Self {
        ClassificationError::Provider(e.to_string())
    }
}
