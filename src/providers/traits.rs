use async_trait::async_trait;

use super::errors::{ClassificationError, ExtractionError, SearchError};
use super::models::{ExtractedAudio, TrackRef};
use crate::mood::MoodReading;

/// A music catalogue that can be searched by free-text query.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Unique identifier (e.g., "deezer")
    fn id(&self) -> &str;

    /// Return up to `limit` candidate tracks for `query`.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackRef>, SearchError>;
}

/// Turns a track identifier into playable audio.
///
/// May take seconds to tens of seconds; callers bound it with a timeout.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    fn id(&self) -> &str;

    async fn extract(&self, track_id: &str) -> Result<ExtractedAudio, ExtractionError>;
}

/// Detects the dominant facial emotion in an image.
#[async_trait]
pub trait MoodClassifier: Send + Sync {
    fn id(&self) -> &str;

    async fn classify(&self, image: &[u8]) -> Result<MoodReading, ClassificationError>;
}
