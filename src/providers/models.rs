//! Values exchanged with the external providers.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// A provider-identified candidate song with display metadata.
///
/// Two refs are equal when their provider identifiers are equal, whatever the
/// display metadata says.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRef {
    /// Provider-assigned identifier, unique within a provider
    pub id: String,
    pub title: String,
    /// Contributor names joined with ", "
    pub artist: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Direct audio locator, when the provider hands one out with the search result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
}

impl TrackRef {
    pub fn new(id: impl Into<String>, title: impl Into<String>, artist: impl Into<String>) -> Self {
        let title = title.into();
        let artist = artist.into();
        Self {
            id: id.into(),
            title: if title.trim().is_empty() {
                UNKNOWN_TITLE.to_string()
            } else {
                title
            },
            artist: if artist.trim().is_empty() {
                UNKNOWN_ARTIST.to_string()
            } else {
                artist
            },
            thumbnail_url: None,
            stream_url: None,
        }
    }

    pub fn with_thumbnail(mut self, url: Option<String>) -> Self {
        self.thumbnail_url = url.filter(|u| !u.is_empty());
        self
    }

    pub fn with_stream_url(mut self, url: Option<String>) -> Self {
        self.stream_url = url.filter(|u| !u.is_empty());
        self
    }

    /// Whether the ref carries an identifier we can resolve later.
    pub fn has_identifier(&self) -> bool {
        !self.id.trim().is_empty()
    }

    /// Join contributor names the way they are displayed.
    pub fn join_artists<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
        let joined = names
            .into_iter()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        if joined.is_empty() {
            UNKNOWN_ARTIST.to_string()
        } else {
            joined
        }
    }
}

impl PartialEq for TrackRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TrackRef {}

impl Hash for TrackRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Output of an [`AudioExtractor`](super::AudioExtractor).
#[derive(Debug, Clone)]
pub enum ExtractedAudio {
    /// A URL the client can stream from directly.
    Remote { url: String },
    /// Raw audio to be materialised into the local cache.
    Bytes {
        data: Vec<u8>,
        content_type: Option<String>,
    },
}
