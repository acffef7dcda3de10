//! Deezer public API client: track search and 30-second preview extraction.
//!
//! Neither endpoint needs authentication. Deezer reports failures with HTTP 200
//! and an `error` object in the body, so every response is checked for it.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::errors::{ExtractionError, SearchError};
use super::models::{ExtractedAudio, TrackRef};
use super::traits::{AudioExtractor, SearchProvider};

pub const DEEZER_API_BASE: &str = "https://api.deezer.com";

/// Deezer error code for "no data" (unknown id).
const DEEZER_NO_DATA_CODE: i64 = 800;

#[derive(Deserialize)]
struct SearchResponse {
    data: Option<Vec<DeezerTrack>>,
    error: Option<DeezerError>,
}

#[derive(Deserialize)]
struct DeezerTrack {
    id: Option<serde_json::Value>,
    title: Option<String>,
    preview: Option<String>,
    artist: Option<DeezerArtist>,
    album: Option<DeezerAlbum>,
    error: Option<DeezerError>,
}

#[derive(Deserialize)]
struct DeezerArtist {
    name: Option<String>,
}

#[derive(Deserialize)]
struct DeezerAlbum {
    cover_medium: Option<String>,
}

#[derive(Deserialize, Debug)]
struct DeezerError {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: Option<String>,
    code: Option<i64>,
}

impl DeezerError {
    fn describe(&self) -> String {
        format!(
            "{} ({}): {}",
            self.error_type.as_deref().unwrap_or("Error"),
            self.code.unwrap_or_default(),
            self.message.as_deref().unwrap_or("no message")
        )
    }
}

/// Deezer ids are numbers in JSON but we treat them as opaque strings.
fn id_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

impl DeezerTrack {
    fn into_track_ref(self) -> Option<TrackRef> {
        let id = self.id.as_ref().and_then(id_to_string)?;
        let artist = self
            .artist
            .and_then(|a| a.name)
            .unwrap_or_default();
        Some(
            TrackRef::new(id, self.title.unwrap_or_default(), TrackRef::join_artists([artist.as_str()]))
                .with_thumbnail(self.album.and_then(|a| a.cover_medium))
                .with_stream_url(self.preview),
        )
    }
}

/// Parse the body of `/search` into track refs, dropping entries without an id.
fn parse_search_body(body: &str) -> Result<Vec<TrackRef>, SearchError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| SearchError::Malformed(e.to_string()))?;

    if let Some(error) = response.error {
        return Err(SearchError::Provider(error.describe()));
    }

    let data = response
        .data
        .ok_or_else(|| SearchError::Malformed("missing 'data' field".to_string()))?;

    Ok(data
        .into_iter()
        .filter_map(DeezerTrack::into_track_ref)
        .collect())
}

/// Parse the body of `/track/{id}` into the preview URL.
fn parse_preview_url(track_id: &str, body: &str) -> Result<String, ExtractionError> {
    let track: DeezerTrack =
        serde_json::from_str(body).map_err(|e| ExtractionError::Provider(e.to_string()))?;

    if let Some(error) = track.error {
        return Err(if error.code == Some(DEEZER_NO_DATA_CODE) {
            ExtractionError::NotFound(track_id.to_string())
        } else {
            ExtractionError::Provider(error.describe())
        });
    }

    track
        .preview
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ExtractionError::NotFound(format!("{} has no preview", track_id)))
}

fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder().timeout(timeout).build()
}

/// Search provider backed by Deezer's `/search` endpoint.
#[derive(Clone)]
pub struct DeezerSearchProvider {
    client: Client,
    base_url: String,
}

impl DeezerSearchProvider {
    /// Create a new search provider.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the API (e.g., "https://api.deezer.com")
    /// * `timeout` - Transport-level request timeout
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl SearchProvider for DeezerSearchProvider {
    fn id(&self) -> &str {
        "deezer"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackRef>, SearchError> {
        let url = format!(
            "{}/search?q={}&limit={}",
            self.base_url,
            urlencoding::encode(query),
            limit
        );
        debug!("Deezer search: {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(SearchError::Provider(format!(
                "search failed with status {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        let mut tracks = parse_search_body(&body)?;
        tracks.truncate(limit);
        Ok(tracks)
    }
}

/// Extractor that downloads a track's 30-second preview clip.
#[derive(Clone)]
pub struct DeezerPreviewExtractor {
    client: Client,
    base_url: String,
}

impl DeezerPreviewExtractor {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_preview_url(&self, track_id: &str) -> Result<String, ExtractionError> {
        let url = format!("{}/track/{}", self.base_url, urlencoding::encode(track_id));
        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(ExtractionError::NotFound(track_id.to_string())),
            status if !status.is_success() => {
                return Err(ExtractionError::Provider(format!(
                    "track lookup failed with status {}",
                    status
                )))
            }
            _ => {}
        }

        let body = response.text().await?;
        parse_preview_url(track_id, &body)
    }
}

#[async_trait]
impl AudioExtractor for DeezerPreviewExtractor {
    fn id(&self) -> &str {
        "deezer_preview"
    }

    async fn extract(&self, track_id: &str) -> Result<ExtractedAudio, ExtractionError> {
        let preview_url = self.fetch_preview_url(track_id).await?;
        debug!("Downloading preview for {} from {}", track_id, preview_url);

        let response = self.client.get(&preview_url).send().await?;
        if !response.status().is_success() {
            return Err(ExtractionError::Provider(format!(
                "preview download failed with status {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let data = response.bytes().await?.to_vec();

        if data.is_empty() {
            return Err(ExtractionError::Provider(format!(
                "empty preview for {}",
                track_id
            )));
        }

        Ok(ExtractedAudio::Bytes { data, content_type })
    }
}
