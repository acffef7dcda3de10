//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all moodplayer-server endpoints.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Response;
use serde_json::json;
use std::time::Duration;

/// HTTP test client
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    /// Creates a client that does not follow redirects, so 307s stay observable
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    // ========================================================================
    // Server
    // ========================================================================

    /// GET /
    pub async fn get_stats(&self) -> Response {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .expect("Stats request failed")
    }

    // ========================================================================
    // Mood & Recommendations
    // ========================================================================

    /// POST /v1/mood/detect with `image` wrapped into a base64 data URL
    pub async fn detect_mood(&self, image: &[u8]) -> Response {
        let data_url = format!("data:image/jpeg;base64,{}", STANDARD.encode(image));
        self.detect_mood_raw(&data_url).await
    }

    /// POST /v1/mood/detect with an arbitrary `image` string
    pub async fn detect_mood_raw(&self, image: &str) -> Response {
        self.client
            .post(format!("{}/v1/mood/detect", self.base_url))
            .json(&json!({ "image": image }))
            .send()
            .await
            .expect("Detect mood request failed")
    }

    /// POST /v1/recommend
    pub async fn recommend(&self, mood: &str, count: usize) -> Response {
        self.client
            .post(format!("{}/v1/recommend", self.base_url))
            .json(&json!({ "mood": mood, "count": count }))
            .send()
            .await
            .expect("Recommend request failed")
    }

    // ========================================================================
    // Audio
    // ========================================================================

    /// GET /v1/audio/{id}
    pub async fn get_audio(&self, track_id: &str) -> Response {
        self.client
            .get(format!("{}/v1/audio/{}", self.base_url, track_id))
            .send()
            .await
            .expect("Audio request failed")
    }

    /// GET /v1/audio/{id} with a Range header
    pub async fn get_audio_range(&self, track_id: &str, range: &str) -> Response {
        self.client
            .get(format!("{}/v1/audio/{}", self.base_url, track_id))
            .header("Range", range)
            .send()
            .await
            .expect("Audio range request failed")
    }

    /// GET /v1/audio?source=<url>
    pub async fn get_audio_by_source(&self, source: &str) -> Response {
        self.client
            .get(format!("{}/v1/audio", self.base_url))
            .query(&[("source", source)])
            .send()
            .await
            .expect("Audio by source request failed")
    }

    /// GET /v1/cache/stats
    pub async fn get_cache_stats(&self) -> Response {
        self.client
            .get(format!("{}/v1/cache/stats", self.base_url))
            .send()
            .await
            .expect("Cache stats request failed")
    }
}
