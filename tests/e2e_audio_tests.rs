//! End-to-end tests for audio resolution and streaming
//!
//! Tests the audio cache through the HTTP surface: preview extraction,
//! single-flight deduplication, range requests and identifier extraction.

mod common;

use common::{
    preview_bytes, TestClient, TestServer, PREVIEW_SIZE_BYTES, TEST_CONTENT_CACHE_AGE_SEC,
    UNKNOWN_TRACK_ID,
};
use moodplayer_server::audio_cache::{AudioResource, EntryState};
use reqwest::StatusCode;
use serde_json::Value;

const TRACK_ID: &str = "3135556";

#[tokio::test]
async fn test_audio_returns_preview_bytes() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.get_audio(TRACK_ID).await;
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(headers.get("content-type").unwrap(), "audio/mpeg");
    assert_eq!(headers.get("accept-ranges").unwrap(), "bytes");
    assert_eq!(
        headers.get("cache-control").unwrap().to_str().unwrap(),
        format!("max-age={}", TEST_CONTENT_CACHE_AGE_SEC)
    );

    let bytes = response.bytes().await.unwrap();
    assert_eq!(bytes.len(), PREVIEW_SIZE_BYTES);
    assert_eq!(bytes.as_ref(), preview_bytes().as_slice());
}

#[tokio::test]
async fn test_audio_is_extracted_once_and_then_served_from_cache() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    assert_eq!(client.get_audio(TRACK_ID).await.status(), StatusCode::OK);
    assert_eq!(client.get_audio(TRACK_ID).await.status(), StatusCode::OK);
    assert_eq!(server.upstream.preview_downloads(), 1);

    match server.audio_cache.resolve(TRACK_ID).await.unwrap() {
        AudioResource::LocalFile {
            path, size_bytes, ..
        } => {
            assert!(path.exists());
            assert_eq!(size_bytes, PREVIEW_SIZE_BYTES as u64);
            assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mp3"));
        }
        other => panic!("expected a local file, got {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_requests_share_one_extraction() {
    let server = TestServer::spawn().await;

    let requests = (0..8).map(|_| {
        let client = TestClient::new(server.base_url.clone());
        async move { client.get_audio(TRACK_ID).await.status() }
    });
    let statuses = futures::future::join_all(requests).await;

    assert!(statuses.iter().all(|s| *s == StatusCode::OK), "{:?}", statuses);
    assert_eq!(server.upstream.preview_downloads(), 1);
    assert_eq!(
        server.audio_cache.state(TRACK_ID).await,
        Some(EntryState::Ready)
    );
}

#[tokio::test]
async fn test_audio_range_request() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.get_audio_range(TRACK_ID, "bytes=0-99").await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers().get("content-range").unwrap().to_str().unwrap(),
        format!("bytes 0-99/{}", PREVIEW_SIZE_BYTES)
    );
    let bytes = response.bytes().await.unwrap();
    assert_eq!(bytes.as_ref(), &preview_bytes()[..100]);

    let response = client.get_audio_range(TRACK_ID, "bytes=4000-").await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    let bytes = response.bytes().await.unwrap();
    assert_eq!(bytes.len(), PREVIEW_SIZE_BYTES - 4000);

    let response = client
        .get_audio_range(TRACK_ID, &format!("bytes={}-", PREVIEW_SIZE_BYTES))
        .await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
}

#[tokio::test]
async fn test_unknown_track_returns_404_and_is_retried() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.get_audio(UNKNOWN_TRACK_ID).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().get("cache-control").is_none());
    let json: Value = response.json().await.unwrap();
    assert!(json["error"].is_string());
    assert_eq!(
        server.audio_cache.state(UNKNOWN_TRACK_ID).await,
        Some(EntryState::Failed)
    );

    // A failed entry does not stick: the next request goes upstream again.
    let lookups_before = server
        .upstream
        .counters
        .track_lookups
        .load(std::sync::atomic::Ordering::SeqCst);
    assert_eq!(
        client.get_audio(UNKNOWN_TRACK_ID).await.status(),
        StatusCode::NOT_FOUND
    );
    let lookups_after = server
        .upstream
        .counters
        .track_lookups
        .load(std::sync::atomic::Ordering::SeqCst);
    assert_eq!(lookups_after, lookups_before + 1);
}

#[tokio::test]
async fn test_invalid_track_id_is_rejected() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.get_audio("x").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(server.upstream.preview_downloads(), 0);
}

#[tokio::test]
async fn test_audio_by_source_url() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client
        .get_audio_by_source(&format!("https://www.deezer.com/en/track/{}", TRACK_ID))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        server.audio_cache.state(TRACK_ID).await,
        Some(EntryState::Ready)
    );

    let response = client
        .get_audio_by_source("https://example.com/some/page?x=1")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cache_stats() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    client.get_audio(TRACK_ID).await;
    client.get_audio(TRACK_ID).await;
    client.get_audio(UNKNOWN_TRACK_ID).await;

    let response = client.get_cache_stats().await;
    assert_eq!(response.status(), StatusCode::OK);

    let json: Value = response.json().await.unwrap();
    assert_eq!(json["ready"], 1);
    assert_eq!(json["failed"], 1);
    assert_eq!(json["pending"], 0);
    assert_eq!(json["hits"], 1);
    assert_eq!(json["extractions"], 2);
}
