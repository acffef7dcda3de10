//! Mock upstream services
//!
//! A single axum server standing in for the Deezer API, its preview CDN and
//! the mood classification service. Counters let tests assert how often the
//! server under test went upstream.

use super::constants::*;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Default)]
pub struct UpstreamCounters {
    pub searches: AtomicUsize,
    pub track_lookups: AtomicUsize,
    pub preview_downloads: AtomicUsize,
    pub classifications: AtomicUsize,
}

#[derive(Clone)]
struct UpstreamState {
    base_url: String,
    counters: Arc<UpstreamCounters>,
    search_broken: Arc<AtomicBool>,
}

#[derive(Deserialize)]
struct SearchParams {
    q: String,
    limit: Option<usize>,
}

/// The bytes served for every preview clip.
pub fn preview_bytes() -> Vec<u8> {
    let mut data = b"ID3".to_vec();
    data.extend((0..PREVIEW_SIZE_BYTES - 3).map(|i| (i % 251) as u8));
    data
}

async fn search(State(state): State<UpstreamState>, Query(params): Query<SearchParams>) -> Response {
    state.counters.searches.fetch_add(1, Ordering::SeqCst);
    if state.search_broken.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "search is down").into_response();
    }

    let limit = params.limit.unwrap_or(25);
    let data: Vec<_> = (0..limit as u64)
        .map(|i| {
            let id = FIRST_SEARCH_TRACK_ID + i;
            json!({
                "id": id,
                "title": format!("{} #{}", params.q, i),
                "preview": format!("{}/preview/{}", state.base_url, id),
                "artist": { "name": "Mock Artist" },
                "album": { "cover_medium": format!("{}/cover/{}.jpg", state.base_url, id) },
            })
        })
        .collect();
    Json(json!({ "data": data, "total": limit })).into_response()
}

async fn track(State(state): State<UpstreamState>, Path(id): Path<String>) -> Response {
    state.counters.track_lookups.fetch_add(1, Ordering::SeqCst);
    if id == UNKNOWN_TRACK_ID {
        return Json(json!({
            "error": { "type": "DataException", "message": "no data", "code": 800 }
        }))
        .into_response();
    }
    Json(json!({
        "id": id,
        "title": "Mock Track",
        "preview": format!("{}/preview/{}", state.base_url, id),
    }))
    .into_response()
}

async fn preview(State(state): State<UpstreamState>, Path(_id): Path<String>) -> Response {
    state.counters.preview_downloads.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(PREVIEW_DELAY_MS)).await;
    ([(header::CONTENT_TYPE, "audio/mpeg")], preview_bytes()).into_response()
}

async fn classify(State(state): State<UpstreamState>, body: Bytes) -> Response {
    state.counters.classifications.fetch_add(1, Ordering::SeqCst);
    if body.as_ref() == NO_FACE_IMAGE {
        return Json(json!({ "mood": null })).into_response();
    }
    Json(json!({ "mood": CLASSIFIED_MOOD, "confidence": CLASSIFIED_CONFIDENCE })).into_response()
}

/// Running mock upstream; shuts down when dropped.
pub struct MockUpstream {
    pub base_url: String,
    pub counters: Arc<UpstreamCounters>,
    search_broken: Arc<AtomicBool>,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockUpstream {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock upstream");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let counters = Arc::new(UpstreamCounters::default());
        let search_broken = Arc::new(AtomicBool::new(false));
        let state = UpstreamState {
            base_url: base_url.clone(),
            counters: counters.clone(),
            search_broken: search_broken.clone(),
        };

        let app = Router::new()
            .route("/search", get(search))
            .route("/track/{id}", get(track))
            .route("/preview/{id}", get(preview))
            .route("/classify", post(classify))
            .with_state(state);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Mock upstream failed");
        });

        Self {
            base_url,
            counters,
            search_broken,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Make every subsequent search answer with HTTP 500.
    pub fn break_search(&self) {
        self.search_broken.store(true, Ordering::SeqCst);
    }

    pub fn classifier_url(&self) -> String {
        format!("{}/classify", self.base_url)
    }

    pub fn preview_downloads(&self) -> usize {
        self.counters.preview_downloads.load(Ordering::SeqCst)
    }

    pub fn searches(&self) -> usize {
        self.counters.searches.load(Ordering::SeqCst)
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
