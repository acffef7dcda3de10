use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::stream_audio::{stream_audio, stream_audio_from_source};
use super::{http_cache, log_requests, metrics, state::*};
use crate::audio_cache::AudioCache;
use crate::mood::{Mood, MoodReading};
use crate::providers::{CapabilityError, ClassificationError, TrackRef};
use crate::recommender::SelectionSource;

const CACHE_METRICS_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub started_at: DateTime<Utc>,
    pub version: String,
    pub classifier_enabled: bool,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Deserialize, Debug)]
struct DetectMoodBody {
    pub image: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct RecommendBody {
    pub mood: Option<String>,
    pub count: Option<usize>,
}

#[derive(Serialize)]
struct RecommendResponse {
    mood: Mood,
    source: SelectionSource,
    songs: Vec<TrackRef>,
}

/// Decode a `data:<mime>;base64,<payload>` URL into raw bytes.
fn decode_data_url(data_url: &str) -> Result<Vec<u8>, String> {
    let rest = data_url
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| "image must be a data URL".to_string())?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| "data URL has no payload".to_string())?;
    if !header.ends_with(";base64") {
        return Err("data URL must be base64 encoded".to_string());
    }
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| format!("invalid base64 payload: {}", e))?;
    if bytes.is_empty() {
        return Err("image is empty".to_string());
    }
    Ok(bytes)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        started_at: state.started_at,
        version: env!("CARGO_PKG_VERSION").to_string(),
        classifier_enabled: state.classifier.is_some(),
    };
    Json(stats)
}

async fn detect_mood(State(state): State<ServerState>, Json(body): Json<DetectMoodBody>) -> Response {
    let classifier = match &state.classifier {
        Some(classifier) => classifier.clone(),
        None => {
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "No mood classifier configured",
            )
        }
    };

    let image = match body.image.as_deref().map(decode_data_url) {
        Some(Ok(bytes)) => bytes,
        Some(Err(reason)) => return error_response(StatusCode::BAD_REQUEST, reason),
        None => return error_response(StatusCode::BAD_REQUEST, "Missing image"),
    };
    debug!("Classifying {} byte image", image.len());

    let result: Result<MoodReading, ClassificationError> = state
        .classifier_policy
        .call("mood classification", || classifier.classify(&image))
        .await;

    match result {
        Ok(reading) => {
            metrics::record_mood_detection(reading.mood.as_str());
            Json(reading).into_response()
        }
        Err(ClassificationError::InvalidImage(reason)) => {
            metrics::record_error("invalid_image", "mood_detect");
            error_response(StatusCode::BAD_REQUEST, reason)
        }
        Err(err) => {
            warn!("Mood classification failed: {}", err);
            metrics::record_error(err.kind(), "mood_detect");
            error_response(StatusCode::BAD_GATEWAY, err.to_string())
        }
    }
}

async fn recommend(
    State(selector): State<GuardedSelector>,
    Json(body): Json<RecommendBody>,
) -> impl IntoResponse {
    let mood = body
        .mood
        .as_deref()
        .map(Mood::parse)
        .unwrap_or(Mood::Neutral);
    let count = body.count.unwrap_or(selector.settings().default_count);

    let selection = selector.select(&mood, count).await;
    Json(RecommendResponse {
        mood: selection.mood,
        source: selection.source,
        songs: selection.tracks,
    })
}

async fn get_cache_stats(State(audio_cache): State<AudioCache>) -> impl IntoResponse {
    let stats = audio_cache.stats().await;
    metrics::set_audio_cache_entries(&stats);
    Json(stats)
}

pub fn make_app(state: ServerState) -> Result<Router> {
    let config = state.config.clone();

    let api_routes: Router = Router::new()
        .route("/mood/detect", post(detect_mood))
        .route("/recommend", post(recommend))
        .route("/cache/stats", get(get_cache_stats))
        .with_state(state.clone());

    let audio_routes: Router = Router::new()
        .route("/", get(stream_audio_from_source))
        .route("/{id}", get(stream_audio))
        .layer(middleware::from_fn_with_state(
            config.content_cache_age_sec,
            http_cache,
        ))
        .with_state(state.clone());

    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new().route("/", get(home)).with_state(state.clone()),
    };

    let app: Router = home_router
        .nest("/v1/audio", audio_routes)
        .nest("/v1", api_routes)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests));

    Ok(app)
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics::metrics_handler))
}

/// Periodically mirror the audio cache entry counts into the metrics registry.
async fn report_cache_metrics(audio_cache: AudioCache, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(CACHE_METRICS_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                metrics::set_audio_cache_entries(&audio_cache.stats().await);
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

/// Serve the API on `config.port` and the metrics on `config.metrics_port`
/// until `shutdown` is cancelled.
pub async fn run_server(state: ServerState, shutdown: CancellationToken) -> Result<()> {
    let port = state.config.port;
    let metrics_port = state.config.metrics_port;
    let audio_cache = state.audio_cache.clone();
    let app = make_app(state)?;

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    let metrics_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;

    tokio::spawn(report_cache_metrics(audio_cache, shutdown.child_token()));

    info!("Listening on port {}, metrics on port {}", port, metrics_port);

    let api_server = axum::serve(listener, app).with_graceful_shutdown(shutdown.clone().cancelled_owned());
    let metrics_server = axum::serve(metrics_listener, make_metrics_app())
        .with_graceful_shutdown(shutdown.cancelled_owned());

    tokio::try_join!(
        async { api_server.await.context("HTTP server failed") },
        async { metrics_server.await.context("Metrics server failed") },
    )?;
    Ok(())
}
