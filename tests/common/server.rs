//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own cache directory and its
//! own mock upstream.

use super::constants::*;
use super::upstream::MockUpstream;
use moodplayer_server::audio_cache::{AudioCache, AudioCacheSettings};
use moodplayer_server::providers::{
    CallPolicy, DeezerPreviewExtractor, DeezerSearchProvider, HttpMoodClassifier, MoodClassifier,
};
use moodplayer_server::recommender::{FallbackCatalog, RecommendationSelector, RecommenderSettings};
use moodplayer_server::server::{make_app, RequestsLoggingLevel, ServerConfig, ServerState};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with an isolated cache directory and mock upstream
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// The mock search/extraction/classifier upstream
    pub upstream: MockUpstream,

    /// Audio cache shared with the running server
    pub audio_cache: AudioCache,

    // Private fields - keep resources alive until drop
    _temp_cache_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server with a mood classifier configured
    pub async fn spawn() -> Self {
        Self::spawn_with(true).await
    }

    /// Spawns a new test server without a mood classifier
    pub async fn spawn_without_classifier() -> Self {
        Self::spawn_with(false).await
    }

    /// Spawns a new test server on a random port
    ///
    /// This function:
    /// 1. Starts the mock upstream
    /// 2. Wires the real Deezer and HTTP classifier clients against it
    /// 3. Binds to a random port (127.0.0.1:0)
    /// 4. Spawns the server in a background task
    /// 5. Waits for the server to be ready
    ///
    /// # Panics
    ///
    /// Panics if the server fails to start or doesn't become ready within timeout.
    async fn spawn_with(with_classifier: bool) -> Self {
        let upstream = MockUpstream::spawn().await;
        let temp_cache_dir = TempDir::new().expect("Failed to create cache dir");

        let search_policy = CallPolicy {
            initial_backoff: Duration::from_millis(10),
            ..CallPolicy::new(Duration::from_secs(2), 1)
        };
        let search = Arc::new(
            DeezerSearchProvider::new(&upstream.base_url, Duration::from_secs(2))
                .expect("Failed to build search provider"),
        );
        let selector = Arc::new(RecommendationSelector::new(
            search,
            Arc::new(FallbackCatalog::built_in()),
            RecommenderSettings {
                search_policy,
                ..Default::default()
            },
        ));

        let extractor = Arc::new(
            DeezerPreviewExtractor::new(&upstream.base_url, Duration::from_secs(5))
                .expect("Failed to build extractor"),
        );
        let audio_cache = AudioCache::new(
            extractor,
            AudioCacheSettings {
                cache_dir: temp_cache_dir.path().to_path_buf(),
                extraction_policy: CallPolicy::new(Duration::from_secs(5), 0),
                waiter_timeout: Duration::from_secs(10),
                ..Default::default()
            },
        );

        let classifier: Option<Arc<dyn MoodClassifier>> = if with_classifier {
            Some(Arc::new(
                HttpMoodClassifier::new(&upstream.classifier_url(), Duration::from_secs(2))
                    .expect("Failed to build classifier"),
            ))
        } else {
            None
        };

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            port,
            metrics_port: 0,
            requests_logging_level: RequestsLoggingLevel::None,
            content_cache_age_sec: TEST_CONTENT_CACHE_AGE_SEC,
            frontend_dir_path: None,
        };
        let state = ServerState::new(
            config,
            selector,
            audio_cache.clone(),
            classifier,
            CallPolicy::new(Duration::from_secs(2), 0),
        );
        let app = make_app(state).expect("Failed to build app");

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        // Wait for server to be ready
        let server = Self {
            base_url,
            port,
            upstream,
            audio_cache,
            _temp_cache_dir: temp_cache_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the stats endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => {
                    return;
                }
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
        // TempDir will be cleaned up automatically
    }
}
