use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use moodplayer_server::audio_cache::AudioCache;
use moodplayer_server::config::{self, AppConfig, ExtractorSettings};
use moodplayer_server::providers::{
    AudioExtractor, CallPolicy, DeezerPreviewExtractor, DeezerSearchProvider,
    HttpMoodClassifier, MoodClassifier, UrlTemplateExtractor,
};
use moodplayer_server::recommender::{FallbackCatalog, RecommendationSelector};
use moodplayer_server::server::{metrics, run_server, RequestsLoggingLevel, ServerConfig, ServerState};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 5000)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// The maximum age of audio responses in HTTP caches, in seconds.
    #[clap(long, default_value_t = 3600)]
    pub content_cache_age_sec: usize,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Directory where extracted audio files are stored.
    #[clap(long, value_parser = parse_path)]
    pub cache_dir: Option<PathBuf>,

    /// Base URL of the music search API.
    #[clap(long)]
    pub search_url: Option<String>,

    /// URL of the mood classification service. Mood detection is disabled without it.
    #[clap(long)]
    pub classifier_url: Option<String>,

    /// Timeout in seconds for a single search request.
    #[clap(long, default_value_t = 10)]
    pub search_timeout_sec: u64,

    /// Timeout in seconds for a single audio extraction.
    #[clap(long, default_value_t = 60)]
    pub extraction_timeout_sec: u64,

    /// Timeout in seconds for a single mood classification.
    #[clap(long, default_value_t = 20)]
    pub classifier_timeout_sec: u64,

    /// TOML file replacing the built-in fallback songs.
    #[clap(long, value_parser = parse_path)]
    pub fallback_catalog_path: Option<PathBuf>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            content_cache_age_sec: args.content_cache_age_sec,
            frontend_dir_path: args.frontend_dir_path.clone(),
            cache_dir: args.cache_dir.clone(),
            search_url: args.search_url.clone(),
            classifier_url: args.classifier_url.clone(),
            search_timeout_sec: args.search_timeout_sec,
            extraction_timeout_sec: args.extraction_timeout_sec,
            classifier_timeout_sec: args.classifier_timeout_sec,
            fallback_catalog_path: args.fallback_catalog_path.clone(),
        }
    }
}

fn make_extractor(app_config: &AppConfig) -> Result<Arc<dyn AudioExtractor>> {
    let timeout = app_config.audio_cache.extraction_policy.timeout;
    let extractor: Arc<dyn AudioExtractor> = match &app_config.extractor {
        ExtractorSettings::DeezerPreview => {
            Arc::new(DeezerPreviewExtractor::new(&app_config.search_url, timeout)?)
        }
        ExtractorSettings::UrlTemplate { template } => {
            Arc::new(UrlTemplateExtractor::new(template)?)
        }
    };
    Ok(extractor)
}

fn make_classifier(app_config: &AppConfig) -> Result<Option<Arc<dyn MoodClassifier>>> {
    let timeout = Duration::from_secs(app_config.classifier_timeout_sec);
    match &app_config.classifier_url {
        Some(url) => {
            let classifier: Arc<dyn MoodClassifier> = Arc::new(HttpMoodClassifier::new(url, timeout)?);
            Ok(Some(classifier))
        }
        None => Ok(None),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  port: {}", app_config.port);
    info!("  metrics_port: {}", app_config.metrics_port);
    info!("  cache_dir: {:?}", app_config.audio_cache.cache_dir);
    info!("  search_url: {}", app_config.search_url);
    info!("  classifier_url: {:?}", app_config.classifier_url);
    info!("  extractor: {:?}", app_config.extractor);
    info!("  eviction: {:?}", app_config.eviction);

    info!("Initializing metrics...");
    metrics::init_metrics();

    let fallback_catalog = match &app_config.fallback_catalog_path {
        Some(path) => FallbackCatalog::load(path)?,
        None => FallbackCatalog::built_in(),
    };

    let search = Arc::new(DeezerSearchProvider::new(
        &app_config.search_url,
        app_config.recommender.search_policy.timeout,
    )?);
    let selector = Arc::new(RecommendationSelector::new(
        search,
        Arc::new(fallback_catalog),
        app_config.recommender.clone(),
    ));

    let audio_cache = AudioCache::with_eviction(
        make_extractor(&app_config)?,
        app_config.audio_cache.clone(),
        app_config.eviction.build(),
    );
    let rehydrated = audio_cache.load_existing().await?;
    info!("Rehydrated {} cached audio files", rehydrated);

    let classifier = make_classifier(&app_config)?;
    if classifier.is_none() {
        info!("No classifier_url configured, mood detection is disabled");
    }
    let classifier_policy = CallPolicy::new(Duration::from_secs(app_config.classifier_timeout_sec), 0);

    let server_config = ServerConfig {
        requests_logging_level: app_config.logging_level.clone(),
        port: app_config.port,
        metrics_port: app_config.metrics_port,
        content_cache_age_sec: app_config.content_cache_age_sec,
        frontend_dir_path: app_config.frontend_dir_path.clone(),
    };
    let state = ServerState::new(
        server_config,
        selector,
        audio_cache,
        classifier,
        classifier_policy,
    );

    let shutdown_token = CancellationToken::new();

    info!("Ready to serve at port {}!", app_config.port);
    info!("Metrics available at port {}!", app_config.metrics_port);

    tokio::select! {
        result = run_server(state, shutdown_token.clone()) => {
            info!("HTTP server stopped: {:?}", result);
            shutdown_token.cancel();
            result
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            shutdown_token.cancel();
            // Let in-flight responses drain
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }
    }
}
