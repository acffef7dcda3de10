mod file_config;

pub use file_config::{AudioCacheConfig, FileConfig, ProvidersConfig, RecommenderConfig};

use crate::audio_cache::{
    AudioCacheSettings, EvictionPolicy, LruEviction, NoEviction, TtlEviction,
};
use crate::providers::{CallPolicy, DEEZER_API_BASE};
use crate::recommender::{RecommenderSettings, DEFAULT_SECONDARY_QUERY};
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub content_cache_age_sec: usize,
    pub frontend_dir_path: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub search_url: Option<String>,
    pub classifier_url: Option<String>,
    pub search_timeout_sec: u64,
    pub extraction_timeout_sec: u64,
    pub classifier_timeout_sec: u64,
    pub fallback_catalog_path: Option<PathBuf>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::Path,
            content_cache_age_sec: 3600,
            frontend_dir_path: None,
            cache_dir: None,
            search_url: None,
            classifier_url: None,
            search_timeout_sec: 10,
            extraction_timeout_sec: 60,
            classifier_timeout_sec: 20,
            fallback_catalog_path: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub content_cache_age_sec: usize,
    pub frontend_dir_path: Option<String>,
    pub search_url: String,
    pub classifier_url: Option<String>,
    pub classifier_timeout_sec: u64,
    pub fallback_catalog_path: Option<PathBuf>,

    // Feature configs (with defaults)
    pub recommender: RecommenderSettings,
    pub audio_cache: AudioCacheSettings,
    pub eviction: EvictionSettings,
    pub extractor: ExtractorSettings,
}

/// Which eviction policy the audio cache runs with.
#[derive(Debug, Clone, PartialEq)]
pub enum EvictionSettings {
    None,
    Lru { max_entries: usize },
    Ttl { ttl: Duration },
}

impl EvictionSettings {
    pub fn build(&self) -> Box<dyn EvictionPolicy> {
        match self {
            EvictionSettings::None => Box::new(NoEviction),
            EvictionSettings::Lru { max_entries } => Box::new(LruEviction {
                max_entries: *max_entries,
            }),
            EvictionSettings::Ttl { ttl } => Box::new(TtlEviction { ttl: *ttl }),
        }
    }
}

/// Which audio extractor backs the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractorSettings {
    DeezerPreview,
    UrlTemplate { template: String },
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        if port == metrics_port && port != 0 {
            bail!("port and metrics_port must differ (both are {})", port);
        }

        let logging_level = match file.logging_level {
            Some(s) => match parse_logging_level(&s) {
                Some(level) => level,
                None => bail!("Invalid logging_level: {}", s),
            },
            None => cli.logging_level.clone(),
        };

        let content_cache_age_sec = file
            .content_cache_age_sec
            .unwrap_or(cli.content_cache_age_sec);
        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        let cache_dir = file
            .cache_dir
            .map(PathBuf::from)
            .or_else(|| cli.cache_dir.clone())
            .unwrap_or_else(|| PathBuf::from("./audio_cache"));
        if cache_dir.exists() && !cache_dir.is_dir() {
            bail!("cache_dir is not a directory: {:?}", cache_dir);
        }

        let search_url = file
            .search_url
            .or_else(|| cli.search_url.clone())
            .unwrap_or_else(|| DEEZER_API_BASE.to_string());
        let classifier_url = file.classifier_url.or_else(|| cli.classifier_url.clone());

        let search_timeout_sec = file.search_timeout_sec.unwrap_or(cli.search_timeout_sec);
        let extraction_timeout_sec = file
            .extraction_timeout_sec
            .unwrap_or(cli.extraction_timeout_sec);
        let classifier_timeout_sec = file
            .classifier_timeout_sec
            .unwrap_or(cli.classifier_timeout_sec);
        for (name, value) in [
            ("search_timeout_sec", search_timeout_sec),
            ("extraction_timeout_sec", extraction_timeout_sec),
            ("classifier_timeout_sec", classifier_timeout_sec),
        ] {
            if value == 0 {
                bail!("{} must be greater than 0", name);
            }
        }

        let fallback_catalog_path = file
            .fallback_catalog_path
            .map(PathBuf::from)
            .or_else(|| cli.fallback_catalog_path.clone());

        // Recommender settings - merge file config with defaults
        let rec_file = file.recommender.unwrap_or_default();
        let max_count = rec_file.max_count.unwrap_or(20);
        let default_count = rec_file.default_count.unwrap_or(5);
        if max_count == 0 {
            bail!("recommender.max_count must be greater than 0");
        }
        if default_count == 0 || default_count > max_count {
            bail!(
                "recommender.default_count must be between 1 and max_count ({}), got {}",
                max_count,
                default_count
            );
        }
        let secondary_query = match rec_file.secondary_query {
            Some(q) if q.trim().is_empty() => None,
            Some(q) => Some(q),
            None => Some(DEFAULT_SECONDARY_QUERY.to_string()),
        };
        let recommender = RecommenderSettings {
            default_count,
            max_count,
            overfetch_factor: rec_file.overfetch_factor.unwrap_or(2).max(2),
            secondary_query,
            queries: rec_file.queries.unwrap_or_default(),
            search_policy: CallPolicy::new(
                Duration::from_secs(search_timeout_sec),
                rec_file.search_retries.unwrap_or(1),
            ),
        };

        // Audio cache settings
        let ac_file = file.audio_cache.unwrap_or_default();
        let max_concurrent_extractions = ac_file.max_concurrent_extractions.unwrap_or(4);
        if max_concurrent_extractions == 0 {
            bail!("audio_cache.max_concurrent_extractions must be greater than 0");
        }
        let extraction_retries = ac_file.extraction_retries.unwrap_or(0);
        let extraction_policy =
            CallPolicy::new(Duration::from_secs(extraction_timeout_sec), extraction_retries);
        // Every attempt may use its full timeout, plus time queued for a permit.
        let waiter_timeout_sec = ac_file
            .waiter_timeout_sec
            .unwrap_or(extraction_timeout_sec * (extraction_retries as u64 + 1) * 2);
        let audio_cache = AudioCacheSettings {
            cache_dir,
            max_concurrent_extractions,
            extraction_policy,
            waiter_timeout: Duration::from_secs(waiter_timeout_sec),
        };

        let eviction = match ac_file.eviction.as_deref().unwrap_or("none") {
            "none" => EvictionSettings::None,
            "lru" => match ac_file.max_entries {
                Some(max_entries) if max_entries > 0 => EvictionSettings::Lru { max_entries },
                _ => bail!("audio_cache.eviction = \"lru\" requires max_entries > 0"),
            },
            "ttl" => match ac_file.ttl_secs {
                Some(ttl_secs) if ttl_secs > 0 => EvictionSettings::Ttl {
                    ttl: Duration::from_secs(ttl_secs),
                },
                _ => bail!("audio_cache.eviction = \"ttl\" requires ttl_secs > 0"),
            },
            other => bail!("Unknown audio_cache.eviction: {}", other),
        };

        // Provider settings
        let providers_file = file.providers.unwrap_or_default();
        let extractor = match providers_file.extractor.as_deref().unwrap_or("deezer_preview") {
            "deezer_preview" => ExtractorSettings::DeezerPreview,
            "url_template" => match providers_file.url_template {
                Some(template) if template.contains("{id}") => {
                    ExtractorSettings::UrlTemplate { template }
                }
                _ => bail!(
                    "providers.extractor = \"url_template\" requires a url_template containing {{id}}"
                ),
            },
            other => bail!("Unknown providers.extractor: {}", other),
        };

        Ok(Self {
            port,
            metrics_port,
            logging_level,
            content_cache_age_sec,
            frontend_dir_path,
            search_url,
            classifier_url,
            classifier_timeout_sec,
            fallback_catalog_path,
            recommender,
            audio_cache,
            eviction,
            extractor,
        })
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
