use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub content_cache_age_sec: Option<usize>,
    pub frontend_dir_path: Option<String>,
    pub cache_dir: Option<String>,
    pub search_url: Option<String>,
    pub classifier_url: Option<String>,
    pub search_timeout_sec: Option<u64>,
    pub extraction_timeout_sec: Option<u64>,
    pub classifier_timeout_sec: Option<u64>,
    pub fallback_catalog_path: Option<String>,

    // Feature configs
    pub recommender: Option<RecommenderConfig>,
    pub audio_cache: Option<AudioCacheConfig>,
    pub providers: Option<ProvidersConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RecommenderConfig {
    pub default_count: Option<usize>,
    pub max_count: Option<usize>,
    pub overfetch_factor: Option<usize>,
    /// Empty string disables the secondary query.
    pub secondary_query: Option<String>,
    pub search_retries: Option<u32>,
    /// Mood label -> search query
    pub queries: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AudioCacheConfig {
    pub max_concurrent_extractions: Option<usize>,
    /// "none", "lru" or "ttl"
    pub eviction: Option<String>,
    pub max_entries: Option<usize>,
    pub ttl_secs: Option<u64>,
    pub extraction_retries: Option<u32>,
    pub waiter_timeout_sec: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ProvidersConfig {
    /// "deezer_preview" or "url_template"
    pub extractor: Option<String>,
    pub url_template: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
