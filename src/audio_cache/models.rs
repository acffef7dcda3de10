use serde::Serialize;
use std::path::PathBuf;

/// A playable audio resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudioResource {
    /// Streamable directly from the upstream URL.
    Remote { url: String },
    /// A complete file inside the cache directory.
    LocalFile {
        path: PathBuf,
        size_bytes: u64,
        content_type: String,
    },
}

impl AudioResource {
    pub fn local_path(&self) -> Option<&PathBuf> {
        match self {
            AudioResource::LocalFile { path, .. } => Some(path),
            AudioResource::Remote { .. } => None,
        }
    }
}

/// Resolution state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    Pending,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub ready: usize,
    pub pending: usize,
    pub failed: usize,
    pub hits: u64,
    pub misses: u64,
    pub extractions: u64,
    pub failures: u64,
    pub evictions: u64,
}

const AUDIO_EXTENSIONS: &[(&str, &str)] = &[
    ("audio/mpeg", "mp3"),
    ("audio/mp3", "mp3"),
    ("audio/mp4", "m4a"),
    ("audio/x-m4a", "m4a"),
    ("audio/aac", "aac"),
    ("audio/ogg", "ogg"),
    ("audio/opus", "opus"),
    ("audio/webm", "webm"),
    ("audio/flac", "flac"),
    ("audio/x-flac", "flac"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
];

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// File extension for an audio content type.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    AUDIO_EXTENSIONS
        .iter()
        .find(|(ct, _)| ct.eq_ignore_ascii_case(mime))
        .map(|(_, ext)| *ext)
}

/// Content type for a cached file extension.
pub fn content_type_for(extension: &str) -> &'static str {
    AUDIO_EXTENSIONS
        .iter()
        .find(|(_, ext)| ext.eq_ignore_ascii_case(extension))
        .map(|(ct, _)| *ct)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}
