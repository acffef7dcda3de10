//! Static, always-available song lists served when search is unavailable.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::audio_cache::extract_identifier;
use crate::mood::Mood;
use crate::providers::TrackRef;

const NEUTRAL: &str = "neutral";

/// (mood, title, artist, url)
const BUILT_IN: &[(&str, &str, &str, &str)] = &[
    (
        "happy",
        "Apna Time Aayega",
        "Divine",
        "https://www.youtube.com/watch?v=HhesaQXLuRY",
    ),
    (
        "happy",
        "Ilahi",
        "Arijit Singh",
        "https://www.youtube.com/watch?v=JrHno2s33Mw",
    ),
    (
        "sad",
        "Channa Mereya",
        "Arijit Singh",
        "https://www.youtube.com/watch?v=284Ov7ysmfA",
    ),
    (
        "sad",
        "Tujhe Bhula Diya",
        "Mohit Chauhan",
        "https://www.youtube.com/watch?v=F1DrsR4IuOY",
    ),
    (
        "neutral",
        "Raabta",
        "Arijit Singh",
        "https://www.youtube.com/watch?v=O8lRQDwMChw",
    ),
    (
        "neutral",
        "Ilahi",
        "Arijit Singh",
        "https://www.youtube.com/watch?v=JrHno2s33Mw",
    ),
];

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    mood: Vec<CatalogFileMood>,
}

#[derive(Debug, Deserialize)]
struct CatalogFileMood {
    name: String,
    #[serde(default)]
    tracks: Vec<CatalogFileTrack>,
}

#[derive(Debug, Deserialize)]
struct CatalogFileTrack {
    title: String,
    artist: String,
    url: String,
    thumbnail_url: Option<String>,
}

/// Read-only mapping from mood to known-good tracks.
///
/// Every catalog has a non-empty `neutral` list; moods without a list of their
/// own are served from it.
#[derive(Debug, Clone)]
pub struct FallbackCatalog {
    by_mood: HashMap<String, Vec<TrackRef>>,
}

impl FallbackCatalog {
    pub fn built_in() -> Self {
        let mut by_mood: HashMap<String, Vec<TrackRef>> = HashMap::new();
        for (mood, title, artist, url) in BUILT_IN {
            let Some(id) = extract_identifier(url) else {
                warn!("Skipping built-in fallback track with unusable url '{}'", url);
                continue;
            };
            by_mood
                .entry(mood.to_string())
                .or_default()
                .push(TrackRef::new(id, *title, *artist).with_stream_url(Some(url.to_string())));
        }
        Self { by_mood }
    }

    /// Load a catalog from a TOML file. The file replaces the built-in lists.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fallback catalog {:?}", path))?;
        let catalog = Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid fallback catalog {:?}", path))?;
        info!(
            "Loaded fallback catalog from {:?} ({} moods)",
            path,
            catalog.by_mood.len()
        );
        Ok(catalog)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(contents)?;

        let mut by_mood: HashMap<String, Vec<TrackRef>> = HashMap::new();
        for entry in file.mood {
            let key = Mood::parse(&entry.name).as_str().to_string();
            if entry.tracks.is_empty() {
                bail!("Mood '{}' has no tracks", key);
            }
            let tracks = by_mood.entry(key).or_default();
            for track in entry.tracks {
                let Some(id) = extract_identifier(&track.url) else {
                    bail!("Cannot extract a track identifier from '{}'", track.url);
                };
                tracks.push(
                    TrackRef::new(id, track.title, track.artist)
                        .with_thumbnail(track.thumbnail_url)
                        .with_stream_url(Some(track.url)),
                );
            }
        }

        if by_mood.get(NEUTRAL).map_or(true, Vec::is_empty) {
            bail!("Fallback catalog must define a non-empty '{}' list", NEUTRAL);
        }

        Ok(Self { by_mood })
    }

    /// Tracks for `mood`, or the neutral list when `mood` has none.
    pub fn tracks_for(&self, mood: &Mood) -> &[TrackRef] {
        self.by_mood
            .get(mood.as_str())
            .or_else(|| self.by_mood.get(NEUTRAL))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn moods(&self) -> impl Iterator<Item = &str> {
        self.by_mood.keys().map(String::as_str)
    }
}

impl Default for FallbackCatalog {
    fn default() -> Self {
        Self::built_in()
    }
}
