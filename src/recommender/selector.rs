//! Mood to playlist selection with no-repeat-until-exhausted semantics.

use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::fallback_catalog::FallbackCatalog;
use super::played_set::PlayedSet;
use super::query_table::QueryTable;
use crate::mood::Mood;
use crate::providers::{CallPolicy, SearchError, SearchProvider, TrackRef};
use crate::server::metrics;

pub const DEFAULT_SECONDARY_QUERY: &str = "top hindi songs";

/// Where the tracks of a [`Selection`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionSource {
    Search,
    Fallback,
}

impl SelectionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionSource::Search => "search",
            SelectionSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub mood: Mood,
    pub source: SelectionSource,
    pub tracks: Vec<TrackRef>,
}

#[derive(Debug, Clone)]
pub struct RecommenderSettings {
    pub default_count: usize,
    pub max_count: usize,
    /// Search limit is `desired_count * overfetch_factor`, never below 2x.
    pub overfetch_factor: usize,
    /// Tried once when the mood's own query yields nothing usable.
    pub secondary_query: Option<String>,
    /// Per-mood query overrides, keyed by mood label.
    pub queries: HashMap<String, String>,
    pub search_policy: CallPolicy,
}

impl Default for RecommenderSettings {
    fn default() -> Self {
        Self {
            default_count: 5,
            max_count: 20,
            overfetch_factor: 2,
            secondary_query: Some(DEFAULT_SECONDARY_QUERY.to_string()),
            queries: HashMap::new(),
            search_policy: CallPolicy::new(std::time::Duration::from_secs(10), 1),
        }
    }
}

/// Why a selection was served from the fallback catalog.
enum Downgrade {
    SearchFailed(SearchError),
    NoCandidates,
}

impl std::fmt::Display for Downgrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Downgrade::SearchFailed(e) => write!(f, "{}", e),
            Downgrade::NoCandidates => write!(f, "no usable candidates"),
        }
    }
}

/// Produces bounded, non-repeating track lists for a mood.
///
/// Search failures never reach the caller: they are downgraded to the
/// fallback catalog, and in that case the played set is left untouched.
pub struct RecommendationSelector {
    search: Arc<dyn SearchProvider>,
    catalog: Arc<FallbackCatalog>,
    queries: QueryTable,
    played: Mutex<PlayedSet>,
    settings: RecommenderSettings,
}

impl RecommendationSelector {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        catalog: Arc<FallbackCatalog>,
        settings: RecommenderSettings,
    ) -> Self {
        Self {
            search,
            catalog,
            queries: QueryTable::with_overrides(&settings.queries),
            played: Mutex::new(PlayedSet::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &RecommenderSettings {
        &self.settings
    }

    /// Select up to `desired_count` tracks for `mood`.
    pub async fn select(&self, mood: &Mood, desired_count: usize) -> Selection {
        let desired = desired_count.min(self.settings.max_count);
        if desired == 0 {
            return Selection {
                mood: mood.clone(),
                source: SelectionSource::Search,
                tracks: Vec::new(),
            };
        }

        let limit = desired * self.settings.overfetch_factor.max(2);
        let selection = match self.find_candidates(mood, limit).await {
            Ok(candidates) => Selection {
                mood: mood.clone(),
                source: SelectionSource::Search,
                tracks: self.pick_unplayed(mood, candidates, desired).await,
            },
            Err(downgrade) => {
                warn!(
                    "Serving fallback songs for mood '{}': {}",
                    mood, downgrade
                );
                self.fallback(mood, desired)
            }
        };

        info!(
            "Selected {} songs for mood '{}' from {}",
            selection.tracks.len(),
            mood,
            selection.source.as_str()
        );
        metrics::record_recommendation(selection.source.as_str());
        selection
    }

    fn fallback(&self, mood: &Mood, desired: usize) -> Selection {
        let tracks = self
            .catalog
            .tracks_for(mood)
            .iter()
            .take(desired)
            .cloned()
            .collect();
        Selection {
            mood: mood.clone(),
            source: SelectionSource::Fallback,
            tracks,
        }
    }

    /// Usable candidates from the mood's query, then the secondary query.
    async fn find_candidates(&self, mood: &Mood, limit: usize) -> Result<Vec<TrackRef>, Downgrade> {
        let query = self.queries.query_for(mood);
        let candidates = self.search_usable(query, limit).await?;
        if !candidates.is_empty() {
            return Ok(candidates);
        }

        let Some(secondary) = self.settings.secondary_query.as_deref() else {
            return Err(Downgrade::NoCandidates);
        };
        debug!(
            "No usable results for '{}', trying secondary query '{}'",
            query, secondary
        );
        let candidates = self.search_usable(secondary, limit).await?;
        if candidates.is_empty() {
            return Err(Downgrade::NoCandidates);
        }
        Ok(candidates)
    }

    async fn search_usable(&self, query: &str, limit: usize) -> Result<Vec<TrackRef>, Downgrade> {
        let label = format!("search '{}'", query);
        let search = &self.search;
        self.settings
            .search_policy
            .call_or_else(
                &label,
                move || async move {
                    search
                        .search(query, limit)
                        .await
                        .map(|results| Ok(usable_candidates(results)))
                },
                |e| Err(Downgrade::SearchFailed(e)),
            )
            .await
    }

    /// Filter out played tracks, shuffle, take `desired` and remember them.
    ///
    /// Runs entirely under the played-set lock so concurrent selections for
    /// the same mood never hand out the same track twice.
    async fn pick_unplayed(
        &self,
        mood: &Mood,
        candidates: Vec<TrackRef>,
        desired: usize,
    ) -> Vec<TrackRef> {
        let key = mood.as_str();
        let mut played = self.played.lock().await;

        let mut fresh: Vec<TrackRef> = candidates
            .iter()
            .filter(|track| !played.contains(key, &track.id))
            .cloned()
            .collect();

        if fresh.is_empty() {
            debug!(
                "All {} candidates for mood '{}' already played, resetting",
                candidates.len(),
                mood
            );
            played.reset(key);
            fresh = candidates;
        }

        shuffle_and_truncate(&mut fresh, desired);
        played.mark_played(key, fresh.iter().map(|track| track.id.clone()));
        fresh
    }
}

/// Drop refs without an identifier and collapse duplicates, keeping the first.
fn usable_candidates(results: Vec<TrackRef>) -> Vec<TrackRef> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|track| track.has_identifier())
        .filter(|track| seen.insert(track.id.clone()))
        .collect()
}

fn shuffle_and_truncate(tracks: &mut Vec<TrackRef>, len: usize) {
    let mut rng = rand::rng();
    tracks.shuffle(&mut rng);
    tracks.truncate(len);
}
