use axum::extract::FromRef;
use chrono::{DateTime, Utc};

use crate::audio_cache::AudioCache;
use crate::providers::{CallPolicy, MoodClassifier};
use crate::recommender::RecommendationSelector;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedSelector = Arc<RecommendationSelector>;
pub type OptionalClassifier = Option<Arc<dyn MoodClassifier>>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
    pub selector: GuardedSelector,
    pub audio_cache: AudioCache,
    pub classifier: OptionalClassifier,
    pub classifier_policy: CallPolicy,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        selector: GuardedSelector,
        audio_cache: AudioCache,
        classifier: OptionalClassifier,
        classifier_policy: CallPolicy,
    ) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            started_at: Utc::now(),
            selector,
            audio_cache,
            classifier,
            classifier_policy,
        }
    }
}

impl FromRef<ServerState> for GuardedSelector {
    fn from_ref(input: &ServerState) -> Self {
        input.selector.clone()
    }
}

impl FromRef<ServerState> for AudioCache {
    fn from_ref(input: &ServerState) -> Self {
        input.audio_cache.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
