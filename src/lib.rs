//! Moodplayer Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod audio_cache;
pub mod config;
pub mod mood;
pub mod providers;
pub mod recommender;
pub mod server;

// Re-export commonly used types for convenience
pub use audio_cache::{AudioCache, AudioCacheSettings, AudioResource};
pub use mood::{Mood, MoodReading};
pub use recommender::{RecommendationSelector, RecommenderSettings, Selection, SelectionSource};
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerConfig, ServerState};
