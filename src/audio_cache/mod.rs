//! Audio resolution cache: track id in, playable audio out.

mod cache;
mod eviction;
mod identifier;
mod models;

pub use cache::{AudioCache, AudioCacheSettings};
pub use eviction::{EntryMeta, EvictionPolicy, LruEviction, NoEviction, TtlEviction};
pub use identifier::{extract_identifier, is_valid_identifier};
pub use models::{AudioResource, CacheStats, EntryState};
