//! Pluggable eviction for ready cache entries.

use std::time::{Duration, Instant};

/// What an eviction policy gets to see about a ready entry.
#[derive(Debug, Clone)]
pub struct EntryMeta {
    pub track_id: String,
    pub inserted_at: Instant,
    pub last_access: Instant,
}

pub trait EvictionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether a ready entry must be treated as absent on lookup.
    fn is_expired(&self, _entry: &EntryMeta, _now: Instant) -> bool {
        false
    }

    /// Ids of the ready entries to drop after an insertion.
    fn select_victims(&self, ready: &[EntryMeta], now: Instant) -> Vec<String>;
}

/// Keep everything forever.
pub struct NoEviction;

impl EvictionPolicy for NoEviction {
    fn name(&self) -> &'static str {
        "none"
    }

    fn select_victims(&self, _ready: &[EntryMeta], _now: Instant) -> Vec<String> {
        Vec::new()
    }
}

/// Keep at most `max_entries` ready entries, dropping the least recently used.
pub struct LruEviction {
    pub max_entries: usize,
}

impl EvictionPolicy for LruEviction {
    fn name(&self) -> &'static str {
        "lru"
    }

    fn select_victims(&self, ready: &[EntryMeta], _now: Instant) -> Vec<String> {
        if ready.len() <= self.max_entries {
            return Vec::new();
        }
        let mut by_age: Vec<&EntryMeta> = ready.iter().collect();
        by_age.sort_by_key(|entry| (entry.last_access, entry.inserted_at));
        by_age
            .into_iter()
            .take(ready.len() - self.max_entries)
            .map(|entry| entry.track_id.clone())
            .collect()
    }
}

/// Drop entries older than `ttl`, measured from when they became ready.
pub struct TtlEviction {
    pub ttl: Duration,
}

impl EvictionPolicy for TtlEviction {
    fn name(&self) -> &'static str {
        "ttl"
    }

    fn is_expired(&self, entry: &EntryMeta, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted_at) >= self.ttl
    }

    fn select_victims(&self, ready: &[EntryMeta], now: Instant) -> Vec<String> {
        ready
            .iter()
            .filter(|entry| self.is_expired(entry, now))
            .map(|entry| entry.track_id.clone())
            .collect()
    }
}
