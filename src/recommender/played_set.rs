use std::collections::{HashMap, HashSet};

/// Per-mood memory of the track ids already served.
///
/// Not synchronised on its own; the selector keeps it behind a mutex so that
/// filter, reset and append happen in one critical section.
#[derive(Debug, Default)]
pub struct PlayedSet {
    by_mood: HashMap<String, HashSet<String>>,
}

impl PlayedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, mood: &str, track_id: &str) -> bool {
        self.by_mood
            .get(mood)
            .is_some_and(|played| played.contains(track_id))
    }

    pub fn mark_played<I, S>(&mut self, mood: &str, track_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.by_mood
            .entry(mood.to_string())
            .or_default()
            .extend(track_ids.into_iter().map(Into::into));
    }

    /// Forget everything served for `mood`.
    pub fn reset(&mut self, mood: &str) {
        self.by_mood.remove(mood);
    }

    pub fn len_for(&self, mood: &str) -> usize {
        self.by_mood.get(mood).map_or(0, HashSet::len)
    }
}
