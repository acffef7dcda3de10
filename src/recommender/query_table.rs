use std::collections::HashMap;

use crate::mood::Mood;

/// Query used for moods that have no entry of their own.
pub const GENERIC_QUERY: &str = "hindi songs";

const DEFAULT_QUERIES: &[(&str, &str)] = &[
    ("happy", "latest happy hindi songs"),
    ("sad", "sad hindi songs"),
    ("neutral", "relaxing hindi songs"),
    ("angry", "motivational hindi songs"),
    ("fear", "calm soothing hindi songs"),
    ("surprise", "party hindi songs"),
];

/// Maps a mood to the free-text query sent to the search provider.
#[derive(Debug, Clone)]
pub struct QueryTable {
    queries: HashMap<String, String>,
    generic: String,
}

impl QueryTable {
    /// Built-in table with `overrides` applied on top. Override keys are mood
    /// labels and are matched case-insensitively.
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let mut table = Self::default();
        for (mood, query) in overrides {
            let query = query.trim();
            if query.is_empty() {
                continue;
            }
            table
                .queries
                .insert(Mood::parse(mood).as_str().to_string(), query.to_string());
        }
        table
    }

    pub fn query_for(&self, mood: &Mood) -> &str {
        self.queries
            .get(mood.as_str())
            .map(String::as_str)
            .unwrap_or(&self.generic)
    }
}

impl Default for QueryTable {
    fn default() -> Self {
        Self {
            queries: DEFAULT_QUERIES
                .iter()
                .map(|(mood, query)| (mood.to_string(), query.to_string()))
                .collect(),
            generic: GENERIC_QUERY.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_queries() {
        let table = QueryTable::default();
        assert_eq!(table.query_for(&Mood::Happy), "latest happy hindi songs");
        assert_eq!(table.query_for(&Mood::Fear), "calm soothing hindi songs");
        assert_eq!(table.query_for(&Mood::Disgust), GENERIC_QUERY);
        assert_eq!(table.query_for(&Mood::parse("bored")), GENERIC_QUERY);
    }

    #[test]
    fn test_overrides() {
        let overrides = HashMap::from([
            ("Happy".to_string(), "bollywood dance".to_string()),
            ("disgust".to_string(), "punk rock".to_string()),
            ("sad".to_string(), "   ".to_string()),
        ]);
        let table = QueryTable::with_overrides(&overrides);

        assert_eq!(table.query_for(&Mood::Happy), "bollywood dance");
        assert_eq!(table.query_for(&Mood::Disgust), "punk rock");
        assert_eq!(table.query_for(&Mood::Sad), "sad hindi songs");
    }
}
