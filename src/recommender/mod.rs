//! Recommendation selector: mood in, short non-repeating playlist out.

mod fallback_catalog;
mod played_set;
mod query_table;
mod selector;

pub use crate::providers::TrackRef;
pub use fallback_catalog::FallbackCatalog;
pub use played_set::PlayedSet;
pub use query_table::{QueryTable, GENERIC_QUERY};
pub use selector::{
    RecommendationSelector, RecommenderSettings, Selection, SelectionSource,
    DEFAULT_SECONDARY_QUERY,
};
