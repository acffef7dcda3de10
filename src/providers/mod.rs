//! External capabilities: music search, audio extraction, mood classification.
//!
//! The core only depends on the traits in this module. Concrete providers
//! talk HTTP and are wired up in `main`.

mod call_policy;
mod deezer;
mod errors;
mod http_classifier;
mod models;
mod traits;
mod url_template;

pub use call_policy::CallPolicy;
pub use deezer::{DeezerPreviewExtractor, DeezerSearchProvider, DEEZER_API_BASE};
pub use errors::{CapabilityError, ClassificationError, ExtractionError, SearchError};
pub use http_classifier::HttpMoodClassifier;
pub use models::*;
pub use traits::{AudioExtractor, MoodClassifier, SearchProvider};
pub use url_template::UrlTemplateExtractor;
