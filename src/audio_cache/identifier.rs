//! Track identifier extraction from user-supplied source URLs.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref BARE_ID: Regex = Regex::new(r"^[A-Za-z0-9_-]{3,64}$").unwrap();
    static ref URL_PATTERNS: Vec<Regex> = vec![
        // youtube.com/watch?v=ID, music.youtube.com/watch?v=ID, m.youtube.com/...
        Regex::new(
            r"(?i)^(?:https?://)?(?:www\.|m\.|music\.)?youtube\.com/watch\?(?:[^#]*&)?v=([A-Za-z0-9_-]{3,64})"
        )
        .unwrap(),
        Regex::new(r"(?i)^(?:https?://)?youtu\.be/([A-Za-z0-9_-]{3,64})").unwrap(),
        Regex::new(
            r"(?i)^(?:https?://)?(?:www\.|m\.|music\.)?youtube\.com/(?:embed|shorts|v)/([A-Za-z0-9_-]{3,64})"
        )
        .unwrap(),
        // deezer.com/track/ID, deezer.com/en/track/ID
        Regex::new(
            r"(?i)^(?:https?://)?(?:www\.)?deezer\.com/(?:[a-z]{2}(?:-[a-z]{2})?/)?track/([0-9]+)"
        )
        .unwrap(),
    ];
}

/// Whether `id` is usable as a cache key as-is.
pub fn is_valid_identifier(id: &str) -> bool {
    BARE_ID.is_match(id)
}

/// Extract the track identifier from a source URL, or accept a bare identifier.
///
/// Returns `None` for anything that is neither a recognised track URL nor a
/// bare identifier.
pub fn extract_identifier(source: &str) -> Option<String> {
    let source = source.trim();
    if is_valid_identifier(source) {
        return Some(source.to_string());
    }

    URL_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(source))
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
}
