//! Extractor that maps a track id straight to a streamable URL.

use async_trait::async_trait;

use super::errors::ExtractionError;
use super::models::ExtractedAudio;
use super::traits::AudioExtractor;
use crate::audio_cache::is_valid_identifier;

const ID_PLACEHOLDER: &str = "{id}";

/// Substitutes the track id into a URL template, e.g.
/// `https://www.youtube.com/watch?v={id}`.
///
/// No network traffic: the resulting URL is handed to the client as-is.
pub struct UrlTemplateExtractor {
    template: String,
}

impl UrlTemplateExtractor {
    pub fn new(template: &str) -> anyhow::Result<Self> {
        if !template.contains(ID_PLACEHOLDER) {
            anyhow::bail!(
                "URL template '{}' must contain the {} placeholder",
                template,
                ID_PLACEHOLDER
            );
        }
        Ok(Self {
            template: template.to_string(),
        })
    }

    pub fn url_for(&self, track_id: &str) -> Option<String> {
        if !is_valid_identifier(track_id) {
            return None;
        }
        Some(self.template.replace(ID_PLACEHOLDER, track_id))
    }
}

#[async_trait]
impl AudioExtractor for UrlTemplateExtractor {
    fn id(&self) -> &str {
        "url_template"
    }

    async fn extract(&self, track_id: &str) -> Result<ExtractedAudio, ExtractionError> {
        self.url_for(track_id)
            .map(|url| ExtractedAudio::Remote { url })
            .ok_or_else(|| ExtractionError::NotFound(track_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_requires_placeholder() {
        assert!(UrlTemplateExtractor::new("https://example.com/watch").is_err());
    }

    #[tokio::test]
    async fn test_extract_substitutes_id() {
        let extractor = UrlTemplateExtractor::new("https://www.youtube.com/watch?v={id}").unwrap();

        match extractor.extract("HhesaQXLuRY").await.unwrap() {
            ExtractedAudio::Remote { url } => {
                assert_eq!(url, "https://www.youtube.com/watch?v=HhesaQXLuRY")
            }
            other => panic!("unexpected extraction: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_extract_rejects_invalid_ids() {
        let extractor = UrlTemplateExtractor::new("https://cdn.example/{id}.mp3").unwrap();
        let result = extractor.extract("../../etc/passwd").await;
        assert!(matches!(result, Err(ExtractionError::NotFound(_))));
    }
}
