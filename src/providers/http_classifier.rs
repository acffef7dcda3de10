//! Client for an external facial-emotion classification service.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::errors::ClassificationError;
use super::traits::MoodClassifier;
use crate::mood::{Mood, MoodReading};

#[derive(Deserialize)]
struct ClassifierResponse {
    mood: Option<String>,
    confidence: Option<f64>,
    error: Option<String>,
}

fn parse_classifier_body(body: &str) -> Result<MoodReading, ClassificationError> {
    let response: ClassifierResponse = serde_json::from_str(body)
        .map_err(|e| ClassificationError::Provider(format!("invalid response: {}", e)))?;

    if let Some(error) = response.error {
        return Err(ClassificationError::Provider(error));
    }

    match response.mood.filter(|m| !m.trim().is_empty()) {
        Some(label) => Ok(MoodReading::new(
            Mood::parse(&label),
            response.confidence.unwrap_or(0.0),
        )),
        // No face in the frame.
        None => Ok(MoodReading::no_face()),
    }
}

/// Posts raw image bytes to `url` and reads back `{"mood", "confidence"}`.
pub struct HttpMoodClassifier {
    client: Client,
    url: String,
}

impl HttpMoodClassifier {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl MoodClassifier for HttpMoodClassifier {
    fn id(&self) -> &str {
        "http"
    }

    async fn classify(&self, image: &[u8]) -> Result<MoodReading, ClassificationError> {
        if image.is_empty() {
            return Err(ClassificationError::InvalidImage("empty image".to_string()));
        }

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status == reqwest::StatusCode::BAD_REQUEST
            || status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
        {
            return Err(ClassificationError::InvalidImage(body));
        }
        if !status.is_success() {
            return Err(ClassificationError::Provider(format!(
                "classifier responded with status {}",
                status
            )));
        }

        parse_classifier_body(&body)
    }
}
