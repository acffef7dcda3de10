//! Mood labels produced by the facial-emotion classifier.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Discrete emotion label driving recommendation queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Mood {
    Happy,
    Sad,
    #[default]
    Neutral,
    Angry,
    Fear,
    Surprise,
    Disgust,
    /// A label the classifier emitted that we have no dedicated handling for.
    Other(String),
}

impl Mood {
    pub fn parse(label: &str) -> Mood {
        let normalized = label.trim().to_lowercase();
        match normalized.as_str() {
            "happy" => Mood::Happy,
            "sad" => Mood::Sad,
            "neutral" | "" => Mood::Neutral,
            "angry" => Mood::Angry,
            "fear" => Mood::Fear,
            "surprise" => Mood::Surprise,
            "disgust" => Mood::Disgust,
            _ => Mood::Other(normalized),
        }
    }

    /// Normalised label, used as the key of per-mood state.
    pub fn as_str(&self) -> &str {
        match self {
            Mood::Happy => "happy",
            Mood::Sad => "sad",
            Mood::Neutral => "neutral",
            Mood::Angry => "angry",
            Mood::Fear => "fear",
            Mood::Surprise => "surprise",
            Mood::Disgust => "disgust",
            Mood::Other(label) => label,
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Mood {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Mood::parse(s))
    }
}

impl Serialize for Mood {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Mood {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Mood::parse(&label))
    }
}

/// A classifier verdict: the dominant mood and how sure the classifier is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodReading {
    pub mood: Mood,
    pub confidence: f64,
}

impl MoodReading {
    /// Confidence reported when no face could be found in the frame.
    pub const NO_FACE_CONFIDENCE: f64 = 0.5;

    pub fn new(mood: Mood, confidence: f64) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self { mood, confidence }
    }

    pub fn no_face() -> Self {
        Self::new(Mood::Neutral, Self::NO_FACE_CONFIDENCE)
    }
}
