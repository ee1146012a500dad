//! Vision service request/response types.

use serde::{Deserialize, Serialize};

use mood_media::{Detection, FaceEmotions};

/// Response of `POST /detect/objects`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectObjectsResponse {
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// One emotion score. Scores are a list so the model's ordering survives
/// transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionScore {
    pub label: String,
    pub score: f32,
}

/// Emotion scores of one detected face.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceScores {
    #[serde(default)]
    pub emotions: Vec<EmotionScore>,
}

impl From<FaceScores> for FaceEmotions {
    fn from(face: FaceScores) -> Self {
        FaceEmotions::new(face.emotions.into_iter().map(|e| (e.label, e.score)))
    }
}

/// Response of `POST /detect/emotions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectEmotionsResponse {
    #[serde(default)]
    pub faces: Vec<FaceScores>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: Option<String>,
}
