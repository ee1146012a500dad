//! Detection capabilities consumed by the analysis pipeline.
//!
//! Concrete models live behind these traits so the pipeline can run against
//! a remote vision service, an in-process ONNX model, or test fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MediaResult;
use crate::frame::Frame;

/// Bounding box in normalized coordinates [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One labelled object found in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    /// Detection confidence [0, 1]
    pub confidence: f32,
    #[serde(default)]
    pub region: Region,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
            region: Region::default(),
        }
    }
}

/// Emotion scores for one detected face, in the order the model reported them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceEmotions {
    pub scores: Vec<(String, f32)>,
}

impl FaceEmotions {
    pub fn new<L: Into<String>>(scores: impl IntoIterator<Item = (L, f32)>) -> Self {
        Self {
            scores: scores
                .into_iter()
                .map(|(label, score)| (label.into(), score))
                .collect(),
        }
    }

    /// Highest scoring emotion; the first one listed wins a tie.
    pub fn top(&self) -> Option<(&str, f32)> {
        let mut best: Option<(&str, f32)> = None;
        for (label, score) in &self.scores {
            match best {
                Some((_, best_score)) if *score <= best_score => {}
                _ => best = Some((label.as_str(), *score)),
            }
        }
        best
    }
}

/// Object detection capability: `frame -> detections`.
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    async fn detect_objects(&self, frame: &Frame) -> MediaResult<Vec<Detection>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

/// Facial emotion capability: `frame -> one score map per face`.
#[async_trait]
pub trait EmotionDetector: Send + Sync {
    async fn detect_emotions(&self, frame: &Frame) -> MediaResult<Vec<FaceEmotions>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}
