//! Analysis results and the status snapshot served to pollers.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::emotion::NEUTRAL_EMOTION;
use crate::job::JobId;
use crate::stage::StageStatuses;

/// Per-label detection statistics over the whole sampled sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectSummary {
    pub label: String,
    /// Number of retained detections (always >= 1)
    pub count: u32,
    /// Mean of the retained confidences, rounded to 3 decimals
    pub avg_confidence: f64,
}

impl ObjectSummary {
    /// Build a summary from the confidences retained for one label.
    ///
    /// Returns `None` for an empty list.
    pub fn from_confidences(label: impl Into<String>, confidences: &[f32]) -> Option<Self> {
        if confidences.is_empty() {
            return None;
        }
        let sum: f64 = confidences.iter().map(|c| f64::from(*c)).sum();
        let mean = sum / confidences.len() as f64;
        Some(Self {
            label: label.into(),
            count: confidences.len() as u32,
            avg_confidence: round3(mean),
        })
    }
}

/// Round to 3 decimals, halves to even.
fn round3(value: f64) -> f64 {
    (value * 1000.0).round_ties_even() / 1000.0
}

/// A track suggestion from the music search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RecommendedSong {
    pub track_name: String,
    pub artist: String,
    pub url: String,
}

impl RecommendedSong {
    /// Fallback sentinel used whenever the lookup is unavailable or fails.
    pub fn unknown() -> Self {
        Self {
            track_name: "Unknown".to_string(),
            artist: "Unknown".to_string(),
            url: "#".to_string(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::unknown()
    }
}

impl Default for RecommendedSong {
    fn default() -> Self {
        Self::unknown()
    }
}

/// The result bag of the current job.
///
/// Defaults are the values served before any stage has produced output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    /// Distinct detected labels
    pub detected_objects: Vec<String>,
    /// Per-label counts and mean confidence
    pub object_summaries: Vec<ObjectSummary>,
    pub dominant_emotion: String,
    pub recommended_song: RecommendedSong,
    pub generated_story: String,
    /// Set when the run ended with a stage-fatal error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for AnalysisResult {
    fn default() -> Self {
        Self {
            detected_objects: Vec::new(),
            object_summaries: Vec::new(),
            dominant_emotion: NEUTRAL_EMOTION.to_string(),
            recommended_song: RecommendedSong::unknown(),
            generated_story: String::new(),
            error: None,
        }
    }
}

/// Immutable read of the job state, served by `GET /status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StatusSnapshot {
    /// Current job, `None` before the first upload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub status: StageStatuses,
    pub result: AnalysisResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    /// Snapshot of a process that has not received an upload yet.
    pub fn idle() -> Self {
        Self {
            job_id: None,
            status: StageStatuses::default(),
            result: AnalysisResult::default(),
            started_at: None,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_mean() {
        let summary = ObjectSummary::from_confidences("cup", &[0.4, 0.6]).unwrap();
        assert_eq!(summary.label, "cup");
        assert_eq!(summary.count, 2);
        assert!((summary.avg_confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_summary_rounds_to_three_decimals() {
        let summary = ObjectSummary::from_confidences("dog", &[0.5, 0.6, 0.7, 0.8001]).unwrap();
        assert!((summary.avg_confidence - 0.65).abs() < 1e-9);

        let summary = ObjectSummary::from_confidences("cat", &[0.3333, 0.3334, 0.9]).unwrap();
        assert!((summary.avg_confidence - 0.522).abs() < 1e-9);
    }

    #[test]
    fn test_summary_rounds_halves_to_even() {
        // mean 0.5625 sits exactly on the half
        let summary = ObjectSummary::from_confidences("cup", &[0.5, 0.625]).unwrap();
        assert_eq!(summary.avg_confidence, 0.562);

        let summary = ObjectSummary::from_confidences("dog", &[0.25, 0.375]).unwrap();
        assert_eq!(summary.avg_confidence, 0.312);

        // 187.5 goes up to the even neighbour
        let summary = ObjectSummary::from_confidences("cat", &[0.125, 0.25]).unwrap();
        assert_eq!(summary.avg_confidence, 0.188);
    }

    #[test]
    fn test_summary_empty() {
        assert!(ObjectSummary::from_confidences("cup", &[]).is_none());
    }

    #[test]
    fn test_default_result_sentinels() {
        let json = serde_json::to_value(AnalysisResult::default()).unwrap();
        assert_eq!(json["detected_objects"], serde_json::json!([]));
        assert_eq!(json["dominant_emotion"], "neutral");
        assert_eq!(json["recommended_song"]["track_name"], "Unknown");
        assert_eq!(json["recommended_song"]["artist"], "Unknown");
        assert_eq!(json["recommended_song"]["url"], "#");
        assert_eq!(json["generated_story"], "");
        assert!(json.get("error").is_none());
    }
}
