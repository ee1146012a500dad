//! Analysis stages and their status machine.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four sequential phases of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    ObjectDetection,
    EmotionAnalysis,
    MusicRecommendation,
    StoryGeneration,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 4] = [
        Stage::ObjectDetection,
        Stage::EmotionAnalysis,
        Stage::MusicRecommendation,
        Stage::StoryGeneration,
    ];

    /// Wire name used in the status map.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ObjectDetection => "objectDetection",
            Stage::EmotionAnalysis => "emotionAnalysis",
            Stage::MusicRecommendation => "musicRecommendation",
            Stage::StoryGeneration => "storyGeneration",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not started yet
    #[default]
    Pending,
    /// Work in progress
    Processing,
    /// Finished (per-item failures inside the stage do not count)
    Completed,
    /// The run ended with a stage-fatal error before this stage completed
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Processing => "processing",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed)
    }

    /// Whether moving from `self` to `next` keeps the status monotonic.
    ///
    /// Allowed: `pending -> processing -> completed`, and `pending|processing -> failed`.
    pub fn can_transition_to(&self, next: StageStatus) -> bool {
        matches!(
            (self, next),
            (StageStatus::Pending, StageStatus::Processing)
                | (StageStatus::Processing, StageStatus::Completed)
                | (StageStatus::Pending, StageStatus::Failed)
                | (StageStatus::Processing, StageStatus::Failed)
        )
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of every stage, serialized as the `status` map of `/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct StageStatuses {
    pub object_detection: StageStatus,
    pub emotion_analysis: StageStatus,
    pub music_recommendation: StageStatus,
    pub story_generation: StageStatus,
}

impl StageStatuses {
    pub fn get(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::ObjectDetection => self.object_detection,
            Stage::EmotionAnalysis => self.emotion_analysis,
            Stage::MusicRecommendation => self.music_recommendation,
            Stage::StoryGeneration => self.story_generation,
        }
    }

    fn slot(&mut self, stage: Stage) -> &mut StageStatus {
        match stage {
            Stage::ObjectDetection => &mut self.object_detection,
            Stage::EmotionAnalysis => &mut self.emotion_analysis,
            Stage::MusicRecommendation => &mut self.music_recommendation,
            Stage::StoryGeneration => &mut self.story_generation,
        }
    }

    /// Apply a transition if it is monotonic. Returns `false` when rejected.
    pub fn transition(&mut self, stage: Stage, next: StageStatus) -> bool {
        let slot = self.slot(stage);
        if !slot.can_transition_to(next) {
            return false;
        }
        *slot = next;
        true
    }

    /// Force every stage that has not completed to `failed`.
    ///
    /// Returns the stages that were flipped.
    pub fn fail_incomplete(&mut self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|stage| self.transition(*stage, StageStatus::Failed))
            .collect()
    }

    pub fn all_completed(&self) -> bool {
        Stage::ALL
            .iter()
            .all(|stage| self.get(*stage) == StageStatus::Completed)
    }

    pub fn is_finished(&self) -> bool {
        Stage::ALL.iter().all(|stage| self.get(*stage).is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_all_pending() {
        let statuses = StageStatuses::default();
        for stage in Stage::ALL {
            assert_eq!(statuses.get(stage), StageStatus::Pending);
        }
    }

    #[test]
    fn test_monotonic_transitions() {
        let mut statuses = StageStatuses::default();

        assert!(statuses.transition(Stage::ObjectDetection, StageStatus::Processing));
        assert!(statuses.transition(Stage::ObjectDetection, StageStatus::Completed));

        // No regressions
        assert!(!statuses.transition(Stage::ObjectDetection, StageStatus::Processing));
        assert!(!statuses.transition(Stage::ObjectDetection, StageStatus::Failed));
        assert!(!statuses.transition(Stage::ObjectDetection, StageStatus::Pending));

        // Cannot skip processing
        assert!(!statuses.transition(Stage::EmotionAnalysis, StageStatus::Completed));
        assert_eq!(statuses.get(Stage::ObjectDetection), StageStatus::Completed);
    }

    #[test]
    fn test_fail_incomplete_keeps_completed() {
        let mut statuses = StageStatuses::default();
        statuses.transition(Stage::ObjectDetection, StageStatus::Processing);
        statuses.transition(Stage::ObjectDetection, StageStatus::Completed);
        statuses.transition(Stage::EmotionAnalysis, StageStatus::Processing);

        let flipped = statuses.fail_incomplete();

        assert_eq!(
            flipped,
            vec![
                Stage::EmotionAnalysis,
                Stage::MusicRecommendation,
                Stage::StoryGeneration
            ]
        );
        assert_eq!(statuses.get(Stage::ObjectDetection), StageStatus::Completed);
        assert!(statuses.is_finished());
        assert!(!statuses.all_completed());
    }

    #[test]
    fn test_serialized_keys() {
        let json = serde_json::to_value(StageStatuses::default()).unwrap();
        assert_eq!(json["objectDetection"], "pending");
        assert_eq!(json["emotionAnalysis"], "pending");
        assert_eq!(json["musicRecommendation"], "pending");
        assert_eq!(json["storyGeneration"], "pending");
    }
}
