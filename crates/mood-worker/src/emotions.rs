//! Dominant emotion over a sampled frame sequence.

use std::sync::Arc;

use mood_media::{EmotionDetector, FrameSampler};
use mood_models::{Stage, NEUTRAL_EMOTION};
use tracing::{debug, warn};

use crate::error::WorkerResult;
use crate::metrics;

/// Vote counts per emotion label, kept in first-vote order.
///
/// The order is what breaks ties in [`EmotionTally::dominant`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmotionTally {
    votes: Vec<(String, u32)>,
}

impl EmotionTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vote(&mut self, label: &str) {
        match self.votes.iter_mut().find(|(l, _)| l == label) {
            Some((_, count)) => *count += 1,
            None => self.votes.push((label.to_string(), 1)),
        }
    }

    pub fn count(&self, label: &str) -> u32 {
        self.votes
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Label with the most votes; on equal counts the one voted for first.
    pub fn dominant(&self) -> Option<&str> {
        let mut best: Option<(&str, u32)> = None;
        for (label, count) in &self.votes {
            match best {
                Some((_, best_count)) if *count <= best_count => {}
                _ => best = Some((label.as_str(), *count)),
            }
        }
        best.map(|(label, _)| label)
    }

    /// [`dominant`](Self::dominant), or `"neutral"` for an empty tally.
    pub fn dominant_or_neutral(&self) -> String {
        self.dominant().unwrap_or(NEUTRAL_EMOTION).to_string()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.votes.iter().map(|(label, count)| (label.as_str(), *count))
    }
}

/// Votes each face's top emotion into an [`EmotionTally`].
pub struct EmotionAggregator {
    detector: Arc<dyn EmotionDetector>,
    threshold: f32,
}

impl EmotionAggregator {
    pub fn new(detector: Arc<dyn EmotionDetector>, threshold: f32) -> Self {
        Self {
            detector,
            threshold,
        }
    }

    /// Dominant emotion of the traversal, `"neutral"` when nothing voted.
    pub async fn aggregate(&self, frames: &mut FrameSampler) -> WorkerResult<String> {
        Ok(self.tally(frames).await?.dominant_or_neutral())
    }

    /// Tally one vote per face whose top score reaches the threshold.
    ///
    /// Failure policy matches [`ObjectAggregator`](crate::ObjectAggregator):
    /// per-frame detector errors are skipped, decode errors are returned.
    pub async fn tally(&self, frames: &mut FrameSampler) -> WorkerResult<EmotionTally> {
        let mut tally = EmotionTally::new();
        let mut analyzed = 0usize;

        while let Some(frame) = frames.next().await? {
            analyzed += 1;
            let faces = match self.detector.detect_emotions(&frame).await {
                Ok(faces) => faces,
                Err(e) => {
                    warn!(
                        detector = self.detector.name(),
                        frame_index = frame.index,
                        error = %e,
                        "Emotion detection failed for frame, skipping"
                    );
                    metrics::record_frame_failure(Stage::EmotionAnalysis, self.detector.name());
                    continue;
                }
            };

            for face in &faces {
                if let Some((label, score)) = face.top() {
                    if score >= self.threshold {
                        tally.vote(label);
                    }
                }
            }
        }

        metrics::record_frames_analyzed(Stage::EmotionAnalysis, analyzed);
        debug!(frames = analyzed, tally = ?tally, "Emotion aggregation finished");
        Ok(tally)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mood_media::testing::InMemoryDecoder;
    use mood_media::{FaceEmotions, Frame, MediaError, MediaResult, SamplingPolicy};
    use std::path::Path;

    /// Faces chosen by frame index.
    struct FacesByFrame(fn(u64) -> MediaResult<Vec<FaceEmotions>>);

    #[async_trait]
    impl EmotionDetector for FacesByFrame {
        async fn detect_emotions(&self, frame: &Frame) -> MediaResult<Vec<FaceEmotions>> {
            (self.0)(frame.index)
        }

        fn name(&self) -> &'static str {
            "faces-by-frame"
        }
    }

    async fn run(frames: u64, faces: fn(u64) -> MediaResult<Vec<FaceEmotions>>) -> EmotionTally {
        let decoder = InMemoryDecoder::new(Some(1.0), frames, 2, 2);
        let mut sampler =
            FrameSampler::open(&decoder, Path::new("clip.mp4"), SamplingPolicy::new(1.0, 60))
                .await;
        EmotionAggregator::new(Arc::new(FacesByFrame(faces)), 0.35)
            .tally(&mut sampler)
            .await
            .unwrap()
    }

    #[test]
    fn test_tally_majority() {
        let mut tally = EmotionTally::new();
        for label in ["happy", "sad", "happy", "happy"] {
            tally.vote(label);
        }
        assert_eq!(tally.count("happy"), 3);
        assert_eq!(tally.count("sad"), 1);
        assert_eq!(tally.dominant(), Some("happy"));
    }

    #[test]
    fn test_tally_tie_goes_to_first_voted() {
        let mut tally = EmotionTally::new();
        for label in ["sad", "happy", "happy", "sad"] {
            tally.vote(label);
        }
        assert_eq!(tally.dominant(), Some("sad"));
    }

    #[test]
    fn test_empty_tally_is_neutral() {
        assert_eq!(EmotionTally::new().dominant_or_neutral(), "neutral");
    }

    #[tokio::test]
    async fn test_votes_per_face() {
        let tally = run(4, |index| {
            Ok(match index {
                0 => vec![
                    FaceEmotions::new([("happy", 0.9), ("sad", 0.1)]),
                    FaceEmotions::new([("sad", 0.6), ("happy", 0.4)]),
                ],
                _ => vec![FaceEmotions::new([("happy", 0.7)])],
            })
        })
        .await;

        assert_eq!(tally.count("happy"), 4);
        assert_eq!(tally.count("sad"), 1);
        assert_eq!(tally.dominant_or_neutral(), "happy");
    }

    #[tokio::test]
    async fn test_weak_faces_do_not_vote() {
        let tally = run(3, |_| Ok(vec![FaceEmotions::new([("angry", 0.34), ("fear", 0.2)])])).await;
        assert!(tally.is_empty());
        assert_eq!(tally.dominant_or_neutral(), "neutral");
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive() {
        let tally = run(1, |_| Ok(vec![FaceEmotions::new([("surprise", 0.35)])])).await;
        assert_eq!(tally.dominant(), Some("surprise"));
    }

    #[tokio::test]
    async fn test_face_tie_uses_first_listed_emotion() {
        let tally = run(1, |_| {
            Ok(vec![FaceEmotions::new([("fear", 0.5), ("surprise", 0.5)])])
        })
        .await;
        assert_eq!(tally.dominant(), Some("fear"));
    }

    #[tokio::test]
    async fn test_frame_failures_are_skipped() {
        let tally = run(4, |index| {
            if index % 2 == 0 {
                Err(MediaError::detection_failed("no model"))
            } else {
                Ok(vec![FaceEmotions::new([("sad", 0.8)])])
            }
        })
        .await;
        assert_eq!(tally.count("sad"), 2);
    }

    #[tokio::test]
    async fn test_no_frames_is_neutral() {
        let mut sampler = FrameSampler::empty();
        let aggregator = EmotionAggregator::new(
            Arc::new(FacesByFrame(|_| Ok(vec![FaceEmotions::new([("happy", 1.0)])]))),
            0.35,
        );
        assert_eq!(aggregator.aggregate(&mut sampler).await.unwrap(), "neutral");
    }
}
