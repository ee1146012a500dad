//! Object aggregation over a sampled frame sequence.

use std::collections::HashMap;
use std::sync::Arc;

use mood_media::{FrameSampler, ObjectDetector};
use mood_models::{ObjectSummary, Stage};
use tracing::{debug, warn};

use crate::error::WorkerResult;
use crate::metrics;

/// Counts labelled detections above a confidence threshold.
pub struct ObjectAggregator {
    detector: Arc<dyn ObjectDetector>,
    threshold: f32,
}

impl ObjectAggregator {
    pub fn new(detector: Arc<dyn ObjectDetector>, threshold: f32) -> Self {
        Self {
            detector,
            threshold,
        }
    }

    /// Summarize every label seen at or above the threshold.
    ///
    /// A detector failure on one frame is logged and that frame skipped.
    /// Decode errors from the traversal end aggregation and are returned.
    /// Summaries come out in first-seen label order.
    pub async fn aggregate(&self, frames: &mut FrameSampler) -> WorkerResult<Vec<ObjectSummary>> {
        let mut order: Vec<String> = Vec::new();
        let mut confidences: HashMap<String, Vec<f32>> = HashMap::new();
        let mut analyzed = 0usize;

        while let Some(frame) = frames.next().await? {
            analyzed += 1;
            let detections = match self.detector.detect_objects(&frame).await {
                Ok(detections) => detections,
                Err(e) => {
                    warn!(
                        detector = self.detector.name(),
                        frame_index = frame.index,
                        error = %e,
                        "Object detection failed for frame, skipping"
                    );
                    metrics::record_frame_failure(Stage::ObjectDetection, self.detector.name());
                    continue;
                }
            };

            for detection in detections {
                // NaN never passes
                if !(detection.confidence >= self.threshold) {
                    continue;
                }
                match confidences.get_mut(&detection.label) {
                    Some(list) => list.push(detection.confidence),
                    None => {
                        order.push(detection.label.clone());
                        confidences.insert(detection.label, vec![detection.confidence]);
                    }
                }
            }
        }

        metrics::record_frames_analyzed(Stage::ObjectDetection, analyzed);

        let summaries: Vec<ObjectSummary> = order
            .into_iter()
            .filter_map(|label| {
                let list = confidences.remove(&label)?;
                ObjectSummary::from_confidences(label, &list)
            })
            .collect();

        debug!(
            frames = analyzed,
            labels = summaries.len(),
            "Object aggregation finished"
        );
        Ok(summaries)
    }
}
