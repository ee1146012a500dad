//! Pipeline metrics.

use std::time::Duration;

use metrics::{counter, histogram};
use mood_models::Stage;

pub fn record_run_started() {
    counter!("mood_runs_started_total").increment(1);
}

pub fn record_run_completed(duration: Duration) {
    counter!("mood_runs_completed_total").increment(1);
    histogram!("mood_run_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_run_failed(stage: Option<Stage>) {
    let stage = stage.map(|s| s.as_str()).unwrap_or("unknown");
    counter!("mood_runs_failed_total", "stage" => stage).increment(1);
}

pub fn record_overlapping_run() {
    counter!("mood_overlapping_runs_total").increment(1);
}

pub fn record_stage_duration(stage: Stage, duration: Duration) {
    histogram!("mood_stage_duration_seconds", "stage" => stage.as_str())
        .record(duration.as_secs_f64());
}

pub fn record_frame_failure(stage: Stage, detector: &'static str) {
    counter!(
        "mood_frame_failures_total",
        "stage" => stage.as_str(),
        "detector" => detector
    )
    .increment(1);
}

pub fn record_frames_analyzed(stage: Stage, frames: usize) {
    counter!("mood_frames_analyzed_total", "stage" => stage.as_str()).increment(frames as u64);
}

pub fn record_enrichment_fallback(kind: &'static str) {
    counter!("mood_enrichment_fallbacks_total", "kind" => kind).increment(1);
}
