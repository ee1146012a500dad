//! Shared job state read by pollers and written by the active run.
//!
//! Every write names the job it belongs to. Writes for any job other than
//! the current one are dropped, so a superseded run that is still executing
//! cannot touch the state of the run that replaced it. Readers get cloned
//! snapshots and never observe a half-applied update.

use chrono::{DateTime, Utc};
use mood_models::{AnalysisResult, JobId, Stage, StageStatus, StageStatuses, StatusSnapshot};
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug)]
struct JobState {
    job_id: Option<JobId>,
    statuses: StageStatuses,
    result: AnalysisResult,
    started_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            job_id: None,
            statuses: StageStatuses::default(),
            result: AnalysisResult::default(),
            started_at: None,
            updated_at: Utc::now(),
        }
    }
}

impl JobState {
    fn is_current(&self, job_id: &JobId) -> bool {
        self.job_id.as_ref() == Some(job_id)
    }
}

/// Process-wide job status and result bag.
#[derive(Debug, Default)]
pub struct StatusStore {
    state: RwLock<JobState>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `job_id` current: all stages pending, result bag cleared.
    pub async fn reset(&self, job_id: JobId) {
        let now = Utc::now();
        let mut state = self.state.write().await;
        *state = JobState {
            job_id: Some(job_id),
            statuses: StageStatuses::default(),
            result: AnalysisResult::default(),
            started_at: Some(now),
            updated_at: now,
        };
    }

    pub async fn current_job(&self) -> Option<JobId> {
        self.state.read().await.job_id.clone()
    }

    /// Move one stage of `job_id` to `next`.
    ///
    /// Returns `false` when the job is no longer current or the move would
    /// regress the stage.
    pub async fn transition(&self, job_id: &JobId, stage: Stage, next: StageStatus) -> bool {
        let mut state = self.state.write().await;
        if !state.is_current(job_id) {
            debug!(job_id = %job_id, stage = %stage, status = %next, "Dropping stale status write");
            return false;
        }

        let current = state.statuses.get(stage);
        if !state.statuses.transition(stage, next) {
            warn!(
                job_id = %job_id,
                stage = %stage,
                from = %current,
                to = %next,
                "Rejected non-monotonic status change"
            );
            return false;
        }
        state.updated_at = Utc::now();
        true
    }

    /// Apply `update` to the result bag of `job_id`.
    ///
    /// Returns `false` (without calling `update`) when the job is no longer
    /// current.
    pub async fn update_result<F>(&self, job_id: &JobId, update: F) -> bool
    where
        F: FnOnce(&mut AnalysisResult),
    {
        let mut state = self.state.write().await;
        if !state.is_current(job_id) {
            debug!(job_id = %job_id, "Dropping stale result write");
            return false;
        }
        update(&mut state.result);
        state.updated_at = Utc::now();
        true
    }

    /// End `job_id` with a stage-fatal error.
    ///
    /// Every stage not yet completed becomes `failed` and the error text is
    /// recorded. Results already written are kept. Returns the stages that
    /// were flipped.
    pub async fn fail(&self, job_id: &JobId, error: impl Into<String>) -> Vec<Stage> {
        let mut state = self.state.write().await;
        if !state.is_current(job_id) {
            debug!(job_id = %job_id, "Dropping stale failure");
            return Vec::new();
        }
        let failed = state.statuses.fail_incomplete();
        state.result.error = Some(error.into());
        state.updated_at = Utc::now();
        failed
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let state = self.state.read().await;
        StatusSnapshot {
            job_id: state.job_id.clone(),
            status: state.statuses,
            result: state.result.clone(),
            started_at: state.started_at,
            updated_at: state.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mood_models::RecommendedSong;

    #[tokio::test]
    async fn test_initial_snapshot_defaults() {
        let store = StatusStore::new();
        let snapshot = store.snapshot().await;

        assert_eq!(snapshot.job_id, None);
        assert_eq!(snapshot.status, StageStatuses::default());
        assert_eq!(snapshot.result.dominant_emotion, "neutral");
        assert!(snapshot.result.recommended_song.is_unknown());
        assert!(snapshot.result.detected_objects.is_empty());
        assert_eq!(snapshot.result.generated_story, "");
    }

    #[tokio::test]
    async fn test_reset_clears_previous_run() {
        let store = StatusStore::new();
        let first = JobId::new();
        store.reset(first.clone()).await;
        store
            .transition(&first, Stage::ObjectDetection, StageStatus::Processing)
            .await;
        store
            .update_result(&first, |r| {
                r.detected_objects = vec!["cup".to_string()];
                r.error = Some("boom".to_string());
            })
            .await;

        let second = JobId::new();
        store.reset(second.clone()).await;
        let snapshot = store.snapshot().await;

        assert_eq!(snapshot.job_id, Some(second));
        assert_eq!(snapshot.status, StageStatuses::default());
        assert_eq!(snapshot.result, AnalysisResult::default());
        assert!(snapshot.started_at.is_some());
    }

    #[tokio::test]
    async fn test_stale_writes_are_dropped() {
        let store = StatusStore::new();
        let old = JobId::new();
        let new = JobId::new();
        store.reset(old.clone()).await;
        store.reset(new.clone()).await;

        assert!(
            !store
                .transition(&old, Stage::ObjectDetection, StageStatus::Processing)
                .await
        );
        assert!(
            !store
                .update_result(&old, |r| r.recommended_song = RecommendedSong::default())
                .await
        );
        assert!(store.fail(&old, "old run died").await.is_empty());

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.status.object_detection, StageStatus::Pending);
        assert_eq!(snapshot.result.error, None);
    }

    #[tokio::test]
    async fn test_statuses_never_regress() {
        let store = StatusStore::new();
        let job = JobId::new();
        store.reset(job.clone()).await;

        assert!(store.transition(&job, Stage::EmotionAnalysis, StageStatus::Processing).await);
        assert!(store.transition(&job, Stage::EmotionAnalysis, StageStatus::Completed).await);
        assert!(!store.transition(&job, Stage::EmotionAnalysis, StageStatus::Processing).await);
        assert!(!store.transition(&job, Stage::EmotionAnalysis, StageStatus::Failed).await);

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.status.emotion_analysis, StageStatus::Completed);
    }

    #[tokio::test]
    async fn test_fail_keeps_completed_stages_and_results() {
        let store = StatusStore::new();
        let job = JobId::new();
        store.reset(job.clone()).await;
        store.transition(&job, Stage::ObjectDetection, StageStatus::Processing).await;
        store
            .update_result(&job, |r| r.detected_objects = vec!["dog".to_string()])
            .await;
        store.transition(&job, Stage::ObjectDetection, StageStatus::Completed).await;
        store.transition(&job, Stage::EmotionAnalysis, StageStatus::Processing).await;

        let failed = store.fail(&job, "decoder crashed").await;
        assert_eq!(
            failed,
            vec![
                Stage::EmotionAnalysis,
                Stage::MusicRecommendation,
                Stage::StoryGeneration
            ]
        );

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.status.object_detection, StageStatus::Completed);
        assert_eq!(snapshot.status.emotion_analysis, StageStatus::Failed);
        assert_eq!(snapshot.result.detected_objects, vec!["dog"]);
        assert_eq!(snapshot.result.error.as_deref(), Some("decoder crashed"));
    }
}
