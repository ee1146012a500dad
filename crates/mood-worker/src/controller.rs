//! The per-run state machine.
//!
//! Stages run strictly in order: object detection, emotion analysis, music
//! recommendation, story generation. Each goes `pending -> processing`
//! right before its work and `processing -> completed` right after, having
//! written its output into the result bag. An error escaping a stage ends
//! the run; every stage not yet completed flips to `failed` and the error
//! text lands in `result.error`.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use mood_media::FrameSampler;
use mood_models::{AnalysisResult, JobId, Stage, StageStatus};

use crate::capabilities::Capabilities;
use crate::config::WorkerConfig;
use crate::emotions::EmotionAggregator;
use crate::enrichment::EnrichmentStage;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::objects::ObjectAggregator;
use crate::status::StatusStore;

const OPERATION: &str = "video_analysis";

/// One analysis run to execute.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub job_id: JobId,
    pub video_path: PathBuf,
    /// Optional story theme
    pub keyword: Option<String>,
}

impl JobRequest {
    pub fn new(job_id: JobId, video_path: impl Into<PathBuf>) -> Self {
        Self {
            job_id,
            video_path: video_path.into(),
            keyword: None,
        }
    }

    pub fn with_keyword(mut self, keyword: Option<String>) -> Self {
        self.keyword = keyword.filter(|k| !k.trim().is_empty());
        self
    }
}

/// Runs the stages of a job against the shared [`StatusStore`].
pub struct JobController {
    config: WorkerConfig,
    capabilities: Capabilities,
    store: Arc<StatusStore>,
    objects: ObjectAggregator,
    emotions: EmotionAggregator,
    enrichment: EnrichmentStage,
}

impl JobController {
    pub fn new(config: WorkerConfig, capabilities: Capabilities, store: Arc<StatusStore>) -> Self {
        let objects =
            ObjectAggregator::new(capabilities.objects.clone(), config.confidence_threshold);
        let emotions =
            EmotionAggregator::new(capabilities.emotions.clone(), config.confidence_threshold);
        let enrichment = EnrichmentStage::new(
            capabilities.music.clone(),
            capabilities.text.clone(),
            config.story,
        );

        Self {
            config,
            capabilities,
            store,
            objects,
            emotions,
            enrichment,
        }
    }

    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Execute every stage of `job`.
    ///
    /// The store must already have been reset to `job.job_id`. A stage-fatal
    /// error is recorded in the store before it is returned.
    pub async fn run(&self, job: &JobRequest) -> WorkerResult<()> {
        let logger = JobLogger::new(&job.job_id, OPERATION);
        let started = Instant::now();
        logger.log_start(&format!("analyzing {}", job.video_path.display()));
        metrics::record_run_started();

        match self.run_stages(job, &logger).await {
            Ok(()) => {
                logger.log_completion(&format!("all stages completed in {:?}", started.elapsed()));
                metrics::record_run_completed(started.elapsed());
                Ok(())
            }
            Err(e) => {
                self.fail_run(&job.job_id, &e).await;
                Err(e)
            }
        }
    }

    /// Record a stage-fatal error for `job_id`.
    pub async fn fail_run(&self, job_id: &JobId, error: &WorkerError) {
        let logger = JobLogger::new(job_id, OPERATION);
        let failed = self.store.fail(job_id, error.to_string()).await;
        logger.log_error(&format!("{} (stages failed: {:?})", error, failed));
        metrics::record_run_failed(error.stage());
    }

    async fn run_stages(&self, job: &JobRequest, logger: &JobLogger) -> WorkerResult<()> {
        let summaries = self
            .execute(
                job,
                logger,
                Stage::ObjectDetection,
                async {
                    let mut frames = self.open_frames(job).await;
                    self.objects.aggregate(&mut frames).await
                },
                |summaries, result| {
                    result.detected_objects = summaries.iter().map(|s| s.label.clone()).collect();
                    result.object_summaries = summaries.clone();
                },
            )
            .await?;
        let labels: Vec<String> = summaries.into_iter().map(|s| s.label).collect();
        logger.log_progress(&format!("{} object labels detected", labels.len()));

        let emotion = self
            .execute(
                job,
                logger,
                Stage::EmotionAnalysis,
                async {
                    let mut frames = self.open_frames(job).await;
                    self.emotions.aggregate(&mut frames).await
                },
                |emotion, result| result.dominant_emotion = emotion.clone(),
            )
            .await?;
        logger.log_progress(&format!("dominant emotion: {}", emotion));

        let song = self
            .execute(
                job,
                logger,
                Stage::MusicRecommendation,
                async { Ok::<_, WorkerError>(self.enrichment.recommend_song(&emotion).await) },
                |song, result| result.recommended_song = song.clone(),
            )
            .await?;
        if song.is_unknown() {
            logger.log_warning("no track found, serving the fallback song");
        }

        self.execute(
            job,
            logger,
            Stage::StoryGeneration,
            async {
                let story = self
                    .enrichment
                    .generate_story(&labels, &emotion, job.keyword.as_deref())
                    .await;
                Ok::<_, WorkerError>(story)
            },
            |story, result| result.generated_story = story.clone(),
        )
        .await?;

        Ok(())
    }

    /// Run one stage: mark it processing, await `work`, publish its output
    /// and mark it completed.
    async fn execute<T, Fut, P>(
        &self,
        job: &JobRequest,
        logger: &JobLogger,
        stage: Stage,
        work: Fut,
        publish: P,
    ) -> WorkerResult<T>
    where
        Fut: Future<Output = WorkerResult<T>>,
        P: FnOnce(&T, &mut AnalysisResult),
    {
        self.store
            .transition(&job.job_id, stage, StageStatus::Processing)
            .await;
        logger.log_stage_start(stage);
        let started = Instant::now();

        let output = work.await.map_err(|e| e.in_stage(stage))?;

        self.store
            .update_result(&job.job_id, |result| publish(&output, result))
            .await;
        self.store
            .transition(&job.job_id, stage, StageStatus::Completed)
            .await;

        let elapsed = started.elapsed();
        logger.log_stage_complete(stage, elapsed);
        metrics::record_stage_duration(stage, elapsed);
        Ok(output)
    }

    /// A fresh traversal of the job's video for one consumer.
    async fn open_frames(&self, job: &JobRequest) -> FrameSampler {
        FrameSampler::open(
            self.capabilities.decoder.as_ref(),
            &job.video_path,
            self.config.sampling,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        FailingText, FixedEmotions, FixedMusic, FixedObjects, FixedText, SecondOpenFails,
    };
    use mood_media::testing::InMemoryDecoder;
    use mood_media::{Detection, FaceEmotions};
    use mood_models::{ObjectSummary, RecommendedSong, StageStatuses};

    fn song() -> RecommendedSong {
        RecommendedSong {
            track_name: "Walking on Sunshine".to_string(),
            artist: "Katrina and the Waves".to_string(),
            url: "https://open.spotify.com/track/3".to_string(),
        }
    }

    fn capabilities() -> Capabilities {
        Capabilities {
            decoder: Arc::new(InMemoryDecoder::new(Some(30.0), 90, 4, 4)),
            objects: Arc::new(FixedObjects(vec![
                Detection::new("cup", 0.5),
                Detection::new("person", 0.9),
                Detection::new("chair", 0.1),
            ])),
            emotions: Arc::new(FixedEmotions(vec![FaceEmotions::new([
                ("happy", 0.8),
                ("sad", 0.2),
            ])])),
            music: Some(Arc::new(FixedMusic(Some(song())))),
            text: Some(Arc::new(FixedText("  The cup waited by the window.  ".to_string()))),
        }
    }

    async fn run(capabilities: Capabilities) -> (WorkerResult<()>, mood_models::StatusSnapshot) {
        let store = Arc::new(StatusStore::new());
        let controller = JobController::new(WorkerConfig::default(), capabilities, store.clone());
        let job = JobRequest::new(JobId::new(), "clip.mp4").with_keyword(Some("rain".to_string()));
        store.reset(job.job_id.clone()).await;

        let outcome = controller.run(&job).await;
        (outcome, store.snapshot().await)
    }

    #[tokio::test]
    async fn test_successful_run() {
        let (outcome, snapshot) = run(capabilities()).await;

        assert!(outcome.is_ok());
        assert!(snapshot.status.all_completed());
        assert_eq!(snapshot.result.detected_objects, vec!["cup", "person"]);
        assert_eq!(
            snapshot.result.object_summaries[0],
            ObjectSummary {
                label: "cup".to_string(),
                count: 3,
                avg_confidence: 0.5,
            }
        );
        assert_eq!(snapshot.result.dominant_emotion, "happy");
        assert_eq!(snapshot.result.recommended_song, song());
        assert_eq!(snapshot.result.generated_story, "The cup waited by the window.");
        assert_eq!(snapshot.result.error, None);
    }

    #[tokio::test]
    async fn test_unconfigured_enrichment_completes_with_fallbacks() {
        let mut capabilities = capabilities();
        capabilities.music = None;
        capabilities.text = None;
        capabilities.emotions = Arc::new(FixedEmotions(vec![FaceEmotions::new([("sad", 0.9)])]));

        let (outcome, snapshot) = run(capabilities).await;

        assert!(outcome.is_ok());
        assert!(snapshot.status.all_completed());
        assert_eq!(snapshot.result.dominant_emotion, "sad");
        assert!(snapshot.result.recommended_song.is_unknown());
        assert!(snapshot
            .result
            .generated_story
            .starts_with("(Story generation failed:"));
    }

    #[tokio::test]
    async fn test_text_failure_is_absorbed() {
        let mut capabilities = capabilities();
        capabilities.text = Some(Arc::new(FailingText("model overloaded".to_string())));

        let (outcome, snapshot) = run(capabilities).await;

        assert!(outcome.is_ok());
        assert_eq!(snapshot.status.story_generation, StageStatus::Completed);
        assert!(snapshot.result.generated_story.contains("model overloaded"));
        assert_eq!(snapshot.result.error, None);
    }

    #[tokio::test]
    async fn test_unreadable_video_completes_empty() {
        let mut capabilities = capabilities();
        capabilities.decoder = Arc::new(InMemoryDecoder::failing());

        let (outcome, snapshot) = run(capabilities).await;

        assert!(outcome.is_ok());
        assert!(snapshot.status.all_completed());
        assert!(snapshot.result.detected_objects.is_empty());
        assert_eq!(snapshot.result.dominant_emotion, "neutral");
        assert!(!snapshot.result.generated_story.is_empty());
    }

    #[tokio::test]
    async fn test_object_stage_failure_fails_every_stage() {
        let mut capabilities = capabilities();
        capabilities.decoder =
            Arc::new(InMemoryDecoder::new(Some(30.0), 90, 4, 4).with_decode_failure_at(40));

        let (outcome, snapshot) = run(capabilities).await;

        assert!(outcome.is_err());
        assert_eq!(
            snapshot.status,
            StageStatuses {
                object_detection: StageStatus::Failed,
                emotion_analysis: StageStatus::Failed,
                music_recommendation: StageStatus::Failed,
                story_generation: StageStatus::Failed,
            }
        );
        let error = snapshot.result.error.unwrap();
        assert!(error.starts_with("objectDetection failed"));
        assert!(error.contains("synthetic failure at frame 40"));
    }

    #[tokio::test]
    async fn test_later_stage_failure_keeps_earlier_results() {
        let mut capabilities = capabilities();
        capabilities.decoder = Arc::new(SecondOpenFails::new(Some(30.0), 90, 10));

        let (outcome, snapshot) = run(capabilities).await;

        assert!(outcome.is_err());
        assert_eq!(snapshot.status.object_detection, StageStatus::Completed);
        assert_eq!(snapshot.status.emotion_analysis, StageStatus::Failed);
        assert_eq!(snapshot.status.music_recommendation, StageStatus::Failed);
        assert_eq!(snapshot.status.story_generation, StageStatus::Failed);
        assert_eq!(snapshot.result.detected_objects, vec!["cup", "person"]);
        assert_eq!(snapshot.result.dominant_emotion, "neutral");
        assert!(snapshot
            .result
            .error
            .unwrap()
            .starts_with("emotionAnalysis failed"));
    }

    #[test]
    fn test_blank_keyword_is_dropped() {
        let job = JobRequest::new(JobId::new(), "a.mp4").with_keyword(Some("   ".to_string()));
        assert_eq!(job.keyword, None);
    }
}
