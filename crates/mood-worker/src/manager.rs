//! Ownership of the active run.
//!
//! Uploads are not serialized. Starting a job while the previous run is still
//! executing resets the shared state and spawns the new run anyway; the old
//! run keeps computing but its writes are fenced off by job id. The overlap
//! is logged and counted.
//!
//! Unless retention is configured, the video of a replaced run is deleted
//! once that run has finished with it.

use std::any::Any;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mood_models::{JobId, StatusSnapshot};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use crate::controller::{JobController, JobRequest};
use crate::error::WorkerError;
use crate::logging::JobLogger;
use crate::metrics;
use crate::status::StatusStore;

struct ActiveRun {
    job_id: JobId,
    video_path: PathBuf,
    /// Taken once somebody waits for the run
    handle: Option<JoinHandle<()>>,
}

impl ActiveRun {
    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

/// Starts runs and keeps the handle of the most recent one.
pub struct JobManager {
    controller: Arc<JobController>,
    active: Mutex<Option<ActiveRun>>,
    overlapping_runs: AtomicU64,
}

impl JobManager {
    pub fn new(controller: Arc<JobController>) -> Self {
        Self {
            controller,
            active: Mutex::new(None),
            overlapping_runs: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<StatusStore> {
        self.controller.store()
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        self.store().snapshot().await
    }

    /// Reset the shared state to `request.job_id` and spawn its run.
    ///
    /// The reset is visible to pollers before this returns.
    pub async fn start(&self, request: JobRequest) -> JobId {
        let job_id = request.job_id.clone();
        let mut active = self.active.lock().await;

        if let Some(previous) = active.as_ref() {
            if previous.is_running() {
                self.overlapping_runs.fetch_add(1, Ordering::Relaxed);
                metrics::record_overlapping_run();
                warn!(
                    job_id = %job_id,
                    previous_job_id = %previous.job_id,
                    "Starting a run while the previous one is still executing; \
                     the previous run can no longer update job state"
                );
            }
        }

        self.store().reset(job_id.clone()).await;
        info!(
            job_id = %job_id,
            video = %request.video_path.display(),
            keyword = ?request.keyword,
            "Job accepted"
        );

        let video_path = request.video_path.clone();
        let handle = tokio::spawn(supervise(Arc::clone(&self.controller), request));
        let previous = active.replace(ActiveRun {
            job_id: job_id.clone(),
            video_path: video_path.clone(),
            handle: Some(handle),
        });

        if let Some(previous) = previous {
            if !self.controller.config().retain_superseded_videos
                && previous.video_path != video_path
            {
                tokio::spawn(discard_superseded(previous));
            }
        }
        job_id
    }

    /// Whether the most recent run is still executing.
    pub async fn is_running(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(ActiveRun::is_running)
    }

    /// How long shutdown should wait for the active run.
    pub fn shutdown_timeout(&self) -> Duration {
        self.controller.config().shutdown_timeout
    }

    /// Number of runs started while another was still executing.
    pub fn overlapping_runs(&self) -> u64 {
        self.overlapping_runs.load(Ordering::Relaxed)
    }

    /// Wait for the most recent run to finish.
    ///
    /// Returns its job id, or `None` when nothing was started or the run
    /// was already waited for.
    pub async fn wait_for_active(&self) -> Option<JobId> {
        let (job_id, handle) = {
            let mut active = self.active.lock().await;
            let run = active.as_mut()?;
            (run.job_id.clone(), run.handle.take()?)
        };
        if let Err(e) = handle.await {
            error!(job_id = %job_id, error = %e, "Run supervisor ended abnormally");
        }
        Some(job_id)
    }
}

/// Delete the video of a replaced run after that run stops reading it.
async fn discard_superseded(run: ActiveRun) {
    if let Some(handle) = run.handle {
        if let Err(e) = handle.await {
            error!(job_id = %run.job_id, error = %e, "Run supervisor ended abnormally");
        }
    }

    match tokio::fs::remove_file(&run.video_path).await {
        Ok(()) => info!(
            job_id = %run.job_id,
            path = %run.video_path.display(),
            "Deleted superseded video"
        ),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(job_id = %run.job_id, path = %run.video_path.display(), "Superseded video already gone")
        }
        Err(e) => warn!(
            job_id = %run.job_id,
            path = %run.video_path.display(),
            error = %e,
            "Failed to delete superseded video"
        ),
    }
}

/// Drive one run on its own task so a panic inside it still ends the job
/// with failed statuses.
async fn supervise(controller: Arc<JobController>, request: JobRequest) {
    let job_id = request.job_id.clone();
    let span = JobLogger::new(&job_id, "video_analysis").create_span();

    let runner = Arc::clone(&controller);
    let run = tokio::spawn(async move { runner.run(&request).await }.instrument(span));

    // Stage-fatal errors are already recorded by the controller.
    if let Err(e) = run.await {
        let message = if e.is_panic() {
            panic_message(e.into_panic())
        } else {
            e.to_string()
        };
        controller
            .fail_run(&job_id, &WorkerError::Panicked(message))
            .await;
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::testing::{fake_capabilities, GatedObjects, PanickingObjects};
    use mood_media::Detection;
    use mood_models::{StageStatus, StageStatuses};

    fn manager(capabilities: crate::Capabilities) -> JobManager {
        let store = Arc::new(StatusStore::new());
        JobManager::new(Arc::new(JobController::new(
            WorkerConfig::default(),
            capabilities,
            store,
        )))
    }

    #[tokio::test]
    async fn test_start_resets_before_spawning() {
        let manager = manager(fake_capabilities());
        let job_id = manager.start(JobRequest::new(JobId::new(), "clip.mp4")).await;

        // The spawned run has not been polled yet on the current-thread runtime.
        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.job_id, Some(job_id.clone()));
        assert_eq!(snapshot.status, StageStatuses::default());

        assert_eq!(manager.wait_for_active().await, Some(job_id));
        let snapshot = manager.snapshot().await;
        assert!(snapshot.status.all_completed());
        assert_eq!(snapshot.result.detected_objects, vec!["cup"]);
        assert_eq!(snapshot.result.dominant_emotion, "happy");
        assert_eq!(snapshot.result.recommended_song.artist, "Pharrell Williams");
        assert_eq!(snapshot.result.generated_story, "A cup of sunshine.");
    }

    #[tokio::test]
    async fn test_panic_fails_the_run() {
        let mut capabilities = fake_capabilities();
        capabilities.objects = Arc::new(PanickingObjects);
        let manager = manager(capabilities);

        manager.start(JobRequest::new(JobId::new(), "clip.mp4")).await;
        manager.wait_for_active().await;

        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.status.object_detection, StageStatus::Failed);
        assert_eq!(snapshot.status.story_generation, StageStatus::Failed);
        let error = snapshot.result.error.unwrap();
        assert!(error.contains("panicked"));
        assert!(error.contains("detector state corrupted"));
    }

    #[tokio::test]
    async fn test_overlapping_run_is_detected_and_fenced() {
        let gated = Arc::new(GatedObjects::new(vec![Detection::new("umbrella", 0.7)]));
        let mut capabilities = fake_capabilities();
        capabilities.objects = gated.clone();
        let manager = manager(capabilities);

        let first = manager.start(JobRequest::new(JobId::new(), "first.mp4")).await;
        gated.wait_entered().await;
        assert!(manager.is_running().await);

        let second = manager.start(JobRequest::new(JobId::new(), "second.mp4")).await;
        assert_ne!(first, second);
        assert_eq!(manager.overlapping_runs(), 1);

        assert_eq!(manager.wait_for_active().await, Some(second.clone()));
        let finished = manager.snapshot().await;
        assert!(finished.status.all_completed());

        // Let the superseded run finish; none of its writes may land.
        gated.release();
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.job_id, Some(second));
        assert_eq!(snapshot.status, finished.status);
        assert_eq!(snapshot.result, finished.result);
        assert_eq!(snapshot.updated_at, finished.updated_at);
    }

    async fn wait_until_removed(path: &std::path::Path) {
        let removed = tokio::time::timeout(Duration::from_secs(2), async {
            while path.exists() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(removed.is_ok(), "{} was not deleted", path.display());
    }

    #[tokio::test]
    async fn test_superseded_video_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.mp4");
        let second = dir.path().join("second.mp4");
        std::fs::write(&first, b"one").unwrap();
        std::fs::write(&second, b"two").unwrap();
        let manager = manager(fake_capabilities());

        manager.start(JobRequest::new(JobId::new(), &first)).await;
        manager.wait_for_active().await;
        assert!(first.exists());

        manager.start(JobRequest::new(JobId::new(), &second)).await;
        manager.wait_for_active().await;

        wait_until_removed(&first).await;
        assert!(second.exists());
    }

    #[tokio::test]
    async fn test_superseded_video_outlives_its_run() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.mp4");
        std::fs::write(&first, b"one").unwrap();
        let gated = Arc::new(GatedObjects::new(vec![Detection::new("kite", 0.9)]));
        let mut capabilities = fake_capabilities();
        capabilities.objects = gated.clone();
        let manager = manager(capabilities);

        manager.start(JobRequest::new(JobId::new(), &first)).await;
        gated.wait_entered().await;
        manager
            .start(JobRequest::new(JobId::new(), dir.path().join("second.mp4")))
            .await;
        manager.wait_for_active().await;

        // The replaced run is still decoding its file
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(first.exists());

        gated.release();
        wait_until_removed(&first).await;
    }

    #[tokio::test]
    async fn test_retained_videos_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.mp4");
        std::fs::write(&first, b"one").unwrap();
        let config = WorkerConfig {
            retain_superseded_videos: true,
            ..Default::default()
        };
        let manager = JobManager::new(Arc::new(JobController::new(
            config,
            fake_capabilities(),
            Arc::new(StatusStore::new()),
        )));

        manager.start(JobRequest::new(JobId::new(), &first)).await;
        manager.wait_for_active().await;
        manager
            .start(JobRequest::new(JobId::new(), dir.path().join("second.mp4")))
            .await;
        manager.wait_for_active().await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(first.exists());
    }

    #[tokio::test]
    async fn test_sequential_runs_do_not_overlap() {
        let manager = manager(fake_capabilities());

        manager.start(JobRequest::new(JobId::new(), "a.mp4")).await;
        manager.wait_for_active().await;
        manager.start(JobRequest::new(JobId::new(), "b.mp4")).await;
        manager.wait_for_active().await;

        assert_eq!(manager.overlapping_runs(), 0);
        assert!(!manager.is_running().await);
    }
}
