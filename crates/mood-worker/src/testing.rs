//! Fake capabilities for tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mood_media::testing::InMemoryDecoder;
use mood_media::{
    Detection, EmotionDetector, FaceEmotions, Frame, FrameSource, MediaResult, ObjectDetector,
    VideoDecoder,
};
use mood_models::RecommendedSong;
use tokio::sync::Notify;

use crate::capabilities::Capabilities;
use crate::enrichment::{MusicSearch, TextGenerator};
use crate::error::{WorkerError, WorkerResult};

/// Same detections on every frame.
pub struct FixedObjects(pub Vec<Detection>);

#[async_trait]
impl ObjectDetector for FixedObjects {
    async fn detect_objects(&self, _frame: &Frame) -> MediaResult<Vec<Detection>> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Same faces on every frame.
pub struct FixedEmotions(pub Vec<FaceEmotions>);

#[async_trait]
impl EmotionDetector for FixedEmotions {
    async fn detect_emotions(&self, _frame: &Frame) -> MediaResult<Vec<FaceEmotions>> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Panics on the first frame.
pub struct PanickingObjects;

#[async_trait]
impl ObjectDetector for PanickingObjects {
    async fn detect_objects(&self, _frame: &Frame) -> MediaResult<Vec<Detection>> {
        panic!("detector state corrupted")
    }

    fn name(&self) -> &'static str {
        "panicking"
    }
}

/// Blocks its first call until released, later calls return immediately.
pub struct GatedObjects {
    detections: Vec<Detection>,
    calls: AtomicUsize,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl GatedObjects {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            calls: AtomicUsize::new(0),
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }

    /// Resolves once the first call is blocked.
    pub async fn wait_entered(&self) {
        self.entered.notified().await
    }

    /// Unblock the first call.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl ObjectDetector for GatedObjects {
    async fn detect_objects(&self, _frame: &Frame) -> MediaResult<Vec<Detection>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(self.detections.clone())
    }

    fn name(&self) -> &'static str {
        "gated"
    }
}

/// Music search returning a fixed answer.
pub struct FixedMusic(pub Option<RecommendedSong>);

#[async_trait]
impl MusicSearch for FixedMusic {
    async fn search_track(&self, _genre: &str) -> WorkerResult<Option<RecommendedSong>> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

pub struct FixedText(pub String);

#[async_trait]
impl TextGenerator for FixedText {
    async fn generate(&self, _: &str, _: u32, _: f32) -> WorkerResult<String> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

pub struct FailingText(pub String);

#[async_trait]
impl TextGenerator for FailingText {
    async fn generate(&self, _: &str, _: u32, _: f32) -> WorkerResult<String> {
        Err(WorkerError::text_generation(self.0.clone()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Decoder whose first traversal succeeds and every later one fails
/// mid-stream.
pub struct SecondOpenFails {
    healthy: InMemoryDecoder,
    broken: InMemoryDecoder,
    opens: AtomicUsize,
}

impl SecondOpenFails {
    pub fn new(fps: Option<f64>, frames: u64, fail_at: u64) -> Self {
        Self {
            healthy: InMemoryDecoder::new(fps, frames, 4, 4),
            broken: InMemoryDecoder::new(fps, frames, 4, 4).with_decode_failure_at(fail_at),
            opens: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VideoDecoder for SecondOpenFails {
    async fn open(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>> {
        if self.opens.fetch_add(1, Ordering::SeqCst) == 0 {
            self.healthy.open(path).await
        } else {
            self.broken.open(path).await
        }
    }

    fn name(&self) -> &'static str {
        "second-open-fails"
    }
}

/// Capabilities over a 3-second in-memory clip with one cup and one happy
/// face per frame, and working enrichment.
pub fn fake_capabilities() -> Capabilities {
    Capabilities {
        decoder: Arc::new(InMemoryDecoder::new(Some(30.0), 90, 4, 4)),
        objects: Arc::new(FixedObjects(vec![Detection::new("cup", 0.8)])),
        emotions: Arc::new(FixedEmotions(vec![FaceEmotions::new([("happy", 0.9)])])),
        music: Some(Arc::new(FixedMusic(Some(RecommendedSong {
            track_name: "Happy".to_string(),
            artist: "Pharrell Williams".to_string(),
            url: "https://open.spotify.com/track/4".to_string(),
        })))),
        text: Some(Arc::new(FixedText("A cup of sunshine.".to_string()))),
    }
}
