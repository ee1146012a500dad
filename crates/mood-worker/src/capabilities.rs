//! Construction of the collaborators a run depends on.
//!
//! Everything is built once at startup and injected, so tests can swap in
//! fakes without touching global state.

use std::sync::Arc;

use mood_media::{EmotionDetector, FfmpegDecoder, ObjectDetector, VideoDecoder};
use mood_ml_client::MlClient;
use tracing::info;

use crate::config::{DetectorBackend, WorkerConfig};
use crate::enrichment::{
    MusicSearch, OpenAiClient, OpenAiConfig, SpotifyClient, SpotifyConfig, TextGenerator,
};
use crate::error::WorkerResult;

/// The injected collaborators of a run.
#[derive(Clone)]
pub struct Capabilities {
    pub decoder: Arc<dyn VideoDecoder>,
    pub objects: Arc<dyn ObjectDetector>,
    pub emotions: Arc<dyn EmotionDetector>,
    /// `None` without Spotify credentials
    pub music: Option<Arc<dyn MusicSearch>>,
    /// `None` without an OpenAI API key
    pub text: Option<Arc<dyn TextGenerator>>,
}

impl Capabilities {
    /// Build production capabilities from the environment.
    pub fn from_env(config: &WorkerConfig) -> WorkerResult<Self> {
        let vision = Arc::new(MlClient::from_env()?);

        let objects: Arc<dyn ObjectDetector> = match config.detector_backend {
            DetectorBackend::Service => vision.clone(),
            DetectorBackend::Onnx => onnx_object_detector()?,
        };

        let music: Option<Arc<dyn MusicSearch>> = match SpotifyConfig::from_env() {
            Some(spotify) => Some(Arc::new(SpotifyClient::new(spotify)?)),
            None => None,
        };
        let text: Option<Arc<dyn TextGenerator>> = match OpenAiConfig::from_env() {
            Some(openai) => Some(Arc::new(OpenAiClient::new(openai)?)),
            None => None,
        };

        info!(
            objects = objects.name(),
            emotions = EmotionDetector::name(vision.as_ref()),
            music = music.as_ref().map(|m| m.name()).unwrap_or("fallback"),
            text = text.as_ref().map(|t| t.name()).unwrap_or("fallback"),
            "Capabilities configured"
        );

        Ok(Self {
            decoder: Arc::new(FfmpegDecoder::new()),
            objects,
            emotions: vision,
            music,
            text,
        })
    }
}

#[cfg(feature = "onnx")]
fn onnx_object_detector() -> WorkerResult<Arc<dyn ObjectDetector>> {
    use mood_media::{YoloDetector, YoloDetectorConfig};
    Ok(Arc::new(YoloDetector::new(YoloDetectorConfig::from_env())?))
}

#[cfg(not(feature = "onnx"))]
fn onnx_object_detector() -> WorkerResult<Arc<dyn ObjectDetector>> {
    Err(crate::error::WorkerError::config_error(
        "DETECTOR_BACKEND=onnx requires the `onnx` feature",
    ))
}
