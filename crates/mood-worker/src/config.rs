//! Worker configuration.

use std::str::FromStr;
use std::time::Duration;

use mood_media::SamplingPolicy;

use crate::error::WorkerError;

/// Where object and emotion detection runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectorBackend {
    /// Remote vision service over HTTP
    #[default]
    Service,
    /// In-process YOLOv8 through ONNX Runtime (objects only)
    Onnx,
}

impl FromStr for DetectorBackend {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "service" | "http" => Ok(Self::Service),
            "onnx" | "yolo" => Ok(Self::Onnx),
            other => Err(WorkerError::config_error(format!(
                "unknown detector backend '{}'",
                other
            ))),
        }
    }
}

/// Story prompt and generation budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorySettings {
    /// Target story length embedded in the prompt
    pub max_words: u32,
    /// Output token budget for the text generator
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for StorySettings {
    fn default() -> Self {
        Self {
            max_words: 130,
            max_tokens: 600,
            temperature: 0.8,
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Frame sampling cadence and cap, shared by both aggregators
    pub sampling: SamplingPolicy,
    /// Minimum score for a detection or emotion vote to count
    pub confidence_threshold: f32,
    pub story: StorySettings,
    pub detector_backend: DetectorBackend,
    /// How long shutdown waits for the active run
    pub shutdown_timeout: Duration,
    /// Keep a run's video once a newer upload replaces it
    pub retain_superseded_videos: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingPolicy::default(),
            confidence_threshold: 0.35,
            story: StorySettings::default(),
            detector_backend: DetectorBackend::default(),
            shutdown_timeout: Duration::from_secs(30),
            retain_superseded_videos: false,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, WorkerError> {
        let defaults = Self::default();

        let detector_backend = match std::env::var("DETECTOR_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.detector_backend,
        };

        Ok(Self {
            sampling: SamplingPolicy::new(
                env_or("SAMPLE_TARGET_FPS", defaults.sampling.target_fps),
                env_or("SAMPLE_MAX_FRAMES", defaults.sampling.max_frames),
            ),
            confidence_threshold: env_or("CONFIDENCE_THRESHOLD", defaults.confidence_threshold),
            story: StorySettings {
                max_words: env_or("STORY_MAX_WORDS", defaults.story.max_words),
                max_tokens: env_or("STORY_MAX_TOKENS", defaults.story.max_tokens),
                temperature: env_or("STORY_TEMPERATURE", defaults.story.temperature),
            },
            detector_backend,
            shutdown_timeout: Duration::from_secs(env_or("WORKER_SHUTDOWN_TIMEOUT", 30)),
            retain_superseded_videos: env_or(
                "RETAIN_SUPERSEDED_VIDEOS",
                defaults.retain_superseded_videos,
            ),
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.sampling, SamplingPolicy::new(1.0, 60));
        assert!((config.confidence_threshold - 0.35).abs() < f32::EPSILON);
        assert_eq!(config.story.max_words, 130);
        assert_eq!(config.story.max_tokens, 600);
        assert_eq!(config.detector_backend, DetectorBackend::Service);
        assert!(!config.retain_superseded_videos);
    }

    #[test]
    fn test_detector_backend_parse() {
        assert_eq!("onnx".parse::<DetectorBackend>().unwrap(), DetectorBackend::Onnx);
        assert_eq!(" Service ".parse::<DetectorBackend>().unwrap(), DetectorBackend::Service);
        assert!("tpu".parse::<DetectorBackend>().is_err());
    }
}
