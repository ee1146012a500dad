//! Worker error types.

use mood_models::Stage;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("{stage} failed: {message}")]
    StageFailed { stage: Stage, message: String },

    #[error("Run panicked: {0}")]
    Panicked(String),

    #[error("Music search failed: {0}")]
    MusicSearch(String),

    #[error("Text generation failed: {0}")]
    TextGeneration(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] mood_media::MediaError),

    #[error("ML client error: {0}")]
    Ml(#[from] mood_ml_client::MlError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn stage_failed(stage: Stage, msg: impl Into<String>) -> Self {
        Self::StageFailed {
            stage,
            message: msg.into(),
        }
    }

    pub fn music_search(msg: impl Into<String>) -> Self {
        Self::MusicSearch(msg.into())
    }

    pub fn text_generation(msg: impl Into<String>) -> Self {
        Self::TextGeneration(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Attribute an error escaping a stage to that stage.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            Self::StageFailed { .. } | Self::Panicked(_) => self,
            other => Self::stage_failed(stage, other.to_string()),
        }
    }

    /// The stage an error was attributed to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_stage_wraps_once() {
        let err = WorkerError::Media(mood_media::MediaError::decode_failed("pipe closed"))
            .in_stage(Stage::ObjectDetection)
            .in_stage(Stage::EmotionAnalysis);

        assert_eq!(err.stage(), Some(Stage::ObjectDetection));
        assert_eq!(
            err.to_string(),
            "objectDetection failed: Media error: Decode failed: pipe closed"
        );
    }
}
