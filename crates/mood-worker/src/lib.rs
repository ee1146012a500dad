//! Video analysis pipeline.
//!
//! This crate provides:
//! - Object and emotion aggregation over sampled frames
//! - Music and story enrichment with graceful fallbacks
//! - The shared status store polled by the API
//! - The job controller state machine and the manager owning the active run

pub mod capabilities;
pub mod config;
pub mod controller;
pub mod emotions;
pub mod enrichment;
pub mod error;
pub mod logging;
pub mod manager;
pub mod metrics;
pub mod objects;
pub mod status;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use capabilities::Capabilities;
pub use config::{DetectorBackend, StorySettings, WorkerConfig};
pub use controller::{JobController, JobRequest};
pub use emotions::{EmotionAggregator, EmotionTally};
pub use enrichment::{
    EnrichmentStage, MusicSearch, OpenAiClient, OpenAiConfig, SpotifyClient, SpotifyConfig,
    TextGenerator,
};
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use manager::JobManager;
pub use objects::ObjectAggregator;
pub use status::StatusStore;
