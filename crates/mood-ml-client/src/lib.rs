//! Client for the vision service.
//!
//! The service hosts the object-detection and facial-emotion models. Frames
//! are sent as JPEG uploads; the client implements both detection
//! capabilities from `mood-media` so the pipeline can use it directly.

pub mod client;
pub mod error;
pub mod types;

pub use client::{MlClient, MlClientConfig};
pub use error::{MlError, MlResult};
pub use types::{DetectEmotionsResponse, DetectObjectsResponse, EmotionScore, FaceScores};
