//! Shared data models for the MoodMelody backend.
//!
//! This crate provides Serde-serializable types for:
//! - Analysis stages and their statuses
//! - Job identity
//! - Aggregated analysis results and status snapshots
//! - The emotion to music genre table

pub mod emotion;
pub mod job;
pub mod result;
pub mod stage;

// Re-export common types
pub use emotion::{genre_for_emotion, DEFAULT_GENRE, EMOTION_GENRES, NEUTRAL_EMOTION};
pub use job::JobId;
pub use result::{AnalysisResult, ObjectSummary, RecommendedSong, StatusSnapshot};
pub use stage::{Stage, StageStatus, StageStatuses};
