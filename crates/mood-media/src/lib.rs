//! Video decoding, frame sampling and detection capabilities.
//!
//! This crate provides:
//! - FFprobe metadata probing
//! - Streaming RGB frame decoding through an FFmpeg child process
//! - The evenly spaced, bounded `FrameSampler`
//! - Capability traits for object detection and facial emotion scoring
//! - An optional in-process YOLOv8 object detector (`onnx` feature)

pub mod decode;
pub mod detection;
pub mod error;
pub mod frame;
pub mod probe;
pub mod sampler;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
#[cfg(feature = "onnx")]
pub mod yolo;

pub use decode::{FfmpegDecoder, FfmpegSource};
pub use detection::{Detection, EmotionDetector, FaceEmotions, ObjectDetector, Region};
pub use error::{MediaError, MediaResult};
pub use frame::Frame;
pub use probe::{probe_video, VideoInfo};
pub use sampler::{FrameSampler, FrameSource, SamplingPolicy, VideoDecoder, DEFAULT_SOURCE_FPS};
#[cfg(feature = "onnx")]
pub use yolo::{YoloDetector, YoloDetectorConfig, COCO_CLASSES};
