//! Evenly spaced, bounded frame sampling.
//!
//! A [`FrameSampler`] is a single forward traversal over one opened
//! [`FrameSource`]. It is not restartable: every consumer opens its own
//! traversal against the same path, so the source is decoded once per
//! consumer. The source is dropped (and its decoder released) as soon as the
//! traversal is exhausted, hits its frame cap, fails, or is itself dropped.

use std::path::Path;

use async_trait::async_trait;
use image::RgbImage;
use tracing::{debug, warn};

use crate::error::MediaResult;
use crate::frame::Frame;

/// Frame rate assumed when the source does not report one.
pub const DEFAULT_SOURCE_FPS: f64 = 30.0;

/// A decodable media handle yielding its native frames in order.
#[async_trait]
pub trait FrameSource: Send {
    /// Nominal frame rate of the source.
    fn fps(&self) -> Option<f64>;

    /// Decode the next native frame, `Ok(None)` once exhausted.
    async fn next_frame(&mut self) -> MediaResult<Option<RgbImage>>;
}

/// Opens frame sources for video files.
#[async_trait]
pub trait VideoDecoder: Send + Sync {
    async fn open(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>>;

    /// Decoder name for logging.
    fn name(&self) -> &'static str;
}

/// Sampling cadence and cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingPolicy {
    /// Target sampling rate in frames per second
    pub target_fps: f64,
    /// Maximum number of frames a traversal yields
    pub max_frames: usize,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            target_fps: 1.0,
            max_frames: 60,
        }
    }
}

impl SamplingPolicy {
    pub fn new(target_fps: f64, max_frames: usize) -> Self {
        Self {
            target_fps,
            max_frames,
        }
    }

    /// Frame-index stride: `max(1, round(source_fps / target_fps))`.
    ///
    /// Halves round to even. A missing or non-positive source rate falls back
    /// to [`DEFAULT_SOURCE_FPS`]; a non-positive target keeps every frame.
    pub fn step_for(&self, source_fps: Option<f64>) -> u64 {
        let source_fps = source_fps
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .unwrap_or(DEFAULT_SOURCE_FPS);
        if !(self.target_fps.is_finite() && self.target_fps > 0.0) {
            return 1;
        }
        let ratio = (source_fps / self.target_fps).round_ties_even();
        if ratio < 1.0 {
            1
        } else {
            ratio as u64
        }
    }
}

/// Lazy traversal yielding every `step`-th native frame, up to `max_frames`.
pub struct FrameSampler {
    source: Option<Box<dyn FrameSource>>,
    step: u64,
    max_frames: usize,
    next_index: u64,
    yielded: usize,
}

impl FrameSampler {
    /// Wrap an already opened source.
    pub fn new(source: Box<dyn FrameSource>, policy: SamplingPolicy) -> Self {
        let step = policy.step_for(source.fps());
        let source = (policy.max_frames > 0).then_some(source);
        Self {
            source,
            step,
            max_frames: policy.max_frames,
            next_index: 0,
            yielded: 0,
        }
    }

    /// A traversal that yields nothing.
    pub fn empty() -> Self {
        Self {
            source: None,
            step: 1,
            max_frames: 0,
            next_index: 0,
            yielded: 0,
        }
    }

    /// Open a new traversal against `path`.
    ///
    /// A source that cannot be opened produces an empty traversal rather than
    /// an error.
    pub async fn open(decoder: &dyn VideoDecoder, path: &Path, policy: SamplingPolicy) -> Self {
        match decoder.open(path).await {
            Ok(source) => {
                let sampler = Self::new(source, policy);
                debug!(
                    decoder = decoder.name(),
                    path = %path.display(),
                    step = sampler.step,
                    max_frames = policy.max_frames,
                    "Opened frame traversal"
                );
                sampler
            }
            Err(e) => {
                warn!(
                    decoder = decoder.name(),
                    path = %path.display(),
                    error = %e,
                    "Could not open video source, sampling zero frames"
                );
                Self::empty()
            }
        }
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// Number of frames yielded so far.
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Whether the underlying source is still held open.
    pub fn is_open(&self) -> bool {
        self.source.is_some()
    }

    /// Yield the next sampled frame.
    ///
    /// Decode errors in the middle of the stream are returned to the caller;
    /// the source is released either way.
    pub async fn next(&mut self) -> MediaResult<Option<Frame>> {
        while let Some(source) = self.source.as_mut() {
            let image = match source.next_frame().await {
                Ok(Some(image)) => image,
                Ok(None) => {
                    self.release();
                    return Ok(None);
                }
                Err(e) => {
                    self.release();
                    return Err(e);
                }
            };

            let index = self.next_index;
            self.next_index += 1;
            if index % self.step != 0 {
                continue;
            }

            self.yielded += 1;
            if self.yielded >= self.max_frames {
                self.release();
            }
            return Ok(Some(Frame::new(index, image)));
        }
        Ok(None)
    }

    fn release(&mut self) {
        self.source = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;
    use crate::testing::{InMemoryDecoder, InMemorySource};

    async fn collect_indices(sampler: &mut FrameSampler) -> Vec<u64> {
        let mut indices = Vec::new();
        while let Some(frame) = sampler.next().await.unwrap() {
            indices.push(frame.index);
        }
        indices
    }

    #[test]
    fn test_step_rounding() {
        let policy = SamplingPolicy::new(1.0, 60);
        assert_eq!(policy.step_for(Some(30.0)), 30);
        assert_eq!(policy.step_for(Some(29.97)), 30);
        assert_eq!(policy.step_for(Some(0.4)), 1);
        assert_eq!(policy.step_for(None), 30);
        assert_eq!(policy.step_for(Some(0.0)), 30);

        // Halves round to even
        assert_eq!(SamplingPolicy::new(10.0, 60).step_for(Some(25.0)), 2);
        assert_eq!(SamplingPolicy::new(10.0, 60).step_for(Some(35.0)), 4);

        assert_eq!(SamplingPolicy::new(0.0, 60).step_for(Some(30.0)), 1);
    }

    #[tokio::test]
    async fn test_one_fps_from_thirty() {
        let source = InMemorySource::solid(Some(30.0), 90, 4, 4);
        let mut sampler = FrameSampler::new(Box::new(source), SamplingPolicy::new(1.0, 60));

        assert_eq!(sampler.step(), 30);
        assert_eq!(collect_indices(&mut sampler).await, vec![0, 30, 60]);
        assert_eq!(sampler.yielded(), 3);
        assert!(!sampler.is_open());
    }

    #[tokio::test]
    async fn test_frame_cap() {
        let source = InMemorySource::solid(Some(10.0), 100, 2, 2);
        let released = source.released_flag();
        let mut sampler = FrameSampler::new(Box::new(source), SamplingPolicy::new(5.0, 4));

        assert_eq!(collect_indices(&mut sampler).await, vec![0, 2, 4, 6]);
        assert!(released.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_zero_cap_yields_nothing() {
        let source = InMemorySource::solid(Some(30.0), 10, 2, 2);
        let mut sampler = FrameSampler::new(Box::new(source), SamplingPolicy::new(1.0, 0));
        assert!(sampler.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_abandoned_traversal_releases_source() {
        let source = InMemorySource::solid(Some(30.0), 90, 2, 2);
        let released = source.released_flag();
        let mut sampler = FrameSampler::new(Box::new(source), SamplingPolicy::default());

        assert!(sampler.next().await.unwrap().is_some());
        assert!(!released.load(std::sync::atomic::Ordering::SeqCst));
        drop(sampler);
        assert!(released.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unopenable_source_is_empty() {
        let decoder = InMemoryDecoder::failing();
        let mut sampler =
            FrameSampler::open(&decoder, Path::new("missing.mp4"), SamplingPolicy::default())
                .await;
        assert!(sampler.next().await.unwrap().is_none());
        assert_eq!(sampler.yielded(), 0);
    }

    #[tokio::test]
    async fn test_each_open_is_a_fresh_traversal() {
        let decoder = InMemoryDecoder::new(Some(30.0), 61, 2, 2);
        let path = Path::new("clip.mp4");

        let mut first = FrameSampler::open(&decoder, path, SamplingPolicy::default()).await;
        let mut second = FrameSampler::open(&decoder, path, SamplingPolicy::default()).await;

        assert_eq!(collect_indices(&mut first).await, vec![0, 30, 60]);
        assert_eq!(collect_indices(&mut second).await, vec![0, 30, 60]);
        assert_eq!(decoder.open_count(), 2);
    }

    #[tokio::test]
    async fn test_mid_stream_error_is_returned() {
        let source = InMemorySource::solid(Some(1.0), 5, 2, 2).fail_at(2);
        let mut sampler = FrameSampler::new(Box::new(source), SamplingPolicy::default());

        assert_eq!(sampler.next().await.unwrap().map(|f| f.index), Some(0));
        assert_eq!(sampler.next().await.unwrap().map(|f| f.index), Some(1));
        assert!(matches!(
            sampler.next().await,
            Err(MediaError::DecodeFailed(_))
        ));
        assert!(!sampler.is_open());
        assert!(sampler.next().await.unwrap().is_none());
    }
}
