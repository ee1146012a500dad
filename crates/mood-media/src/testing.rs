//! In-memory decoders for tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::{Rgb, RgbImage};

use crate::error::{MediaError, MediaResult};
use crate::sampler::{FrameSource, VideoDecoder};

/// A source producing `frames` solid-colour images.
///
/// The red channel of each frame carries `index % 256` so consumers can
/// tell frames apart.
pub struct InMemorySource {
    fps: Option<f64>,
    frames: u64,
    width: u32,
    height: u32,
    produced: u64,
    fail_at: Option<u64>,
    released: Arc<AtomicBool>,
}

impl InMemorySource {
    pub fn solid(fps: Option<f64>, frames: u64, width: u32, height: u32) -> Self {
        Self {
            fps,
            frames,
            width,
            height,
            produced: 0,
            fail_at: None,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fail with a decode error when asked for the frame at `index`.
    pub fn fail_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Flag set once the source is dropped.
    pub fn released_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }
}

impl Drop for InMemorySource {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl FrameSource for InMemorySource {
    fn fps(&self) -> Option<f64> {
        self.fps
    }

    async fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        if self.fail_at == Some(self.produced) {
            return Err(MediaError::decode_failed(format!(
                "synthetic failure at frame {}",
                self.produced
            )));
        }
        if self.produced >= self.frames {
            return Ok(None);
        }
        let shade = (self.produced % 256) as u8;
        self.produced += 1;
        Ok(Some(RgbImage::from_pixel(
            self.width,
            self.height,
            Rgb([shade, 0, 0]),
        )))
    }
}

/// Decoder handing out fresh [`InMemorySource`]s for any path.
pub struct InMemoryDecoder {
    fps: Option<f64>,
    frames: u64,
    width: u32,
    height: u32,
    fail_at: Option<u64>,
    fail_open: bool,
    opens: AtomicUsize,
}

impl InMemoryDecoder {
    pub fn new(fps: Option<f64>, frames: u64, width: u32, height: u32) -> Self {
        Self {
            fps,
            frames,
            width,
            height,
            fail_at: None,
            fail_open: false,
            opens: AtomicUsize::new(0),
        }
    }

    /// A decoder whose sources cannot be opened.
    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new(None, 0, 1, 1)
        }
    }

    /// Every opened source fails mid-stream at `index`.
    pub fn with_decode_failure_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Number of successful and failed `open` calls.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoDecoder for InMemoryDecoder {
    async fn open(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        let mut source = InMemorySource::solid(self.fps, self.frames, self.width, self.height);
        source.fail_at = self.fail_at;
        Ok(Box::new(source))
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}
