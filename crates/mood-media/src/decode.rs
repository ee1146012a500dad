//! Streaming RGB decoding through an FFmpeg child process.
//!
//! FFmpeg writes every native frame as packed `rgb24` to stdout, which
//! normalizes the channel order regardless of the source encoding. Frames
//! come out upright (FFmpeg autorotates), so their size is the displayed
//! size reported by [`probe_video`]. The child is killed when the
//! [`FfmpegSource`] is dropped.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use image::RgbImage;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, VideoInfo};
use crate::sampler::{FrameSource, VideoDecoder};

/// Opens [`FfmpegSource`]s.
#[derive(Debug, Clone, Default)]
pub struct FfmpegDecoder;

impl FfmpegDecoder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VideoDecoder for FfmpegDecoder {
    async fn open(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>> {
        let source = FfmpegSource::open(path).await?;
        Ok(Box::new(source))
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// One decoding pass over a video file.
pub struct FfmpegSource {
    info: VideoInfo,
    // Held so the process is reaped/killed with the source.
    _child: Child,
    stdout: BufReader<ChildStdout>,
    frames_read: u64,
}

impl FfmpegSource {
    /// Probe `path` and start decoding it.
    pub async fn open(path: impl AsRef<Path>) -> MediaResult<Self> {
        let path = path.as_ref();
        let info = probe_video(path).await?;

        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let mut child = Command::new("ffmpeg")
            .args(["-nostdin", "-v", "error", "-i"])
            .arg(path)
            .args([
                "-map",
                "0:v:0",
                "-vsync",
                "passthrough",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdout was not captured"))?;

        info!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            rotation = info.rotation,
            fps = ?info.fps,
            "Started FFmpeg frame decoder"
        );

        Ok(Self {
            info,
            _child: child,
            stdout: BufReader::new(stdout),
            frames_read: 0,
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }
}

#[async_trait]
impl FrameSource for FfmpegSource {
    fn fps(&self) -> Option<f64> {
        self.info.fps
    }

    async fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        let frame_len = self.info.rgb_frame_len();
        let mut buffer = vec![0u8; frame_len];
        let mut filled = 0;

        while filled < frame_len {
            let n = self.stdout.read(&mut buffer[filled..]).await?;
            if n == 0 {
                if filled > 0 {
                    debug!(
                        frame = self.frames_read,
                        bytes = filled,
                        "Discarding truncated trailing frame"
                    );
                }
                return Ok(None);
            }
            filled += n;
        }

        self.frames_read += 1;
        RgbImage::from_raw(self.info.width, self.info.height, buffer)
            .map(Some)
            .ok_or_else(|| MediaError::decode_failed("Frame buffer size mismatch"))
    }
}
