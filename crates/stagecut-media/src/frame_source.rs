//! Decoding a video into timestamped grayscale analysis frames.
//!
//! FFmpeg resamples the video to a fixed analysis rate and size and pipes raw
//! 8-bit grayscale frames to stdout, where they are read one frame at a time.

use async_trait::async_trait;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::command::{check_ffmpeg, collect_stderr_tail, create_ffmpeg_command};
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, VideoInfo};

/// A decoded analysis frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Zero-based index at the analysis rate
    pub index: u64,
    /// Seconds from the start of the file
    pub timestamp: f64,
    pub image: GrayImage,
}

/// Frame decoding options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSourceConfig {
    /// Frames per second fed to the detector
    pub analysis_fps: f64,
    /// Width of analysis frames; height follows the aspect ratio
    pub analysis_width: u32,
    /// Stop after this many seconds of video
    pub max_seconds: Option<f64>,
}

impl Default for FrameSourceConfig {
    fn default() -> Self {
        Self {
            analysis_fps: 5.0,
            analysis_width: 320,
            max_seconds: None,
        }
    }
}

impl FrameSourceConfig {
    pub fn validate(&self) -> MediaResult<()> {
        if !(self.analysis_fps.is_finite() && self.analysis_fps > 0.0) {
            return Err(MediaError::invalid_config("frames.analysis_fps must be > 0"));
        }
        if self.analysis_width < 16 {
            return Err(MediaError::invalid_config("frames.analysis_width must be >= 16"));
        }
        if let Some(max) = self.max_seconds {
            if !(max.is_finite() && max > 0.0) {
                return Err(MediaError::invalid_config("frames.max_seconds must be > 0"));
            }
        }
        Ok(())
    }

    /// Analysis frame size for a source of the given size. Never upscales;
    /// both sides are even.
    pub fn analysis_size(&self, source_width: u32, source_height: u32) -> (u32, u32) {
        let width = self.analysis_width.min(source_width.max(2)) & !1;
        let height = if source_width == 0 {
            width
        } else {
            let scaled = source_height as f64 * width as f64 / source_width as f64;
            ((scaled / 2.0).round() as u32 * 2).max(2)
        };
        (width.max(2), height)
    }
}

/// An ordered stream of analysis frames.
#[async_trait]
pub trait FrameStream: Send {
    /// Width and height of every frame.
    fn dimensions(&self) -> (u32, u32);

    /// Next frame, or `None` at end of stream.
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>>;
}

/// Frames decoded by an `ffmpeg` child process.
pub struct FrameSource {
    path: PathBuf,
    info: VideoInfo,
    width: u32,
    height: u32,
    fps: f64,
    max_frames: Option<u64>,
    next_index: u64,
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_tail: Option<JoinHandle<String>>,
    finished: bool,
}

impl FrameSource {
    /// Probe `path` and start decoding.
    pub async fn open(path: impl AsRef<Path>, config: &FrameSourceConfig) -> MediaResult<Self> {
        let path = path.as_ref();
        config.validate()?;

        let info = probe_video(path)
            .await
            .map_err(|e| MediaError::decode_failed(format!("{}: {}", path.display(), e)))?;
        if info.width == 0 || info.height == 0 {
            return Err(MediaError::decode_failed(format!(
                "{}: video stream has no dimensions",
                path.display()
            )));
        }

        let (width, height) = config.analysis_size(info.width, info.height);
        let filter = format!("fps={},scale={}:{}", config.analysis_fps, width, height);

        check_ffmpeg()?;
        let mut cmd = create_ffmpeg_command();
        cmd.args(["-v", "error", "-nostdin"]);
        if let Some(max) = config.max_seconds {
            cmd.args(["-t", &format!("{:.3}", max)]);
        }
        cmd.arg("-i")
            .arg(path)
            .args(["-an", "-vf", &filter, "-pix_fmt", "gray", "-f", "rawvideo", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(
            path = %path.display(),
            width,
            height,
            fps = config.analysis_fps,
            "Starting frame decoder"
        );

        let mut child = cmd
            .spawn()
            .map_err(|e| MediaError::decode_failed(format!("failed to spawn ffmpeg: {}", e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("ffmpeg stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("ffmpeg stderr was not captured"))?;

        let max_frames = config
            .max_seconds
            .map(|max| (max * config.analysis_fps).ceil() as u64);

        Ok(Self {
            path: path.to_path_buf(),
            info,
            width,
            height,
            fps: config.analysis_fps,
            max_frames,
            next_index: 0,
            child,
            stdout: BufReader::new(stdout),
            stderr_tail: Some(collect_stderr_tail(stderr)),
            finished: false,
        })
    }

    /// Probed properties of the source file.
    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    async fn finish(&mut self) -> MediaResult<()> {
        self.finished = true;
        let status = self.child.wait().await?;
        let tail = match self.stderr_tail.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if self.next_index == 0 {
            let reason = if status.success() {
                "decoder produced no frames".to_string()
            } else {
                format!("decoder exited with {:?} before producing a frame", status.code())
            };
            return Err(MediaError::decode_failed(with_stderr(
                format!("{}: {}", self.path.display(), reason),
                &tail,
            )));
        }
        if !status.success() {
            warn!(
                path = %self.path.display(),
                frames = self.next_index,
                exit_code = ?status.code(),
                stderr = %tail,
                "Decoder stopped early; keeping frames decoded so far"
            );
        }
        Ok(())
    }
}

fn with_stderr(message: String, tail: &str) -> String {
    if tail.is_empty() {
        message
    } else {
        format!("{}\n{}", message, tail)
    }
}

#[async_trait]
impl FrameStream for FrameSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        if self.max_frames.is_some_and(|max| self.next_index >= max) {
            self.finished = true;
            let _ = self.child.kill().await;
            return Ok(None);
        }

        let mut buf = vec![0u8; (self.width * self.height) as usize];
        match self.stdout.read_exact(&mut buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.finish().await?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let image = GrayImage::from_raw(self.width, self.height, buf)
            .ok_or_else(|| MediaError::internal("frame buffer size mismatch"))?;
        let frame = Frame {
            index: self.next_index,
            timestamp: self.next_index as f64 / self.fps,
            image,
        };
        self.next_index += 1;
        Ok(Some(frame))
    }
}

/// Frames held in memory, for synthetic footage and tests.
pub struct MemoryFrameStream {
    width: u32,
    height: u32,
    frames: std::vec::IntoIter<Frame>,
}

impl MemoryFrameStream {
    pub fn new(width: u32, height: u32, frames: Vec<Frame>) -> Self {
        Self {
            width,
            height,
            frames: frames.into_iter(),
        }
    }
}

#[async_trait]
impl FrameStream for MemoryFrameStream {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        Ok(self.frames.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_size_keeps_aspect() {
        let config = FrameSourceConfig::default();
        assert_eq!(config.analysis_size(1920, 1080), (320, 180));
        assert_eq!(config.analysis_size(1440, 1080), (320, 240));
        // Never upscale
        assert_eq!(config.analysis_size(160, 90), (160, 90));
    }

    #[test]
    fn test_config_validation() {
        assert!(FrameSourceConfig::default().validate().is_ok());
        let bad = FrameSourceConfig {
            analysis_fps: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_open_missing_file_fails() {
        let result = tokio_test::block_on(FrameSource::open(
            "/nonexistent/recital.mp4",
            &FrameSourceConfig::default(),
        ));
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_error_carries_stderr() {
        let message = with_stderr(
            "show.mp4: decoder produced no frames".to_string(),
            "show.mp4: Invalid data found when processing input",
        );
        assert_eq!(
            message,
            "show.mp4: decoder produced no frames\nshow.mp4: Invalid data found when processing input"
        );
        assert_eq!(with_stderr("plain".to_string(), ""), "plain");
    }

    #[tokio::test]
    async fn test_memory_stream_yields_in_order() {
        let frames = (0..3)
            .map(|i| Frame {
                index: i,
                timestamp: i as f64 * 0.2,
                image: GrayImage::new(4, 4),
            })
            .collect();
        let mut stream = MemoryFrameStream::new(4, 4, frames);

        let mut seen = Vec::new();
        while let Some(frame) = stream.next_frame().await.unwrap() {
            seen.push(frame.index);
        }
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_open_missing_file_is_decode_failure() {
        let err = FrameSource::open("/nonexistent/recital.mp4", &FrameSourceConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, MediaError::DecodeFailed(_)));
    }
}
