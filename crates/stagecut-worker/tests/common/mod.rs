//! Shared helpers for worker scenario tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{GrayImage, Luma};
use tokio::sync::Semaphore;

use stagecut_media::{
    DetectorConfig, EncodeBackend, EncodeJob, Frame, MediaError, MediaResult, MemoryFrameStream,
};
use stagecut_models::VideoId;
use stagecut_worker::{ClipConfig, ClipOrchestrator, PipelineConfig, VideoContext};

pub const FPS: f64 = 5.0;
pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 36;

/// Decides whether attempt `n` (1-based) of a job fails, and how.
pub type Script = dyn Fn(&EncodeJob, u32) -> Option<MediaError> + Send + Sync;

/// Encode backend that never runs ffmpeg.
pub struct MockBackend {
    script: Box<Script>,
    encode_delay: Duration,
    duration_skew: f64,
    attempts: Mutex<HashMap<PathBuf, u32>>,
    encoded: Mutex<Vec<EncodeJob>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockBackend {
    pub fn succeeding() -> Self {
        Self::scripted(|_, _| None)
    }

    pub fn scripted(
        script: impl Fn(&EncodeJob, u32) -> Option<MediaError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            encode_delay: Duration::ZERO,
            duration_skew: 0.0,
            attempts: Mutex::new(HashMap::new()),
            encoded: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.encode_delay = delay;
        self
    }

    /// Probed durations are off from the window by `skew` seconds.
    pub fn with_duration_skew(mut self, skew: f64) -> Self {
        self.duration_skew = skew;
        self
    }

    pub fn attempts_for(&self, output: &Path) -> u32 {
        self.attempts.lock().unwrap().get(output).copied().unwrap_or(0)
    }

    pub fn encoded(&self) -> Vec<EncodeJob> {
        self.encoded.lock().unwrap().clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub fn transient_failure() -> MediaError {
    MediaError::ffmpeg_failed("encoder exited", Some("Conversion failed!".into()), Some(1))
}

#[async_trait]
impl EncodeBackend for MockBackend {
    async fn encode(&self, job: &EncodeJob, _timeout: Duration) -> MediaResult<()> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(job.output.clone()).or_insert(0);
            *n += 1;
            *n
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.encode_delay.is_zero() {
            tokio::time::sleep(self.encode_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = (self.script)(job, attempt) {
            return Err(err);
        }
        self.encoded.lock().unwrap().push(job.clone());
        Ok(())
    }

    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        self.encoded
            .lock()
            .unwrap()
            .iter()
            .find(|job| job.output == path)
            .map(|job| job.window.duration() + self.duration_skew)
            .ok_or_else(|| MediaError::FileNotFound(path.to_path_buf()))
    }
}

/// Clip settings with fast retries.
pub fn fast_clip_config() -> ClipConfig {
    ClipConfig {
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 5,
        ..Default::default()
    }
}

pub fn orchestrator(config: ClipConfig, backend: Arc<MockBackend>) -> ClipOrchestrator {
    let slots = Arc::new(Semaphore::new(config.max_concurrent_encodes));
    ClipOrchestrator::new(config, backend, slots)
}

pub fn context(output_dir: &Path, external_audio: Option<&str>) -> VideoContext {
    VideoContext {
        video_id: VideoId::from("recital"),
        source: PathBuf::from("recital.mp4"),
        duration: 600.0,
        fps: 25.0,
        external_audio: external_audio.map(PathBuf::from),
        output_dir: output_dir.to_path_buf(),
    }
}

/// Pipeline settings tuned for the synthetic footage.
pub fn pipeline_config(output_dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.detection = DetectorConfig {
        min_blob_area: 10,
        ..Default::default()
    };
    config.occupancy.min_duration_secs = 5.0;
    config.clips = fast_clip_config();
    config.batch.output_dir = output_dir.to_path_buf();
    config
}

/// Static dark stage; a bright block wanders across it whenever `present`.
pub fn footage(seconds: f64, present: impl Fn(f64) -> bool) -> MemoryFrameStream {
    let count = (seconds * FPS) as u64;
    let frames = (0..count)
        .map(|index| {
            let timestamp = index as f64 / FPS;
            let mut image = GrayImage::from_pixel(WIDTH, HEIGHT, Luma([40]));
            if present(timestamp) {
                let phase = (index % 40) as u32;
                let x0 = 16 + if phase < 20 { phase } else { 40 - phase };
                for y in 14..22 {
                    for x in x0..x0 + 6 {
                        image.put_pixel(x, y, Luma([230]));
                    }
                }
            }
            Frame {
                index,
                timestamp,
                image,
            }
        })
        .collect();
    MemoryFrameStream::new(WIDTH, HEIGHT, frames)
}

pub fn within(t: f64, start: f64, end: f64) -> bool {
    t >= start && t <= end
}
