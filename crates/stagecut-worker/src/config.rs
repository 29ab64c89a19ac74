//! Pipeline configuration.
//!
//! Sources, later ones winning:
//! 1. Built-in defaults
//! 2. A JSON file with one object per section
//! 3. `STAGECUT_*` environment variables
//! 4. CLI flags (applied by the binary)
//!
//! Values are validated, never clamped: anything out of range is a
//! [`WorkerError::ConfigurationError`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use stagecut_media::{
    AudioMix, DetectorConfig, FrameSourceConfig, OccupancyConfig, SegmentationConfig, SyncConfig,
    SyncStrategy, TrackerConfig,
};
use stagecut_models::{AudioSource, EncodingConfig};

use crate::error::{WorkerError, WorkerResult};

/// What to do with the external recording once aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    /// Mix camera audio and the external recording with fixed gains
    #[default]
    Mix,
    /// Replace camera audio with the external recording
    Replace,
}

impl AudioMode {
    pub fn audio_source(&self) -> AudioSource {
        match self {
            AudioMode::Mix => AudioSource::Mixed,
            AudioMode::Replace => AudioSource::Replaced,
        }
    }
}

impl FromStr for AudioMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mix" => Ok(AudioMode::Mix),
            "replace" => Ok(AudioMode::Replace),
            other => Err(format!("unknown audio mode '{}', expected mix or replace", other)),
        }
    }
}

/// Clip extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipConfig {
    /// Seconds added before each interval
    pub lead_padding_secs: f64,
    /// Seconds added after each interval
    pub trail_padding_secs: f64,

    /// Per-attempt encode timeout (seconds)
    pub encode_timeout_secs: u64,

    /// Total encode attempts per clip
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,

    /// Encodes running at once across all videos
    pub max_concurrent_encodes: usize,

    /// Encode with NVENC when an NVIDIA GPU is present
    pub use_gpu: bool,

    pub audio_mode: AudioMode,
    pub mix: AudioMix,

    /// Apply `yadif` to the video
    pub deinterlace: bool,

    /// Use camera audio instead of a low-confidence offset
    pub require_confident_sync: bool,

    pub encoding: EncodingConfig,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            lead_padding_secs: 1.0,
            trail_padding_secs: 1.0,
            encode_timeout_secs: 1800,
            max_attempts: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 10_000,
            max_concurrent_encodes: 2,
            use_gpu: false,
            audio_mode: AudioMode::Mix,
            mix: AudioMix::default(),
            deinterlace: true,
            require_confident_sync: false,
            encoding: EncodingConfig::default(),
        }
    }
}

impl ClipConfig {
    pub fn encode_timeout(&self) -> Duration {
        Duration::from_secs(self.encode_timeout_secs)
    }

    fn validate(&self) -> WorkerResult<()> {
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;

        if !non_negative(self.lead_padding_secs) || !non_negative(self.trail_padding_secs) {
            return Err(WorkerError::config_error(
                "clips.lead_padding_secs and trail_padding_secs must be >= 0",
            ));
        }
        if self.encode_timeout_secs == 0 {
            return Err(WorkerError::config_error("clips.encode_timeout_secs must be > 0"));
        }
        if self.max_attempts == 0 {
            return Err(WorkerError::config_error("clips.max_attempts must be >= 1"));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(WorkerError::config_error(
                "clips.retry_max_delay_ms must be >= retry_base_delay_ms",
            ));
        }
        if self.max_concurrent_encodes == 0 {
            return Err(WorkerError::config_error(
                "clips.max_concurrent_encodes must be >= 1",
            ));
        }
        if !non_negative(self.mix.camera_gain) || !non_negative(self.mix.external_gain) {
            return Err(WorkerError::config_error("clips.mix gains must be >= 0"));
        }
        if self.encoding.crf > 51 {
            return Err(WorkerError::config_error("clips.encoding.crf must be within 0-51"));
        }
        Ok(())
    }
}

/// Batch-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Videos processed in parallel
    pub max_concurrent_videos: usize,
    /// Clips, `report.json` and `metrics.prom` are written here
    pub output_dir: PathBuf,
    /// Scratch space for concatenated segments; the system temp dir if unset
    pub temp_dir: Option<PathBuf>,
    /// Write Prometheus text metrics next to the report
    pub write_metrics: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_videos: 1,
            output_dir: PathBuf::from("output"),
            temp_dir: None,
            write_metrics: false,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub frames: FrameSourceConfig,
    pub detection: DetectorConfig,
    pub tracking: TrackerConfig,
    pub occupancy: OccupancyConfig,
    pub sync: SyncConfig,
    pub clips: ClipConfig,
    pub batch: BatchConfig,
}

impl PipelineConfig {
    /// Load from a JSON file. Missing sections and fields take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> WorkerResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            WorkerError::config_error(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            WorkerError::config_error(format!("invalid config {}: {}", path.display(), e))
        })
    }

    /// Defaults or `path`, then environment overrides.
    pub fn load(path: Option<&Path>) -> WorkerResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `STAGECUT_*` environment variables.
    pub fn apply_env(&mut self) -> WorkerResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. A value that does not parse is a
    /// configuration error, not silently ignored.
    pub fn apply_overrides<L>(&mut self, lookup: L) -> WorkerResult<()>
    where
        L: Fn(&str) -> Option<String>,
    {
        let env = Overrides { lookup };

        env.set("STAGECUT_ANALYSIS_FPS", &mut self.frames.analysis_fps)?;
        env.set("STAGECUT_ANALYSIS_WIDTH", &mut self.frames.analysis_width)?;
        if let Some(max) = env.get::<f64>("STAGECUT_MAX_SECONDS")? {
            self.frames.max_seconds = Some(max);
        }

        env.set("STAGECUT_MIN_BLOB_AREA", &mut self.detection.min_blob_area)?;
        env.set("STAGECUT_VARIANCE_THRESHOLD", &mut self.detection.variance_threshold)?;

        env.set("STAGECUT_MAX_MATCH_DISTANCE", &mut self.tracking.max_match_distance)?;
        env.set("STAGECUT_MAX_MISSED_FRAMES", &mut self.tracking.max_missed_frames)?;

        env.set("STAGECUT_GAP_TOLERANCE_SECS", &mut self.occupancy.gap_tolerance_secs)?;
        env.set("STAGECUT_MERGE_TOLERANCE_SECS", &mut self.occupancy.merge_tolerance_secs)?;
        env.set("STAGECUT_MIN_DURATION_SECS", &mut self.occupancy.min_duration_secs)?;

        env.set("STAGECUT_SYNC_SAMPLE_RATE", &mut self.sync.sample_rate)?;
        env.set("STAGECUT_EXPECTED_OFFSET_SECS", &mut self.sync.expected_offset_secs)?;
        env.set("STAGECUT_MAX_SEARCH_SECS", &mut self.sync.max_search_secs)?;
        env.set("STAGECUT_MIN_CONFIDENCE", &mut self.sync.min_confidence)?;
        if let Some(strategy) = env.raw("STAGECUT_SYNC_STRATEGY") {
            self.sync.strategy = match strategy.to_ascii_lowercase().as_str() {
                "whole" => SyncStrategy::Whole,
                "chunked" => SyncStrategy::Chunked,
                other => {
                    return Err(WorkerError::config_error(format!(
                        "STAGECUT_SYNC_STRATEGY: unknown strategy '{}'",
                        other
                    )))
                }
            };
        }

        env.set("STAGECUT_LEAD_PADDING_SECS", &mut self.clips.lead_padding_secs)?;
        env.set("STAGECUT_TRAIL_PADDING_SECS", &mut self.clips.trail_padding_secs)?;
        env.set("STAGECUT_ENCODE_TIMEOUT_SECS", &mut self.clips.encode_timeout_secs)?;
        env.set("STAGECUT_MAX_ATTEMPTS", &mut self.clips.max_attempts)?;
        env.set("STAGECUT_MAX_CONCURRENT_ENCODES", &mut self.clips.max_concurrent_encodes)?;
        env.set("STAGECUT_USE_GPU", &mut self.clips.use_gpu)?;
        env.set("STAGECUT_AUDIO_MODE", &mut self.clips.audio_mode)?;
        env.set("STAGECUT_DEINTERLACE", &mut self.clips.deinterlace)?;
        env.set("STAGECUT_REQUIRE_CONFIDENT_SYNC", &mut self.clips.require_confident_sync)?;
        env.set("STAGECUT_CRF", &mut self.clips.encoding.crf)?;

        env.set("STAGECUT_MAX_CONCURRENT_VIDEOS", &mut self.batch.max_concurrent_videos)?;
        env.set("STAGECUT_OUTPUT_DIR", &mut self.batch.output_dir)?;
        if let Some(dir) = env.raw("STAGECUT_TEMP_DIR") {
            self.batch.temp_dir = Some(PathBuf::from(dir));
        }
        env.set("STAGECUT_WRITE_METRICS", &mut self.batch.write_metrics)?;

        Ok(())
    }

    /// Detector, tracker and occupancy settings for the frame pipeline.
    pub fn segmentation(&self) -> SegmentationConfig {
        SegmentationConfig {
            detection: self.detection.clone(),
            tracking: self.tracking.clone(),
            occupancy: self.occupancy.clone(),
        }
    }

    /// Check every section, reporting the first invalid field.
    pub fn validate(&self) -> WorkerResult<()> {
        self.frames.validate().map_err(WorkerError::from_config)?;
        self.segmentation().validate().map_err(WorkerError::from_config)?;
        self.sync.validate().map_err(WorkerError::from_config)?;
        self.clips.validate()?;
        if self.batch.max_concurrent_videos == 0 {
            return Err(WorkerError::config_error(
                "batch.max_concurrent_videos must be >= 1",
            ));
        }
        Ok(())
    }
}

struct Overrides<L> {
    lookup: L,
}

impl<L: Fn(&str) -> Option<String>> Overrides<L> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn get<T: FromStr>(&self, key: &str) -> WorkerResult<Option<T>> {
        match self.raw(key) {
            Some(value) => value.trim().parse().map(Some).map_err(|_| {
                WorkerError::config_error(format!("{}: cannot parse '{}'", key, value))
            }),
            None => Ok(None),
        }
    }

    fn set<T: FromStr>(&self, key: &str, target: &mut T) -> WorkerResult<()> {
        if let Some(value) = self.get(key)? {
            *target = value;
        }
        Ok(())
    }
}
