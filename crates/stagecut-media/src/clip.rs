//! Clip encoding.
//!
//! One FFmpeg invocation per clip: the camera video is cut to the padded
//! window, optionally deinterlaced, and its audio is either kept, mixed with
//! the offset-aligned external recording, or replaced by it.
//!
//! ```text
//! -ss start -i video  [-ss mic_start -i mic]  -t duration
//!     [0:v] yadif                       -> [vout]
//!     [0:a] volume=g0 ┐
//!     [1:a] volume=g1 ┴ amix            -> [aout]
//! ```
//!
//! Encoders write to a `.partial` sibling that is moved into place only
//! after FFmpeg succeeds.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, trace, warn};

use stagecut_models::{AudioSource, ClipWindow, EncodingConfig};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{move_file, partial_path, remove_if_exists};
use crate::probe::get_duration;

/// Fixed gains applied when mixing camera audio with the external recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioMix {
    pub camera_gain: f64,
    pub external_gain: f64,
}

impl Default for AudioMix {
    fn default() -> Self {
        Self {
            camera_gain: 0.6,
            external_gain: 1.5,
        }
    }
}

/// Everything needed to encode one clip.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub source: PathBuf,
    pub external_audio: Option<PathBuf>,
    pub window: ClipWindow,
    /// Start of the clip on the external recording's timeline
    pub audio_start: Option<f64>,
    pub audio_source: AudioSource,
    pub mix: AudioMix,
    pub deinterlace: bool,
    pub encoding: EncodingConfig,
    pub output: PathBuf,
}

impl EncodeJob {
    /// External input and its start time when the clip uses it.
    fn external_input(&self) -> MediaResult<Option<(&Path, f64)>> {
        if !self.audio_source.uses_external() {
            return Ok(None);
        }
        match (self.external_audio.as_deref(), self.audio_start) {
            (Some(path), Some(start)) if start >= 0.0 => Ok(Some((path, start))),
            _ => Err(MediaError::invalid_config(format!(
                "audio source {:?} needs an external recording and a non-negative start",
                self.audio_source
            ))),
        }
    }
}

/// Build the FFmpeg command encoding `job` into `output`.
pub fn build_encode_command(job: &EncodeJob, output: &Path) -> MediaResult<FfmpegCommand> {
    let external = job.external_input()?;

    let mut cmd = FfmpegCommand::new(&job.source, output).seek(job.window.start);
    if let Some((path, start)) = external {
        cmd = cmd.add_input(path).seek(start);
    }
    cmd = cmd.duration(job.window.duration());

    let mut graph: Vec<String> = Vec::new();
    let video_label = if job.deinterlace {
        graph.push("[0:v]yadif[vout]".to_string());
        "[vout]"
    } else {
        "0:v:0"
    };

    let audio_label = match job.audio_source {
        AudioSource::Mixed => {
            graph.push(format!("[0:a]volume={}[a0]", job.mix.camera_gain));
            graph.push(format!("[1:a]volume={}[a1]", job.mix.external_gain));
            graph.push("[a0][a1]amix=inputs=2:duration=first[aout]".to_string());
            "[aout]"
        }
        AudioSource::Replaced => "1:a:0",
        AudioSource::Camera => "0:a?",
    };

    if !graph.is_empty() {
        cmd = cmd.filter_complex(graph.join(";"));
    }

    Ok(cmd
        .map(video_label)
        .map(audio_label)
        .output_args(job.encoding.output_args())
        .output_args(["-movflags", "+faststart"]))
}

/// Seam between the orchestrator and the encoder.
#[async_trait]
pub trait EncodeBackend: Send + Sync {
    /// Encode one clip to `job.output`, failing with [`MediaError::Timeout`]
    /// after `timeout`.
    async fn encode(&self, job: &EncodeJob, timeout: Duration) -> MediaResult<()>;

    /// Duration of an encoded file.
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64>;
}

/// Encodes with the `ffmpeg` CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EncodeBackend for FfmpegBackend {
    async fn encode(&self, job: &EncodeJob, timeout: Duration) -> MediaResult<()> {
        if !job.source.exists() {
            return Err(MediaError::FileNotFound(job.source.clone()));
        }
        if let Some(parent) = job.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = partial_path(&job.output);
        remove_if_exists(&partial).await?;
        let cmd = build_encode_command(job, &partial)?;

        info!(
            output = %job.output.display(),
            start = job.window.start,
            duration = job.window.duration(),
            audio_source = ?job.audio_source,
            encoder = %job.encoding.encoder,
            "Encoding clip"
        );

        let runner = FfmpegRunner::new().with_timeout(timeout);
        let total = job.window.duration();
        let result = runner
            .run_with_progress(&cmd, move |p| {
                trace!(fraction = p.fraction(total), speed = ?p.speed, "Encode progress");
            })
            .await;

        if let Err(e) = result {
            if let Err(cleanup) = remove_if_exists(&partial).await {
                warn!(path = %partial.display(), error = %cleanup, "Failed to remove partial output");
            }
            return Err(e);
        }

        move_file(&partial, &job.output).await
    }

    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        get_duration(path).await
    }
}

/// Whether an NVIDIA GPU is usable for NVENC.
pub async fn detect_nvenc() -> bool {
    if which::which("nvidia-smi").is_err() {
        return false;
    }
    match Command::new("nvidia-smi").output().await {
        Ok(output) => output.status.success(),
        Err(e) => {
            debug!(error = %e, "nvidia-smi failed to run");
            false
        }
    }
}

/// Switch `base` to NVENC when `use_gpu` is set and a GPU is available.
pub async fn resolve_encoding(base: &EncodingConfig, use_gpu: bool) -> EncodingConfig {
    if !use_gpu {
        return base.clone();
    }
    if detect_nvenc().await {
        info!("NVIDIA GPU detected, encoding with NVENC");
        base.clone().with_nvenc()
    } else {
        warn!("GPU encoding requested but no NVIDIA GPU found, using {}", base.encoder);
        base.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(audio_source: AudioSource, deinterlace: bool) -> EncodeJob {
        EncodeJob {
            source: PathBuf::from("show.mp4"),
            external_audio: Some(PathBuf::from("mic.wav")),
            window: ClipWindow {
                start: 29.0,
                end: 76.0,
            },
            audio_start: Some(41.5),
            audio_source,
            mix: AudioMix::default(),
            deinterlace,
            encoding: EncodingConfig::default(),
            output: PathBuf::from("out/show_performance_1.mp4"),
        }
    }

    fn arg_after<'a>(args: &'a [String], flag: &str) -> Vec<&'a str> {
        args.windows(2)
            .filter(|w| w[0] == flag)
            .map(|w| w[1].as_str())
            .collect()
    }

    #[test]
    fn test_mixed_audio_graph() {
        let cmd = build_encode_command(&job(AudioSource::Mixed, true), Path::new("o.mp4")).unwrap();
        let args = cmd.build_args();

        assert_eq!(arg_after(&args, "-ss"), vec!["29.000", "41.500"]);
        assert_eq!(arg_after(&args, "-t"), vec!["47.000"]);
        assert_eq!(
            arg_after(&args, "-filter_complex"),
            vec!["[0:v]yadif[vout];[0:a]volume=0.6[a0];[1:a]volume=1.5[a1];[a0][a1]amix=inputs=2:duration=first[aout]"]
        );
        assert_eq!(arg_after(&args, "-map"), vec!["[vout]", "[aout]"]);
        assert!(args.contains(&"libx264".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("o.mp4"));
    }

    #[test]
    fn test_replaced_audio_maps_external_track() {
        let cmd =
            build_encode_command(&job(AudioSource::Replaced, false), Path::new("o.mp4")).unwrap();
        let args = cmd.build_args();

        assert!(arg_after(&args, "-filter_complex").is_empty());
        assert_eq!(arg_after(&args, "-map"), vec!["0:v:0", "1:a:0"]);
        assert_eq!(arg_after(&args, "-i"), vec!["show.mp4", "mic.wav"]);
    }

    #[test]
    fn test_camera_audio_uses_single_input() {
        let mut camera = job(AudioSource::Camera, true);
        camera.external_audio = None;
        camera.audio_start = None;
        let args = build_encode_command(&camera, Path::new("o.mp4"))
            .unwrap()
            .build_args();

        assert_eq!(arg_after(&args, "-i"), vec!["show.mp4"]);
        assert_eq!(arg_after(&args, "-filter_complex"), vec!["[0:v]yadif[vout]"]);
        assert_eq!(arg_after(&args, "-map"), vec!["[vout]", "0:a?"]);
    }

    #[test]
    fn test_external_audio_without_start_is_rejected() {
        let mut bad = job(AudioSource::Mixed, true);
        bad.audio_start = Some(-0.5);
        assert!(matches!(
            build_encode_command(&bad, Path::new("o.mp4")),
            Err(MediaError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_source_is_not_transient() {
        let dir = tempfile::tempdir().unwrap();
        let mut missing = job(AudioSource::Camera, false);
        missing.source = dir.path().join("absent.mp4");
        missing.output = dir.path().join("out.mp4");

        let err = FfmpegBackend::new()
            .encode(&missing, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_resolve_encoding_without_gpu_keeps_base() {
        let base = EncodingConfig::default();
        assert_eq!(resolve_encoding(&base, false).await, base);
    }
}
