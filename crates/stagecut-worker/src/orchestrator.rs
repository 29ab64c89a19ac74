//! Turning accepted intervals into encoded clips.
//!
//! For each interval the orchestrator:
//! 1. Pads and clamps the cut window to the file
//! 2. Decides the audio source from the offset and the low-confidence policy
//! 3. Waits for an encode slot on the shared semaphore
//! 4. Encodes with a per-attempt timeout, retrying transient failures
//! 5. Probes the result and compares its duration with the window
//!
//! A clip that still fails after its attempts is recorded as failed; the
//! remaining clips carry on.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use stagecut_media::{EncodeBackend, EncodeJob, MediaError, SyncOutcome};
use stagecut_models::{
    clip_file_name, AudioSource, ClipRecord, ClipWindow, EncodingConfig, PerformanceInterval,
    VideoId,
};

use crate::config::ClipConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::observer::{NoopObserver, PipelineObserver};
use crate::retry::{retry_async, retry_async_if, RetryConfig};

/// Duration tolerance used when the source frame rate is unknown.
const FALLBACK_FRAME_SECS: f64 = 1.0 / 25.0;

/// Facts about one source video needed to cut its clips.
#[derive(Debug, Clone)]
pub struct VideoContext {
    pub video_id: VideoId,
    /// File the clips are cut from (the concatenated file for split recordings)
    pub source: PathBuf,
    pub duration: f64,
    pub fps: f64,
    pub external_audio: Option<PathBuf>,
    pub output_dir: PathBuf,
}

/// Resolved audio for one clip.
#[derive(Debug, Clone, Copy, PartialEq)]
struct AudioPlan {
    source: AudioSource,
    offset_secs: Option<f64>,
    audio_start: Option<f64>,
}

impl AudioPlan {
    const CAMERA: AudioPlan = AudioPlan {
        source: AudioSource::Camera,
        offset_secs: None,
        audio_start: None,
    };
}

/// Drives the encode backend for every accepted interval.
#[derive(Clone)]
pub struct ClipOrchestrator {
    config: ClipConfig,
    encoding: EncodingConfig,
    backend: Arc<dyn EncodeBackend>,
    encode_slots: Arc<Semaphore>,
    observer: Arc<dyn PipelineObserver>,
}

impl ClipOrchestrator {
    /// `encode_slots` is shared by every orchestrator that should count
    /// against the same encode limit.
    pub fn new(
        config: ClipConfig,
        backend: Arc<dyn EncodeBackend>,
        encode_slots: Arc<Semaphore>,
    ) -> Self {
        Self {
            encoding: config.encoding.clone(),
            config,
            backend,
            encode_slots,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Override the encoding settings (e.g. after NVENC detection).
    pub fn with_encoding(mut self, encoding: EncodingConfig) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &ClipConfig {
        &self.config
    }

    /// Extract one clip per interval, concurrently up to the encode limit.
    ///
    /// Intervals must be ordered by start and must not overlap; anything else
    /// is rejected before any encode starts. Records come back in interval
    /// order and include failed clips.
    pub async fn extract_all(
        &self,
        ctx: &VideoContext,
        intervals: &[PerformanceInterval],
        sync: Option<&SyncOutcome>,
    ) -> WorkerResult<Vec<ClipRecord>> {
        if !PerformanceInterval::is_ordered_and_disjoint(intervals) {
            return Err(WorkerError::config_error(format!(
                "{}: intervals must be ordered by start and non-overlapping",
                ctx.video_id
            )));
        }

        let clips = join_all(
            intervals
                .iter()
                .enumerate()
                .map(|(i, interval)| self.extract(ctx, i + 1, interval, sync)),
        )
        .await;

        let failed = clips.iter().filter(|c| !c.is_completed()).count();
        info!(
            video_id = %ctx.video_id,
            clips = clips.len(),
            failed,
            "Clip extraction finished"
        );
        Ok(clips)
    }

    /// Extract the clip for the `index`th (1-based) interval.
    pub async fn extract(
        &self,
        ctx: &VideoContext,
        index: usize,
        interval: &PerformanceInterval,
        sync: Option<&SyncOutcome>,
    ) -> ClipRecord {
        let window = ClipWindow::padded(
            interval,
            self.config.lead_padding_secs,
            self.config.trail_padding_secs,
            ctx.duration,
        );
        let output = ctx.output_dir.join(clip_file_name(&ctx.video_id, index));
        let mut record = ClipRecord::pending(
            ctx.video_id.clone(),
            index,
            interval.clone(),
            window,
            output.clone(),
        );

        if window.duration() <= 0.0 {
            warn!(
                video_id = %ctx.video_id,
                interval_index = index,
                start = window.start,
                end = window.end,
                "Clip window is empty"
            );
            record.mark_failed(0, "clip window is empty after clamping to the video");
            metrics::record_clip_failed();
            self.observer.on_clip_finished(&record);
            return record;
        }

        let plan = self.audio_plan(ctx, index, &window, sync);
        record.audio_source = plan.source;
        record.offset_secs = plan.offset_secs;

        let job = EncodeJob {
            source: ctx.source.clone(),
            external_audio: if plan.source.uses_external() {
                ctx.external_audio.clone()
            } else {
                None
            },
            window,
            audio_start: plan.audio_start,
            audio_source: plan.source,
            mix: self.config.mix,
            deinterlace: self.config.deinterlace,
            encoding: self.encoding.clone(),
            output,
        };

        let result = {
            let Ok(_permit) = self.encode_slots.acquire().await else {
                record.mark_failed(0, "encoder pool is closed");
                metrics::record_clip_failed();
                self.observer.on_clip_finished(&record);
                return record;
            };
            self.encode_with_retry(ctx, index, &job).await
        };

        let attempts = result.attempts();
        match result.into_result() {
            Ok(()) => {
                self.verify_duration(&mut record, ctx.fps).await;
                record.mark_completed(attempts);
                metrics::record_clip_completed(record.audio_source);
                info!(
                    video_id = %ctx.video_id,
                    interval_index = index,
                    attempts,
                    output = %record.output_path.display(),
                    "Clip encoded"
                );
            }
            Err(e) => {
                error!(
                    video_id = %ctx.video_id,
                    interval_index = index,
                    attempts,
                    error = %e,
                    "Clip failed"
                );
                let failure =
                    WorkerError::encode_failure(format!("{} attempt(s): {}", attempts, e));
                record.mark_failed(attempts, failure.to_string());
                metrics::record_clip_failed();
            }
        }

        self.observer.on_clip_finished(&record);
        record
    }

    async fn encode_with_retry(
        &self,
        ctx: &VideoContext,
        index: usize,
        job: &EncodeJob,
    ) -> crate::retry::RetryResult<(), WorkerError> {
        let retry = RetryConfig::new(format!("encode {} clip {}", ctx.video_id, index))
            .with_max_attempts(self.config.max_attempts)
            .with_base_delay(Duration::from_millis(self.config.retry_base_delay_ms))
            .with_max_delay(Duration::from_millis(self.config.retry_max_delay_ms));
        let timeout = self.config.encode_timeout();
        let backend = &self.backend;

        retry_async_if(&retry, WorkerError::is_retryable, |attempt| async move {
            debug!(
                video_id = %ctx.video_id,
                interval_index = index,
                attempt,
                "Encode attempt"
            );
            let started = Instant::now();
            let outcome = match tokio::time::timeout(timeout, backend.encode(job, timeout)).await {
                Ok(result) => result.map_err(WorkerError::from),
                Err(_) => Err(MediaError::Timeout(timeout).into()),
            };

            match &outcome {
                Ok(()) => {
                    metrics::record_encode_attempt("ok");
                    metrics::record_encode_duration(started.elapsed().as_secs_f64());
                }
                Err(e) if e.is_retryable() => metrics::record_encode_attempt("transient"),
                Err(_) => metrics::record_encode_attempt("permanent"),
            }
            outcome
        })
        .await
    }

    /// Decide where a clip's audio comes from.
    fn audio_plan(
        &self,
        ctx: &VideoContext,
        index: usize,
        window: &ClipWindow,
        sync: Option<&SyncOutcome>,
    ) -> AudioPlan {
        if ctx.external_audio.is_none() {
            return AudioPlan::CAMERA;
        }
        let Some(outcome) = sync else {
            warn!(
                video_id = %ctx.video_id,
                interval_index = index,
                "No audio offset available, using camera audio"
            );
            return AudioPlan::CAMERA;
        };

        let offset = outcome.offset();
        if !outcome.is_confident() {
            if self.config.require_confident_sync {
                warn!(
                    video_id = %ctx.video_id,
                    interval_index = index,
                    confidence = offset.confidence,
                    "Low-confidence offset not applied, using camera audio"
                );
                return AudioPlan::CAMERA;
            }
            warn!(
                video_id = %ctx.video_id,
                interval_index = index,
                offset_secs = offset.offset_secs,
                confidence = offset.confidence,
                "Applying low-confidence audio offset"
            );
        }

        let audio_start = offset.to_mic_time(window.start);
        if audio_start < 0.0 {
            warn!(
                video_id = %ctx.video_id,
                interval_index = index,
                audio_start,
                "External recording starts after this clip, using camera audio"
            );
            return AudioPlan::CAMERA;
        }

        AudioPlan {
            source: self.config.audio_mode.audio_source(),
            offset_secs: Some(offset.offset_secs),
            audio_start: Some(audio_start),
        }
    }

    /// Probe the encoded clip and flag a duration off by more than one frame.
    async fn verify_duration(&self, record: &mut ClipRecord, fps: f64) {
        let path = record.output_path.clone();
        let retry = RetryConfig::new(format!("probe {}", path.display()))
            .with_max_attempts(2)
            .with_base_delay(Duration::from_millis(200));

        let probed = retry_async(&retry, |_| self.backend.probe_duration(&path))
            .await
            .into_result();

        match probed {
            Ok(duration) => {
                record.output_duration = Some(duration);
                let tolerance = if fps.is_finite() && fps > 0.0 {
                    1.0 / fps
                } else {
                    FALLBACK_FRAME_SECS
                };
                let expected = record.window.duration();
                if (duration - expected).abs() > tolerance + 1e-6 {
                    warn!(
                        video_id = %record.video_id,
                        interval_index = record.index,
                        expected,
                        actual = duration,
                        tolerance,
                        "Clip duration differs from its window"
                    );
                    record.duration_mismatch = true;
                }
            }
            Err(e) => warn!(
                video_id = %record.video_id,
                interval_index = record.index,
                error = %e,
                "Could not probe encoded clip"
            ),
        }
    }
}
