//! Constant offset between an external microphone and a camera's audio.
//!
//! Both tracks are reduced to short-time RMS envelopes and compared with a
//! normalized cross-correlation over a bounded lag window. The envelope peak
//! gives the coarse offset and the confidence; a sample-level correlation of
//! the most energetic camera excerpt refines it.
//!
//! ```text
//! camera  ──extract──► envelope ──┐
//!                                 ├─► NCC (coarse) ──► refine ──► SyncOutcome
//! mic     ──extract──► envelope ──┘
//! ```

mod config;
mod consensus;
mod correlate;
mod envelope;
mod extract;

use std::ops::{Range, RangeInclusive};
use std::path::{Path, PathBuf};

use stagecut_models::{AudioOffset, SyncMethod};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::MediaError;

pub use config::{SyncConfig, SyncStrategy};
pub use consensus::{consensus_offset, Consensus};
pub use correlate::{ncc_peak, Peak};
pub use envelope::{hop_size, rms_envelope, EnvelopeBuilder};
pub use extract::{extract_envelope, extract_window, TrackEnvelope};

/// Result type for synchronization.
pub type SyncResult<T> = Result<T, SyncError>;

/// Hard synchronization failures.
///
/// A weak correlation is not an error; see [`SyncOutcome::LowConfidence`].
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No audio stream in {0}")]
    NoAudioStream(PathBuf),

    #[error("{track} audio is {seconds:.1}s long, at least {required:.1}s required")]
    TooShort {
        track: &'static str,
        seconds: f64,
        required: f64,
    },

    #[error("No correlation peak within the search window")]
    NoPeak,

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Offset estimate, split by whether the peak cleared `min_confidence`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutcome {
    Confident(AudioOffset),
    LowConfidence(AudioOffset),
}

impl SyncOutcome {
    pub fn offset(&self) -> &AudioOffset {
        match self {
            Self::Confident(offset) | Self::LowConfidence(offset) => offset,
        }
    }

    pub fn into_offset(self) -> AudioOffset {
        match self {
            Self::Confident(offset) | Self::LowConfidence(offset) => offset,
        }
    }

    pub fn is_confident(&self) -> bool {
        matches!(self, Self::Confident(_))
    }
}

/// Estimates the offset of an external recording against a video's audio.
#[derive(Debug, Clone, Default)]
pub struct AudioSynchronizer {
    config: SyncConfig,
}

impl AudioSynchronizer {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Estimate `mic_time - video_time` from the two files.
    ///
    /// Both tracks are decoded straight to envelopes for the coarse pass;
    /// only the two short windows the refinement correlates are decoded to
    /// samples.
    pub async fn estimate_offset(
        &self,
        external_audio: &Path,
        video: &Path,
    ) -> SyncResult<SyncOutcome> {
        self.config.validate()?;
        let rate = self.config.sample_rate;
        let hop = hop_size(rate, self.config.envelope_rate);

        let (camera, external) = tokio::try_join!(
            extract_envelope(video, rate, hop),
            extract_envelope(external_audio, rate, hop)
        )?;
        check_length("camera", camera.samples, &self.config)?;
        check_length("external", external.samples, &self.config)?;

        let config = self.config.clone();
        let (coarse, plan) = tokio::task::spawn_blocking(move || {
            let coarse = coarse_offset(&camera.values, &external.values, &config)?;
            let plan = plan_refinement(
                &camera.values,
                camera.samples as i64,
                external.samples as i64,
                coarse.lag * hop as i64,
                refine_window(&config),
                hop,
            );
            Ok::<_, SyncError>((coarse, plan))
        })
        .await
        .map_err(|e| SyncError::Internal(format!("sync task failed: {}", e)))??;

        let coarse_samples = coarse.lag * hop as i64;
        let refined = match plan {
            Some(plan) => self.refine_from_files(video, external_audio, plan).await,
            None => None,
        };
        let offset_samples = refined.unwrap_or_else(|| {
            debug!(coarse_lag = coarse.lag, "Sample-level refinement unavailable, keeping coarse offset");
            coarse_samples
        });
        Ok(outcome(offset_samples, &coarse, &self.config))
    }

    async fn refine_from_files(
        &self,
        video: &Path,
        external_audio: &Path,
        plan: RefinePlan,
    ) -> Option<i64> {
        let rate = self.config.sample_rate;
        let windows = tokio::try_join!(
            extract_window(video, rate, plan.camera.clone()),
            extract_window(external_audio, rate, plan.external.clone())
        );
        let (excerpt, slice) = match windows {
            Ok(windows) => windows,
            Err(e) => {
                warn!("Could not decode refinement windows: {}", e);
                return None;
            }
        };

        tokio::task::spawn_blocking(move || plan.refine(&excerpt, &slice))
            .await
            .ok()
            .flatten()
    }
}

/// Estimate the offset from decoded mono tracks at `config.sample_rate`.
///
/// Pure and deterministic: the same samples and configuration always give
/// the same outcome.
pub fn estimate_from_samples(
    camera: &[f32],
    external: &[f32],
    config: &SyncConfig,
) -> SyncResult<SyncOutcome> {
    config.validate()?;
    check_length("camera", camera.len() as u64, config)?;
    check_length("external", external.len() as u64, config)?;

    let hop = hop_size(config.sample_rate, config.envelope_rate);
    let camera_env = rms_envelope(camera, hop);
    let external_env = rms_envelope(external, hop);
    let coarse = coarse_offset(&camera_env, &external_env, config)?;

    let coarse_samples = coarse.lag * hop as i64;
    let refined = plan_refinement(
        &camera_env,
        camera.len() as i64,
        external.len() as i64,
        coarse_samples,
        refine_window(config),
        hop,
    )
    .and_then(|plan| {
        let excerpt = camera.get(plan.camera.clone())?;
        let slice = external.get(plan.external.clone())?;
        plan.refine(excerpt, slice)
    });

    let offset_samples = refined.unwrap_or_else(|| {
        debug!(coarse_lag = coarse.lag, "Sample-level refinement unavailable, keeping coarse offset");
        coarse_samples
    });
    Ok(outcome(offset_samples, &coarse, config))
}

fn check_length(track: &'static str, samples: u64, config: &SyncConfig) -> SyncResult<()> {
    let seconds = samples as f64 / config.sample_rate as f64;
    if seconds < config.min_overlap_secs {
        return Err(SyncError::TooShort {
            track,
            seconds,
            required: config.min_overlap_secs,
        });
    }
    Ok(())
}

/// Envelope-level estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Coarse {
    /// In envelope hops
    lag: i64,
    confidence: f64,
    method: SyncMethod,
}

fn coarse_offset(
    camera_env: &[f32],
    external_env: &[f32],
    config: &SyncConfig,
) -> SyncResult<Coarse> {
    let hop = hop_size(config.sample_rate, config.envelope_rate);
    let hop_secs = hop as f64 / config.sample_rate as f64;
    let lags = lag_range(config, hop_secs);
    let min_overlap = (config.min_overlap_secs / hop_secs).ceil() as usize;

    match config.strategy {
        SyncStrategy::Whole => {
            let peak =
                ncc_peak(external_env, camera_env, lags, min_overlap).ok_or(SyncError::NoPeak)?;
            Ok(Coarse {
                lag: peak.lag,
                confidence: peak.score,
                method: SyncMethod::Whole,
            })
        }
        SyncStrategy::Chunked => {
            let consensus =
                chunked_consensus(external_env, camera_env, lags, min_overlap, hop_secs, config)?;
            Ok(Coarse {
                lag: (consensus.offset_secs / hop_secs).round() as i64,
                confidence: consensus.confidence,
                method: SyncMethod::Chunked,
            })
        }
    }
}

fn refine_window(config: &SyncConfig) -> usize {
    (config.refine_window_secs * config.sample_rate as f64).round() as usize
}

fn outcome(offset_samples: i64, coarse: &Coarse, config: &SyncConfig) -> SyncOutcome {
    let confidence = coarse.confidence;
    let offset = AudioOffset {
        offset_secs: offset_samples as f64 / config.sample_rate as f64,
        confidence,
        sample_rate: config.sample_rate,
        method: coarse.method,
        low_confidence: confidence < config.min_confidence,
    };

    if offset.low_confidence {
        warn!(
            offset_secs = offset.offset_secs,
            confidence,
            min_confidence = config.min_confidence,
            "Audio offset has low confidence"
        );
        SyncOutcome::LowConfidence(offset)
    } else {
        info!(
            offset_secs = offset.offset_secs,
            confidence,
            method = ?coarse.method,
            "Audio offset estimated"
        );
        SyncOutcome::Confident(offset)
    }
}

/// Envelope lags covering `expected ± max_search`.
fn lag_range(config: &SyncConfig, hop_secs: f64) -> RangeInclusive<i64> {
    let lo = ((config.expected_offset_secs - config.max_search_secs) / hop_secs).floor() as i64;
    let hi = ((config.expected_offset_secs + config.max_search_secs) / hop_secs).ceil() as i64;
    lo..=hi
}

fn chunked_consensus(
    external_env: &[f32],
    camera_env: &[f32],
    lags: RangeInclusive<i64>,
    min_overlap: usize,
    hop_secs: f64,
    config: &SyncConfig,
) -> SyncResult<Consensus> {
    let len = camera_env.len();
    if len == 0 {
        return Err(SyncError::NoPeak);
    }
    let chunk_len = ((config.chunk_secs / hop_secs).round() as usize).clamp(1, len);
    let span = len - chunk_len;

    let mut starts: Vec<usize> = if config.chunk_count == 1 {
        vec![span / 2]
    } else {
        (0..config.chunk_count)
            .map(|k| k * span / (config.chunk_count - 1))
            .collect()
    };
    starts.dedup();

    let mut estimates = Vec::with_capacity(starts.len());
    for start in starts {
        let chunk = &camera_env[start..start + chunk_len];
        let shift = start as i64;
        let chunk_lags = (*lags.start() + shift)..=(*lags.end() + shift);

        match ncc_peak(external_env, chunk, chunk_lags, min_overlap.min(chunk_len)) {
            Some(peak) => {
                let offset_secs = (peak.lag - shift) as f64 * hop_secs;
                debug!(
                    chunk_start_secs = start as f64 * hop_secs,
                    offset_secs,
                    score = peak.score,
                    "Chunk correlated"
                );
                estimates.push((offset_secs, peak.score));
            }
            None => debug!(
                chunk_start_secs = start as f64 * hop_secs,
                "Chunk has no usable peak"
            ),
        }
    }

    let consensus = consensus_offset(&estimates, config.consensus_tolerance_secs)
        .ok_or(SyncError::NoPeak)?;
    debug!(
        members = consensus.members,
        chunks = estimates.len(),
        offset_secs = consensus.offset_secs,
        "Chunk consensus"
    );
    Ok(consensus)
}

/// Sample ranges correlated to refine a coarse offset: the most energetic
/// camera excerpt, and the external samples it can land on within two
/// envelope hops of the coarse position.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RefinePlan {
    camera: Range<usize>,
    external: Range<usize>,
    coarse: i64,
    margin: i64,
}

/// Plan the refinement of `coarse` (in samples) with an excerpt of up to
/// `window` samples. `None` when the tracks overlap too little.
fn plan_refinement(
    camera_env: &[f32],
    cam_len: i64,
    ext_len: i64,
    coarse: i64,
    window: usize,
    hop: usize,
) -> Option<RefinePlan> {
    // Camera samples whose counterpart exists in the external track
    let valid_start = (-coarse).max(0);
    let valid_end = cam_len.min(ext_len - coarse);
    if valid_end - valid_start < (window / 2).max(1) as i64 {
        return None;
    }
    let window = (window as i64).min(valid_end - valid_start) as usize;

    let env_first = (valid_start as usize).div_ceil(hop);
    let env_window = (window / hop).max(1);
    let env_last = (valid_end as usize / hop)
        .min(camera_env.len())
        .checked_sub(env_window)?;
    if env_last < env_first {
        return None;
    }

    let start = loudest_window(camera_env, env_first, env_last, env_window) * hop;
    if (start + window) as i64 > cam_len {
        return None;
    }

    let margin = 2 * hop as i64;
    let centre = start as i64 + coarse;
    let slice_start = (centre - margin).max(0);
    let slice_end = (centre + window as i64 + margin).min(ext_len);
    if slice_end <= slice_start {
        return None;
    }

    Some(RefinePlan {
        camera: start..start + window,
        external: slice_start as usize..slice_end as usize,
        coarse,
        margin,
    })
}

impl RefinePlan {
    /// Refined offset in samples from the decoded `excerpt` and `slice`.
    fn refine(&self, excerpt: &[f32], slice: &[f32]) -> Option<i64> {
        let window = self.camera.len();
        if excerpt.len() < (window / 2).max(1) {
            return None;
        }
        let start = self.camera.start as i64;
        let slice_start = self.external.start as i64;
        let local = start + self.coarse - slice_start;
        let peak = ncc_peak(
            slice,
            excerpt,
            (local - self.margin)..=(local + self.margin),
            (window / 2).max(1),
        )?;
        Some(slice_start + peak.lag - start)
    }
}

/// Start index in `first..=last` of the `len`-value envelope window with the
/// most energy. Ties resolve to the earliest window.
fn loudest_window(envelope: &[f32], first: usize, last: usize, len: usize) -> usize {
    let mut prefix = Vec::with_capacity(envelope.len() + 1);
    prefix.push(0.0f64);
    let mut acc = 0.0f64;
    for &v in envelope {
        acc += (v as f64) * (v as f64);
        prefix.push(acc);
    }

    let mut best = (first, f64::NEG_INFINITY);
    for s in first..=last {
        let end = (s + len).min(envelope.len());
        let energy = prefix[end] - prefix[s.min(end)];
        if energy > best.1 {
            best = (s, energy);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 8000;

    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> f32 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (self.0 >> 33) as f32 / (1u64 << 31) as f32
        }
    }

    /// Noise whose loudness changes every quarter second.
    fn bursty_scene(seconds: usize, seed: u64) -> Vec<f32> {
        let mut rng = Lcg(seed);
        let burst = RATE as usize / 4;
        let mut out = Vec::with_capacity(seconds * RATE as usize);
        let mut gain = 0.0;
        for i in 0..seconds * RATE as usize {
            if i % burst == 0 {
                let g = rng.next();
                gain = g * g;
            }
            out.push((rng.next() - 0.5) * gain);
        }
        out
    }

    fn test_config() -> SyncConfig {
        SyncConfig {
            sample_rate: RATE,
            max_search_secs: 20.0,
            min_overlap_secs: 5.0,
            refine_window_secs: 4.0,
            ..Default::default()
        }
    }

    /// Camera hears the scene from 2.5 s in, the mic from the start, so a
    /// sound at video time t is at mic time t + 2.5.
    fn shifted_pair() -> (Vec<f32>, Vec<f32>) {
        let scene = bursty_scene(60, 42);
        let shift = (2.5 * RATE as f64) as usize;
        let mut noise = Lcg(7);
        let camera: Vec<f32> = scene[shift..shift + 30 * RATE as usize]
            .iter()
            .map(|s| s * 0.5 + (noise.next() - 0.5) * 0.01)
            .collect();
        let external = scene[..50 * RATE as usize].to_vec();
        (camera, external)
    }

    #[test]
    fn test_whole_strategy_recovers_offset() {
        let (camera, external) = shifted_pair();
        let outcome = estimate_from_samples(&camera, &external, &test_config()).unwrap();

        assert!(outcome.is_confident());
        let offset = outcome.offset();
        assert!((offset.offset_secs - 2.5).abs() < 1e-3, "got {}", offset.offset_secs);
        assert!(offset.confidence > 0.9);
        assert_eq!(offset.method, SyncMethod::Whole);
        assert_eq!(offset.sample_rate, RATE);
    }

    #[test]
    fn test_chunked_strategy_recovers_offset() {
        let (camera, external) = shifted_pair();
        let config = SyncConfig {
            strategy: SyncStrategy::Chunked,
            chunk_count: 4,
            chunk_secs: 6.0,
            ..test_config()
        };
        let outcome = estimate_from_samples(&camera, &external, &config).unwrap();

        assert!(outcome.is_confident());
        assert!((outcome.offset().offset_secs - 2.5).abs() < 1e-3);
        assert_eq!(outcome.offset().method, SyncMethod::Chunked);
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let (camera, external) = shifted_pair();
        let a = estimate_from_samples(&camera, &external, &test_config()).unwrap();
        let b = estimate_from_samples(&camera, &external, &test_config()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unrelated_audio_is_low_confidence() {
        let camera = bursty_scene(30, 1);
        // Steady noise shares no loudness pattern with the camera
        let mut rng = Lcg(99);
        let external: Vec<f32> = (0..40 * RATE as usize).map(|_| rng.next() - 0.5).collect();
        let config = SyncConfig {
            min_overlap_secs: 10.0,
            ..test_config()
        };

        let outcome = estimate_from_samples(&camera, &external, &config).unwrap();
        assert!(!outcome.is_confident());
        assert!(outcome.offset().low_confidence);
    }

    #[test]
    fn test_short_track_is_rejected() {
        let camera = bursty_scene(2, 3);
        let external = bursty_scene(30, 4);
        let err = estimate_from_samples(&camera, &external, &test_config()).unwrap_err();
        assert!(matches!(err, SyncError::TooShort { track: "camera", .. }));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SyncConfig {
            chunk_count: 0,
            ..test_config()
        };
        let err = estimate_from_samples(&[0.0; 10], &[0.0; 10], &config).unwrap_err();
        assert!(matches!(err, SyncError::Media(MediaError::InvalidConfig(_))));
    }

    #[test]
    fn test_lag_range_is_centred_on_expected_offset() {
        let config = SyncConfig {
            expected_offset_secs: 5.0,
            max_search_secs: 1.0,
            ..Default::default()
        };
        assert_eq!(lag_range(&config, 0.5), 8..=12);
    }

    #[test]
    fn test_windowed_refinement_matches_in_memory_estimate() {
        let (camera, external) = shifted_pair();
        let config = test_config();
        let hop = hop_size(config.sample_rate, config.envelope_rate);

        // What the file path sees: envelopes built from streamed chunks
        let mut camera_env = EnvelopeBuilder::new(hop);
        camera.chunks(4093).for_each(|c| camera_env.extend(c));
        let mut external_env = EnvelopeBuilder::new(hop);
        external.chunks(4093).for_each(|c| external_env.extend(c));
        let (camera_env, external_env) = (camera_env.finish(), external_env.finish());

        let coarse = coarse_offset(&camera_env, &external_env, &config).unwrap();
        let plan = plan_refinement(
            &camera_env,
            camera.len() as i64,
            external.len() as i64,
            coarse.lag * hop as i64,
            refine_window(&config),
            hop,
        )
        .unwrap();
        assert_eq!(plan.camera.len(), refine_window(&config));
        assert!(plan.external.len() <= plan.camera.len() + 4 * hop);

        // Only the planned windows are decoded
        let excerpt = camera[plan.camera.clone()].to_vec();
        let slice = external[plan.external.clone()].to_vec();
        let refined = plan.refine(&excerpt, &slice).unwrap();

        let expected = estimate_from_samples(&camera, &external, &config).unwrap();
        assert_eq!(outcome(refined, &coarse, &config), expected);
        assert!((refined as f64 / RATE as f64 - 2.5).abs() < 1e-3);
    }

    #[test]
    fn test_short_decoded_window_keeps_coarse_offset() {
        let plan = RefinePlan {
            camera: 1000..5000,
            external: 900..5100,
            coarse: 0,
            margin: 100,
        };
        assert!(plan.refine(&[0.0; 100], &[0.0; 4200]).is_none());
    }

    #[test]
    fn test_loudest_window() {
        let env = [0.1, 0.1, 0.9, 0.8, 0.1, 0.1];
        assert_eq!(loudest_window(&env, 0, 4, 2), 2);
        assert_eq!(loudest_window(&env, 3, 4, 2), 3);
    }
}
