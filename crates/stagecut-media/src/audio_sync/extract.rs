//! Decoding audio tracks to mono f32 samples.
//!
//! FFmpeg writes raw little-endian f32 to stdout. Whole tracks are only ever
//! reduced to an envelope on the fly; sample data is kept for short windows.

use std::ops::Range;
use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tracing::debug;

use super::envelope::EnvelopeBuilder;
use super::SyncError;
use crate::command::{check_ffmpeg, collect_stderr_tail, create_ffmpeg_command};
use crate::error::MediaError;
use crate::probe::probe_media;

/// Bytes read from the decoder at a time.
const READ_CHUNK: usize = 64 * 1024;

/// RMS envelope of a whole track plus its decoded length.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEnvelope {
    pub values: Vec<f32>,
    /// Mono samples decoded at the requested rate
    pub samples: u64,
}

impl TrackEnvelope {
    pub fn seconds(&self, sample_rate: u32) -> f64 {
        self.samples as f64 / sample_rate as f64
    }
}

/// Decode the first audio stream of `input` at `sample_rate` straight into
/// an RMS envelope of `hop` samples per value.
pub async fn extract_envelope(
    input: &Path,
    sample_rate: u32,
    hop: usize,
) -> Result<TrackEnvelope, SyncError> {
    let info = probe_media(input).await?;
    if info.audio.is_none() {
        return Err(SyncError::NoAudioStream(input.to_path_buf()));
    }

    debug!(input = %input.display(), sample_rate, hop, "Extracting audio envelope");
    let mut builder = EnvelopeBuilder::new(hop);
    let samples = decode_pcm(input, &mono_filter(sample_rate, None), |chunk| {
        builder.extend(chunk)
    })
    .await?;
    if samples == 0 {
        return Err(SyncError::NoAudioStream(input.to_path_buf()));
    }

    let envelope = TrackEnvelope {
        values: builder.finish(),
        samples,
    };
    debug!(
        input = %input.display(),
        samples,
        seconds = envelope.seconds(sample_rate),
        "Audio envelope decoded"
    );
    Ok(envelope)
}

/// Decode mono samples `range` (sample indices at `sample_rate`) of the
/// first audio stream. Shorter than the range if the track ends early.
pub async fn extract_window(
    input: &Path,
    sample_rate: u32,
    range: Range<usize>,
) -> Result<Vec<f32>, SyncError> {
    let mut samples = Vec::with_capacity(range.len());
    decode_pcm(input, &mono_filter(sample_rate, Some(&range)), |chunk| {
        samples.extend_from_slice(chunk)
    })
    .await?;
    debug!(
        input = %input.display(),
        start = range.start,
        requested = range.len(),
        decoded = samples.len(),
        "Audio window decoded"
    );
    Ok(samples)
}

/// Resample and downmix, optionally keeping only a sample range. The same
/// chain is used for envelopes and windows so their sample indices agree.
fn mono_filter(sample_rate: u32, range: Option<&Range<usize>>) -> String {
    let mut filter = format!(
        "aresample={},aformat=sample_fmts=flt:channel_layouts=mono",
        sample_rate
    );
    if let Some(range) = range {
        filter.push_str(&format!(
            ",atrim=start_sample={}:end_sample={}",
            range.start, range.end
        ));
    }
    filter
}

/// Run the decoder and hand every chunk of samples to `sink`. Returns the
/// number of samples decoded.
async fn decode_pcm<F>(input: &Path, filter: &str, mut sink: F) -> Result<u64, SyncError>
where
    F: FnMut(&[f32]),
{
    check_ffmpeg()?;
    let mut child = create_ffmpeg_command()
        .args(["-v", "error", "-nostdin", "-i"])
        .arg(input)
        .args(["-vn", "-af", filter, "-f", "f32le", "-"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| SyncError::Internal("ffmpeg stdout was not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| SyncError::Internal("ffmpeg stderr was not captured".to_string()))?;
    let stderr_tail = collect_stderr_tail(stderr);

    let mut buf = vec![0u8; READ_CHUNK];
    let mut pcm = PcmDecoder::default();
    let mut samples = Vec::with_capacity(READ_CHUNK / 4);
    let mut total = 0u64;
    loop {
        let n = stdout.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        samples.clear();
        pcm.feed(&buf[..n], &mut samples);
        total += samples.len() as u64;
        sink(&samples);
    }

    let status = child.wait().await?;
    let tail = stderr_tail.await.unwrap_or_default();
    if !status.success() {
        return Err(MediaError::ffmpeg_failed(
            format!("audio decode of {} failed", input.display()),
            (!tail.is_empty()).then_some(tail),
            status.code(),
        )
        .into());
    }
    Ok(total)
}

/// Turns a byte stream of f32le into samples, carrying partial samples
/// across reads.
#[derive(Debug, Default)]
struct PcmDecoder {
    pending: Vec<u8>,
}

impl PcmDecoder {
    fn feed(&mut self, mut bytes: &[u8], out: &mut Vec<f32>) {
        if !self.pending.is_empty() {
            let take = (4 - self.pending.len()).min(bytes.len());
            self.pending.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
            if let [a, b, c, d] = self.pending[..] {
                out.push(f32::from_le_bytes([a, b, c, d]));
                self.pending.clear();
            }
        }

        let chunks = bytes.chunks_exact(4);
        let rest = chunks.remainder();
        out.extend(chunks.map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])));
        self.pending.extend_from_slice(rest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(samples: &[f32]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_samples_split_across_reads() {
        let expected = [0.25f32, -1.0, 0.5, 0.125, -0.75];
        let bytes = encode(&expected);

        for split in [1, 3, 5, 7] {
            let mut pcm = PcmDecoder::default();
            let mut out = Vec::new();
            for read in bytes.chunks(split) {
                pcm.feed(read, &mut out);
            }
            assert_eq!(out, expected, "reads of {} bytes", split);
        }
    }

    #[test]
    fn test_trailing_partial_sample_is_held_back() {
        let mut bytes = encode(&[0.25, -1.0]);
        bytes.push(0xff);

        let mut pcm = PcmDecoder::default();
        let mut out = Vec::new();
        pcm.feed(&bytes, &mut out);
        assert_eq!(out, vec![0.25, -1.0]);
        assert_eq!(pcm.pending.len(), 1);
    }

    #[test]
    fn test_window_filter_trims_by_sample() {
        assert_eq!(
            mono_filter(22050, None),
            "aresample=22050,aformat=sample_fmts=flt:channel_layouts=mono"
        );
        assert_eq!(
            mono_filter(8000, Some(&(16000..48000))),
            "aresample=8000,aformat=sample_fmts=flt:channel_layouts=mono,\
             atrim=start_sample=16000:end_sample=48000"
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let result = extract_envelope(Path::new("/nonexistent/mic.wav"), 8000, 80).await;
        assert!(result.is_err());
    }
}
