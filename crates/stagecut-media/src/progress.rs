//! FFmpeg `-progress` output parsing.

use serde::{Deserialize, Serialize};

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Output position in seconds
    pub out_time_secs: f64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Fraction of `total_secs` encoded so far, in [0, 1].
    pub fn fraction(&self, total_secs: f64) -> f64 {
        if total_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_secs / total_secs).clamp(0.0, 1.0)
    }

    /// Estimate time remaining in seconds.
    pub fn eta_seconds(&self, total_secs: f64) -> Option<f64> {
        if self.speed <= 0.0 || self.out_time_secs <= 0.0 {
            return None;
        }
        let remaining = (total_secs - self.out_time_secs).max(0.0);
        Some(remaining / self.speed)
    }
}

/// Accumulates `key=value` lines into progress snapshots.
///
/// FFmpeg emits one block per report, terminated by `progress=continue`
/// or `progress=end`.
#[derive(Debug, Default)]
pub struct ProgressParser {
    current: FfmpegProgress,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line. Returns a snapshot when a block is complete.
    ///
    /// Returns `Err(line)` for lines that are not progress keys, so the caller
    /// can keep them as diagnostics.
    pub fn feed<'a>(&mut self, line: &'a str) -> Result<Option<FfmpegProgress>, &'a str> {
        let line = line.trim();
        let Some((key, value)) = line.split_once('=') else {
            return Err(line);
        };

        match key {
            "out_time_us" | "out_time_ms" => {
                // Both keys carry microseconds in current FFmpeg releases
                if let Ok(us) = value.parse::<i64>() {
                    self.current.out_time_secs = us.max(0) as f64 / 1_000_000.0;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.current.frame = frame;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.current.speed = speed;
                }
            }
            "progress" => {
                self.current.is_complete = value == "end";
                return Ok(Some(self.current.clone()));
            }
            "fps" | "bitrate" | "total_size" | "out_time" | "dup_frames" | "drop_frames" => {}
            _ if key.starts_with("stream_") => {}
            _ => return Err(line),
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_emits_on_progress_key() {
        let mut parser = ProgressParser::new();

        assert_eq!(parser.feed("frame=120"), Ok(None));
        assert_eq!(parser.feed("out_time_us=5000000"), Ok(None));
        assert_eq!(parser.feed("speed=2.5x"), Ok(None));

        let snapshot = parser.feed("progress=continue").unwrap().unwrap();
        assert_eq!(snapshot.frame, 120);
        assert!((snapshot.out_time_secs - 5.0).abs() < 1e-9);
        assert!(!snapshot.is_complete);

        let last = parser.feed("progress=end").unwrap().unwrap();
        assert!(last.is_complete);
    }

    #[test]
    fn test_parser_passes_through_diagnostics() {
        let mut parser = ProgressParser::new();
        assert_eq!(
            parser.feed("Error opening input file missing.mp4."),
            Err("Error opening input file missing.mp4.")
        );
        assert_eq!(parser.feed("speed=N/A"), Ok(None));
    }

    #[test]
    fn test_fraction_and_eta() {
        let progress = FfmpegProgress {
            out_time_secs: 5.0,
            speed: 2.0,
            ..Default::default()
        };

        assert!((progress.fraction(10.0) - 0.5).abs() < 1e-9);
        assert_eq!(progress.fraction(0.0), 0.0);
        // 5 seconds remaining at 2x speed
        assert!((progress.eta_seconds(10.0).unwrap() - 2.5).abs() < 1e-9);
    }
}
