//! Short-time RMS envelopes.

/// Samples per envelope value for the given rates (at least 1).
pub fn hop_size(sample_rate: u32, envelope_rate: f64) -> usize {
    ((sample_rate as f64 / envelope_rate).round() as usize).max(1)
}

/// RMS of consecutive non-overlapping windows of `hop` samples.
/// A trailing partial window is dropped.
pub fn rms_envelope(samples: &[f32], hop: usize) -> Vec<f32> {
    let mut envelope = EnvelopeBuilder::new(hop);
    envelope.extend(samples);
    envelope.finish()
}

/// Builds an RMS envelope from samples arriving in arbitrary chunks, so a
/// track never has to be held in memory whole.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    hop: usize,
    energy: f64,
    filled: usize,
    values: Vec<f32>,
}

impl EnvelopeBuilder {
    pub fn new(hop: usize) -> Self {
        Self {
            hop: hop.max(1),
            energy: 0.0,
            filled: 0,
            values: Vec::new(),
        }
    }

    pub fn extend(&mut self, samples: &[f32]) {
        for &s in samples {
            self.energy += (s as f64) * (s as f64);
            self.filled += 1;
            if self.filled == self.hop {
                self.values.push((self.energy / self.hop as f64).sqrt() as f32);
                self.energy = 0.0;
                self.filled = 0;
            }
        }
    }

    /// Envelope values so far; the partial window is dropped.
    pub fn finish(self) -> Vec<f32> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_size() {
        assert_eq!(hop_size(22050, 100.0), 221);
        assert_eq!(hop_size(8000, 100.0), 80);
    }

    #[test]
    fn test_rms_of_constant_and_partial_window() {
        let samples = vec![0.5f32; 250];
        let env = rms_envelope(&samples, 100);
        assert_eq!(env.len(), 2);
        assert!((env[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_chunked_input_matches_whole_track() {
        let samples: Vec<f32> = (0..1000).map(|i| ((i * 37) % 101) as f32 / 101.0 - 0.5).collect();
        let whole = rms_envelope(&samples, 80);

        let mut builder = EnvelopeBuilder::new(80);
        for chunk in samples.chunks(33) {
            builder.extend(chunk);
        }
        assert_eq!(builder.finish(), whole);
        assert_eq!(whole.len(), 12);
    }
}
