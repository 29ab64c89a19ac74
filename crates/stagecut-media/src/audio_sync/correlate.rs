//! Normalized cross-correlation over a bounded lag window.
//!
//! The raw cross products for every lag come from one FFT round trip; the
//! per-lag means and energies of the overlapping parts come from prefix
//! sums, giving the Pearson coefficient of the overlap at each lag.

use rustfft::{num_complex::Complex, FftPlanner};
use std::ops::RangeInclusive;

/// Best alignment found by [`ncc_peak`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// `needle[i]` aligns with `reference[i + lag]`
    pub lag: i64,
    /// Pearson correlation of the overlapping parts, in [-1, 1]
    pub score: f64,
}

/// Find the lag in `lags` maximizing the normalized correlation of `needle`
/// against `reference`, considering only lags whose overlap is at least
/// `min_overlap` values.
///
/// Ties resolve to the smallest lag. Returns `None` when no lag in range has
/// enough overlap or both sides are flat.
pub fn ncc_peak(
    reference: &[f32],
    needle: &[f32],
    lags: RangeInclusive<i64>,
    min_overlap: usize,
) -> Option<Peak> {
    let (m, n) = (reference.len() as i64, needle.len() as i64);
    let min_overlap = min_overlap.max(1) as i64;
    if m == 0 || n == 0 || min_overlap > m.min(n) {
        return None;
    }

    // overlap(L) = min(n, m - L) - max(0, -L) >= min_overlap
    let lo = (*lags.start()).max(min_overlap - n);
    let hi = (*lags.end()).min(m - min_overlap);
    if lo > hi {
        return None;
    }

    let cross = cross_products(reference, needle);
    let size = cross.len() as i64;
    let ref_sums = PrefixSums::new(reference);
    let needle_sums = PrefixSums::new(needle);

    let mut best: Option<Peak> = None;
    for lag in lo..=hi {
        let i0 = (-lag).max(0);
        let i1 = n.min(m - lag);
        let k = (i1 - i0) as f64;

        let (sa, saa) = needle_sums.range(i0 as usize, i1 as usize);
        let (sb, sbb) = ref_sums.range((i0 + lag) as usize, (i1 + lag) as usize);
        let sab = cross[lag.rem_euclid(size) as usize];

        let cov = sab - sa * sb / k;
        let var_a = saa - sa * sa / k;
        let var_b = sbb - sb * sb / k;
        if var_a <= f64::EPSILON * saa.max(1.0) || var_b <= f64::EPSILON * sbb.max(1.0) {
            continue;
        }

        let score = (cov / (var_a * var_b).sqrt()).clamp(-1.0, 1.0);
        if best.map_or(true, |b| score > b.score) {
            best = Some(Peak { lag, score });
        }
    }

    best
}

/// `out[L mod N] = Σ_i needle[i] * reference[i + L]` for every lag with any overlap.
fn cross_products(reference: &[f32], needle: &[f32]) -> Vec<f64> {
    let size = (reference.len() + needle.len() - 1).next_power_of_two();
    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(size);
    let inverse = planner.plan_fft_inverse(size);

    let padded = |signal: &[f32]| {
        let mut buffer: Vec<Complex<f64>> =
            signal.iter().map(|&x| Complex::new(x as f64, 0.0)).collect();
        buffer.resize(size, Complex::new(0.0, 0.0));
        buffer
    };

    let mut a = padded(needle);
    let mut b = padded(reference);
    forward.process(&mut a);
    forward.process(&mut b);

    for (bi, ai) in b.iter_mut().zip(&a) {
        *bi *= ai.conj();
    }
    inverse.process(&mut b);

    let scale = 1.0 / size as f64;
    b.into_iter().map(|c| c.re * scale).collect()
}

/// Prefix sums of values and squared values.
struct PrefixSums {
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl PrefixSums {
    fn new(signal: &[f32]) -> Self {
        let mut sum = Vec::with_capacity(signal.len() + 1);
        let mut sum_sq = Vec::with_capacity(signal.len() + 1);
        let (mut s, mut ss) = (0.0f64, 0.0f64);
        sum.push(0.0);
        sum_sq.push(0.0);
        for &x in signal {
            let x = x as f64;
            s += x;
            ss += x * x;
            sum.push(s);
            sum_sq.push(ss);
        }
        Self { sum, sum_sq }
    }

    /// (Σx, Σx²) over `start..end`.
    fn range(&self, start: usize, end: usize) -> (f64, f64) {
        (
            self.sum[end] - self.sum[start],
            self.sum_sq[end] - self.sum_sq[start],
        )
    }
}
