//! Reducing several offset estimates to one.

/// Result of [`consensus_offset`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Consensus {
    pub offset_secs: f64,
    /// Mean confidence of the agreeing estimates, scaled by their share
    pub confidence: f64,
    /// Estimates in the winning cluster
    pub members: usize,
}

/// Pick the largest cluster of `(offset_secs, confidence)` estimates lying
/// within `tolerance` of one of its members and return its mean. When no two
/// estimates agree, fall back to the median offset.
pub fn consensus_offset(estimates: &[(f64, f64)], tolerance: f64) -> Option<Consensus> {
    if estimates.is_empty() {
        return None;
    }

    let mut sorted = estimates.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    let total = sorted.len() as f64;

    let mut best: Vec<(f64, f64)> = Vec::new();
    for &(center, _) in &sorted {
        let cluster: Vec<(f64, f64)> = sorted
            .iter()
            .copied()
            .filter(|(o, _)| (o - center).abs() <= tolerance)
            .collect();
        if cluster.len() > best.len() {
            best = cluster;
        }
    }

    if best.len() >= 2 || sorted.len() == 1 {
        let k = best.len() as f64;
        let offset = best.iter().map(|(o, _)| o).sum::<f64>() / k;
        let confidence = best.iter().map(|(_, c)| c).sum::<f64>() / k * (k / total);
        return Some(Consensus {
            offset_secs: offset,
            confidence,
            members: best.len(),
        });
    }

    let mid = sorted.len() / 2;
    let (offset, confidence) = if sorted.len() % 2 == 0 {
        (
            (sorted[mid - 1].0 + sorted[mid].0) / 2.0,
            (sorted[mid - 1].1 + sorted[mid].1) / 2.0,
        )
    } else {
        sorted[mid]
    };
    Some(Consensus {
        offset_secs: offset,
        confidence: confidence / total,
        members: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_largest_cluster_wins() {
        let estimates = [(12.0, 0.8), (12.4, 0.9), (-3.0, 0.5), (12.2, 0.7), (40.0, 0.6)];
        let c = consensus_offset(&estimates, 1.0).unwrap();
        assert_eq!(c.members, 3);
        assert!((c.offset_secs - 12.2).abs() < 1e-9);
        assert!((c.confidence - 0.8 * 3.0 / 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_median_when_nothing_agrees() {
        let estimates = [(1.0, 0.5), (10.0, 0.5), (20.0, 0.5)];
        let c = consensus_offset(&estimates, 1.0).unwrap();
        assert_eq!(c.members, 1);
        assert_eq!(c.offset_secs, 10.0);
    }

    #[test]
    fn test_single_and_empty() {
        assert!(consensus_offset(&[], 1.0).is_none());
        let c = consensus_offset(&[(4.5, 0.9)], 1.0).unwrap();
        assert_eq!(c.offset_secs, 4.5);
        assert!((c.confidence - 0.9).abs() < 1e-9);
    }
}
