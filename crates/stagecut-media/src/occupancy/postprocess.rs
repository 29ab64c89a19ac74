//! Merging fragmented intervals and discarding short ones.

use serde::{Deserialize, Serialize};
use stagecut_models::{IntervalQuality, PerformanceInterval};
use tracing::info;

use super::config::OccupancyConfig;

/// Why a raw interval did not survive post-processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscardedInterval {
    pub interval: PerformanceInterval,
    pub reason: String,
}

/// Accepted intervals plus what was merged or dropped along the way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OccupancyReport {
    /// Ordered, non-overlapping, each at least the minimum duration
    pub intervals: Vec<PerformanceInterval>,
    pub discarded: Vec<DiscardedInterval>,
    /// Number of merge operations performed
    pub merges: usize,
}

/// Merge raw intervals separated by less than the merge tolerance, then drop
/// those shorter than the minimum duration.
pub fn post_process(mut raw: Vec<PerformanceInterval>, config: &OccupancyConfig) -> OccupancyReport {
    raw.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<PerformanceInterval> = Vec::with_capacity(raw.len());
    let mut merges = 0;

    for next in raw {
        if let Some(current) = merged.last_mut() {
            if next.start - current.end < config.merge_tolerance_secs {
                info!(
                    start = current.start,
                    end = current.end,
                    next_start = next.start,
                    next_end = next.end,
                    gap = next.start - current.end,
                    "Merging interval fragments"
                );
                current.end = current.end.max(next.end);
                current.fragments += next.fragments;
                current.gaps_bridged += next.gaps_bridged;
                current.quality = if next.quality == IntervalQuality::Truncated {
                    IntervalQuality::Truncated
                } else {
                    IntervalQuality::Merged
                };
                merges += 1;
                continue;
            }
        }
        merged.push(next);
    }

    let mut intervals = Vec::with_capacity(merged.len());
    let mut discarded = Vec::new();
    for interval in merged {
        let duration = interval.duration();
        if duration < config.min_duration_secs {
            info!(
                start = interval.start,
                end = interval.end,
                duration,
                min_duration = config.min_duration_secs,
                track = %interval.track_id,
                "Discarding short interval"
            );
            discarded.push(DiscardedInterval {
                reason: format!(
                    "duration {:.1}s below minimum {:.1}s",
                    duration, config.min_duration_secs
                ),
                interval,
            });
        } else {
            intervals.push(interval);
        }
    }

    OccupancyReport {
        intervals,
        discarded,
        merges,
    }
}
