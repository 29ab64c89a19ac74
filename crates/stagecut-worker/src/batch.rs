//! Running several videos and collecting a JSON report.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{error, info};
use uuid::Uuid;

use stagecut_models::{VideoId, VideoStatus};

use crate::error::WorkerResult;
use crate::pipeline::{VideoJob, VideoPipeline, VideoReport};

/// Aggregate counts over a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchTotals {
    pub videos: usize,
    pub videos_failed: usize,
    pub intervals: usize,
    pub clips_completed: usize,
    pub clips_failed: usize,
}

impl BatchTotals {
    fn from_reports(reports: &[VideoReport]) -> Self {
        reports.iter().fold(Self::default(), |mut totals, report| {
            totals.videos += 1;
            if report.status == VideoStatus::Failed {
                totals.videos_failed += 1;
            }
            totals.intervals += report.intervals.len();
            totals.clips_completed += report.completed_clips();
            totals.clips_failed += report.failed_clips();
            totals
        })
    }
}

/// Result of a batch run, written as `report.json`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub totals: BatchTotals,
    /// In job order
    pub videos: Vec<VideoReport>,
}

impl BatchReport {
    /// Every video failed (and there was at least one).
    pub fn all_failed(&self) -> bool {
        self.totals.videos > 0 && self.totals.videos_failed == self.totals.videos
    }

    /// Write pretty-printed JSON to `path`.
    pub async fn write_json(&self, path: impl AsRef<Path>) -> WorkerResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

/// Runs video pipelines with bounded parallelism. A failed video never stops
/// the others.
pub struct BatchRunner {
    pipeline: VideoPipeline,
    max_concurrent_videos: usize,
}

impl BatchRunner {
    pub fn new(pipeline: VideoPipeline) -> Self {
        let max_concurrent_videos = pipeline.config().batch.max_concurrent_videos.max(1);
        Self {
            pipeline,
            max_concurrent_videos,
        }
    }

    pub async fn run(&self, jobs: Vec<VideoJob>) -> BatchReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            run_id = %run_id,
            videos = jobs.len(),
            max_concurrent_videos = self.max_concurrent_videos,
            "Batch started"
        );

        let placeholders: Vec<(VideoId, Vec<PathBuf>)> = jobs
            .iter()
            .map(|job| (job.video_id(), job.segments.clone()))
            .collect();
        let pipeline = self.pipeline.clone();
        let results = spawn_bounded(jobs, self.max_concurrent_videos, move |job| {
            let pipeline = pipeline.clone();
            async move { pipeline.run(&job).await }
        })
        .await;

        let videos: Vec<VideoReport> = results
            .into_iter()
            .zip(placeholders)
            .map(|(result, (video_id, sources))| match result {
                Ok(report) => report,
                Err(e) => {
                    error!(video_id = %video_id, "Video task aborted: {}", e);
                    VideoReport::aborted(video_id, sources, format!("video task aborted: {}", e))
                }
            })
            .collect();
        let totals = BatchTotals::from_reports(&videos);
        info!(
            run_id = %run_id,
            videos = totals.videos,
            videos_failed = totals.videos_failed,
            clips_completed = totals.clips_completed,
            clips_failed = totals.clips_failed,
            "Batch finished"
        );

        BatchReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            totals,
            videos,
        }
    }
}

/// Run `task` for every item on its own tokio task, at most `limit` at a
/// time. Results come back in item order; a panicking task becomes an `Err`
/// without affecting the others.
async fn spawn_bounded<T, R, F, Fut>(items: Vec<T>, limit: usize, task: F) -> Vec<Result<R, JoinError>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
{
    let slots = Arc::new(Semaphore::new(limit.max(1)));
    let handles: Vec<_> = items
        .into_iter()
        .map(|item| {
            let slots = slots.clone();
            let work = task(item);
            tokio::spawn(async move {
                let _permit = slots.acquire_owned().await.ok();
                work.await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tasks_run_on_separate_threads() {
        // Both tasks block their thread until the other arrives
        let barrier = Arc::new(std::sync::Barrier::new(2));
        let results = tokio::time::timeout(
            Duration::from_secs(10),
            spawn_bounded(vec![1, 2], 2, move |n| {
                let barrier = barrier.clone();
                async move {
                    barrier.wait();
                    n * 10
                }
            }),
        )
        .await
        .unwrap();

        let values: Vec<i32> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![10, 20]);
    }

    #[tokio::test]
    async fn test_limit_is_respected_and_order_kept() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let task = {
            let running = running.clone();
            let peak = peak.clone();
            move |n: u64| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20 + (6 - n) * 5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    n
                }
            }
        };

        let results = spawn_bounded((0..6).collect(), 2, task).await;
        let values: Vec<u64> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_task_is_isolated() {
        let results = spawn_bounded(vec![1, 2, 3], 3, |n| async move {
            if n == 2 {
                panic!("decoder exploded");
            }
            n
        })
        .await;

        assert_eq!(*results[0].as_ref().unwrap(), 1);
        assert!(results[1].as_ref().unwrap_err().is_panic());
        assert_eq!(*results[2].as_ref().unwrap(), 3);
    }
}
