//! Per-video driver: segmentation and audio sync, then clip extraction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tempfile::TempDir;

use stagecut_media::{
    concat_segments, segment_stream, AudioSynchronizer, DiscardedInterval, FrameSource,
    FrameStream, MediaError, SegmentationOutput, SyncOutcome, SyncResult, VideoInfo,
};
use stagecut_models::{
    AudioOffset, ClipRecord, PerformanceInterval, SyncMethod, VideoId, VideoStatus,
};

use crate::config::PipelineConfig;
use crate::error::WorkerError;
use crate::logging::VideoLogger;
use crate::metrics;
use crate::observer::{NoopObserver, PipelineObserver};
use crate::orchestrator::{ClipOrchestrator, VideoContext};

/// One recording to process.
#[derive(Debug, Clone)]
pub struct VideoJob {
    /// Files of one recording, in order; several are concatenated first
    pub segments: Vec<PathBuf>,
    pub external_audio: Option<PathBuf>,
    /// Defaults to the stem of the first segment
    pub video_id: Option<VideoId>,
}

impl VideoJob {
    pub fn single(path: impl Into<PathBuf>) -> Self {
        Self {
            segments: vec![path.into()],
            external_audio: None,
            video_id: None,
        }
    }

    pub fn segmented(segments: Vec<PathBuf>) -> Self {
        Self {
            segments,
            external_audio: None,
            video_id: None,
        }
    }

    pub fn with_external_audio(mut self, path: impl Into<PathBuf>) -> Self {
        self.external_audio = Some(path.into());
        self
    }

    pub fn with_video_id(mut self, video_id: VideoId) -> Self {
        self.video_id = Some(video_id);
        self
    }

    pub fn video_id(&self) -> VideoId {
        match (&self.video_id, self.segments.first()) {
            (Some(id), _) => id.clone(),
            (None, Some(first)) => VideoId::from_path(first),
            (None, None) => VideoId::from("unnamed"),
        }
    }
}

/// Everything known about one video after its pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct VideoReport {
    pub video_id: VideoId,
    pub sources: Vec<PathBuf>,
    pub status: VideoStatus,
    pub duration_secs: Option<f64>,
    pub frames_analyzed: u64,
    pub intervals: Vec<PerformanceInterval>,
    pub discarded: Vec<DiscardedInterval>,
    pub merges: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<AudioOffset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
    pub clips: Vec<ClipRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl VideoReport {
    fn new(video_id: VideoId, sources: Vec<PathBuf>) -> Self {
        Self {
            video_id,
            sources,
            status: VideoStatus::Processing,
            duration_secs: None,
            frames_analyzed: 0,
            intervals: Vec::new(),
            discarded: Vec::new(),
            merges: 0,
            offset: None,
            sync_error: None,
            clips: Vec::new(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Report for a video whose task died before producing one.
    pub(crate) fn aborted(video_id: VideoId, sources: Vec<PathBuf>, error: String) -> Self {
        let mut report = Self::new(video_id, sources);
        report.status = VideoStatus::Failed;
        report.error = Some(error);
        report.finished_at = Some(Utc::now());
        report
    }

    pub fn completed_clips(&self) -> usize {
        self.clips.iter().filter(|c| c.is_completed()).count()
    }

    pub fn failed_clips(&self) -> usize {
        self.clips.len() - self.completed_clips()
    }
}

/// Runs one video end to end. Cheap to clone; clones share the encode
/// semaphore through the orchestrator.
#[derive(Clone)]
pub struct VideoPipeline {
    config: Arc<PipelineConfig>,
    orchestrator: ClipOrchestrator,
    observer: Arc<dyn PipelineObserver>,
}

impl VideoPipeline {
    pub fn new(config: Arc<PipelineConfig>, orchestrator: ClipOrchestrator) -> Self {
        Self {
            config,
            orchestrator,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Observer for pipeline events; also handed to the orchestrator.
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.orchestrator = self.orchestrator.with_observer(observer.clone());
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one recording. Failures end up in the report, never as an
    /// error, so a batch can carry on with the next video.
    pub async fn run(&self, job: &VideoJob) -> VideoReport {
        let video_id = job.video_id();
        let logger = VideoLogger::new(&video_id, "prepare");
        let report = VideoReport::new(video_id.clone(), job.segments.clone());

        logger.log_start(&format!("{} segment(s)", job.segments.len()));

        let work_dir = match self.create_work_dir() {
            Ok(dir) => dir,
            Err(e) => return self.fail(report, &logger, e),
        };
        let source = match self.prepare_source(job, work_dir.path(), &logger).await {
            Ok(path) => path,
            Err(e) => return self.fail(report, &logger, e),
        };
        self.observer.on_video_started(&video_id, &source);

        let output_dir = self.config.batch.output_dir.clone();
        if let Err(e) = tokio::fs::create_dir_all(&output_dir).await {
            return self.fail(report, &logger, e.into());
        }

        let segmentation = self.config.segmentation();
        let frames_config = self.config.frames.clone();
        let analysis = async {
            let mut frames = FrameSource::open(&source, &frames_config).await?;
            let info = frames.info().clone();
            let output = segment_stream(&mut frames, &segmentation).await?;
            Ok::<(VideoInfo, SegmentationOutput), MediaError>((info, output))
        };
        let sync = async {
            match &job.external_audio {
                Some(mic) => Some(
                    AudioSynchronizer::new(self.config.sync.clone())
                        .estimate_offset(mic, &source)
                        .await,
                ),
                None => None,
            }
        };

        let logger = logger.for_stage("segmentation");
        let (analysis, sync) = tokio::join!(analysis, sync);
        let (info, output) = match analysis {
            Ok(result) => result,
            Err(e) => {
                return self.fail(
                    report,
                    &logger,
                    WorkerError::decode_failure(format!("{}: {}", source.display(), e)),
                )
            }
        };

        let ctx = VideoContext {
            video_id,
            source,
            duration: info.duration,
            fps: info.fps,
            external_audio: job.external_audio.clone(),
            output_dir,
        };
        let report = self.finish_video(report, &ctx, output, sync, &logger).await;

        // The concatenated source lives here until every clip is cut
        drop(work_dir);
        report
    }

    /// Run an already-open frame stream and an already-computed sync result
    /// through the rest of the pipeline. `ctx.source` is what clips are cut
    /// from.
    pub async fn run_with_stream(
        &self,
        ctx: VideoContext,
        stream: &mut dyn FrameStream,
        sync: Option<SyncResult<SyncOutcome>>,
    ) -> VideoReport {
        let logger = VideoLogger::new(&ctx.video_id, "segmentation");
        let report = VideoReport::new(ctx.video_id.clone(), vec![ctx.source.clone()]);
        self.observer.on_video_started(&ctx.video_id, &ctx.source);
        logger.log_start("frame stream");

        let output = match segment_stream(stream, &self.config.segmentation()).await {
            Ok(output) => output,
            Err(e) => {
                return self.fail(report, &logger, WorkerError::decode_failure(e.to_string()))
            }
        };
        self.finish_video(report, &ctx, output, sync, &logger).await
    }

    async fn finish_video(
        &self,
        mut report: VideoReport,
        ctx: &VideoContext,
        output: SegmentationOutput,
        sync: Option<SyncResult<SyncOutcome>>,
        logger: &VideoLogger,
    ) -> VideoReport {
        report.duration_secs = Some(ctx.duration);
        report.frames_analyzed = output.frames;
        report.merges = output.report.merges;
        report.intervals = output.report.intervals;
        report.discarded = output.report.discarded;

        metrics::record_frames_processed(output.frames);
        metrics::record_intervals_detected(report.intervals.len());
        metrics::record_intervals_discarded(report.discarded.len());
        logger.log_completion(&format!(
            "{} frames, {} interval(s), {} discarded",
            output.frames,
            report.intervals.len(),
            report.discarded.len()
        ));

        for (i, interval) in report.intervals.iter().enumerate() {
            self.observer.on_interval(&ctx.video_id, i + 1, interval);
        }

        let sync_logger = logger.for_stage("audio_sync");
        let outcome = match sync {
            Some(Ok(outcome)) => {
                let offset = *outcome.offset();
                metrics::record_sync_confidence(method_label(offset.method), offset.confidence);
                self.observer.on_offset(&ctx.video_id, &offset);
                report.offset = Some(offset);
                Some(outcome)
            }
            Some(Err(e)) => {
                let e = WorkerError::from(e);
                sync_logger.log_warning(&format!("offset unavailable, clips keep camera audio: {}", e));
                let fallback = AudioOffset::fallback();
                metrics::record_sync_confidence(method_label(fallback.method), fallback.confidence);
                report.offset = Some(fallback);
                report.sync_error = Some(e.to_string());
                None
            }
            None => None,
        };

        if report.intervals.is_empty() {
            let e = WorkerError::NoIntervalsDetected(ctx.video_id.to_string());
            logger.log_progress(&e.to_string());
            report.status = VideoStatus::NoIntervals;
            return self.finish(report);
        }

        let clip_logger = logger.for_stage("clip_extraction");
        clip_logger.log_start(&format!("{} clip(s)", report.intervals.len()));
        match self
            .orchestrator
            .extract_all(ctx, &report.intervals, outcome.as_ref())
            .await
        {
            Ok(clips) => report.clips = clips,
            Err(e) => return self.fail(report, &clip_logger, e),
        }

        let completed = report.completed_clips();
        report.status = if completed == report.clips.len() {
            VideoStatus::Completed
        } else if completed > 0 {
            VideoStatus::PartiallyCompleted
        } else {
            report.error = Some("every clip failed to encode".to_string());
            VideoStatus::Failed
        };
        clip_logger.log_completion(&format!(
            "{}/{} clip(s) encoded",
            completed,
            report.clips.len()
        ));

        self.finish(report)
    }

    fn create_work_dir(&self) -> Result<TempDir, WorkerError> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("stagecut-");
            b
        };
        let dir = match &self.config.batch.temp_dir {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    /// The file clips are cut from: the single segment, or the segments
    /// concatenated into `work_dir`.
    async fn prepare_source(
        &self,
        job: &VideoJob,
        work_dir: &Path,
        logger: &VideoLogger,
    ) -> Result<PathBuf, WorkerError> {
        match job.segments.as_slice() {
            [] => Err(WorkerError::decode_failure("no input files")),
            [single] => {
                if !single.exists() {
                    return Err(WorkerError::decode_failure(format!(
                        "input not found: {}",
                        single.display()
                    )));
                }
                Ok(single.clone())
            }
            segments => {
                let extension = segments[0]
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("mp4");
                let joined = work_dir.join(format!("joined.{}", extension));
                logger.log_progress(&format!("concatenating {} segments", segments.len()));
                concat_segments(segments, &joined, work_dir)
                    .await
                    .map_err(|e| WorkerError::decode_failure(format!("concat failed: {}", e)))?;
                Ok(joined)
            }
        }
    }

    fn fail(&self, mut report: VideoReport, logger: &VideoLogger, error: WorkerError) -> VideoReport {
        logger.log_error(&error.to_string());
        report.status = VideoStatus::Failed;
        report.error = Some(error.to_string());
        self.finish(report)
    }

    fn finish(&self, mut report: VideoReport) -> VideoReport {
        report.finished_at = Some(Utc::now());
        metrics::record_video_processed(report.status.as_str());
        self.observer.on_video_finished(&report);
        report
    }
}

fn method_label(method: SyncMethod) -> &'static str {
    match method {
        SyncMethod::Whole => "whole",
        SyncMethod::Chunked => "chunked",
        SyncMethod::Fallback => "fallback",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_id_defaults_to_first_segment_stem() {
        let job = VideoJob::segmented(vec![
            PathBuf::from("/cam/00001.MTS"),
            PathBuf::from("/cam/00002.MTS"),
        ]);
        assert_eq!(job.video_id().as_str(), "00001");

        let named = job.with_video_id(VideoId::from("spring_recital"));
        assert_eq!(named.video_id().as_str(), "spring_recital");
    }

    #[test]
    fn test_report_clip_counts() {
        let report = VideoReport::new(VideoId::from("v"), vec![]);
        assert_eq!(report.completed_clips(), 0);
        assert_eq!(report.failed_clips(), 0);
        assert_eq!(report.status, VideoStatus::Processing);
    }
}
