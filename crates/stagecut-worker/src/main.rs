//! StageCut command-line binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stagecut_media::{check_ffmpeg, check_ffprobe, resolve_encoding, FfmpegBackend};
use stagecut_worker::metrics::init_metrics;
use stagecut_worker::{
    AudioMode, BatchRunner, ClipOrchestrator, LoggingObserver, PipelineConfig, VideoJob,
    VideoPipeline,
};

/// Find each performance in an event recording and cut it into its own clip.
#[derive(Parser, Debug)]
#[command(name = "stagecut", version, about)]
struct Cli {
    /// Input video files. Several files are treated as one recording split
    /// by the camera unless --separate is given.
    #[arg(required = true)]
    videos: Vec<PathBuf>,

    /// Process every input file as its own video.
    #[arg(long)]
    separate: bool,

    /// External microphone recording to synchronize and mix in.
    #[arg(long, short = 'a', env = "STAGECUT_MIC")]
    mic: Option<PathBuf>,

    /// JSON configuration file.
    #[arg(long, short, env = "STAGECUT_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, short)]
    output_dir: Option<PathBuf>,

    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Shortest performance kept, in seconds.
    #[arg(long)]
    min_duration: Option<f64>,

    /// Encode with NVENC when an NVIDIA GPU is present.
    #[arg(long)]
    gpu: bool,

    /// mix or replace.
    #[arg(long)]
    audio_mode: Option<AudioMode>,

    /// Videos processed in parallel.
    #[arg(long, short)]
    jobs: Option<usize>,

    /// Write Prometheus metrics to metrics.prom next to the report.
    #[arg(long)]
    metrics: bool,

    /// Print the effective configuration and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.output_dir {
            config.batch.output_dir = dir.clone();
        }
        if let Some(dir) = &self.temp_dir {
            config.batch.temp_dir = Some(dir.clone());
        }
        if let Some(secs) = self.min_duration {
            config.occupancy.min_duration_secs = secs;
        }
        if self.gpu {
            config.clips.use_gpu = true;
        }
        if let Some(mode) = self.audio_mode {
            config.clips.audio_mode = mode;
        }
        if let Some(jobs) = self.jobs {
            config.batch.max_concurrent_videos = jobs;
        }
        if self.metrics {
            config.batch.write_metrics = true;
        }
    }

    fn jobs(&self) -> Vec<VideoJob> {
        let with_mic = |job: VideoJob| match &self.mic {
            Some(mic) => job.with_external_audio(mic.clone()),
            None => job,
        };
        if self.separate {
            self.videos
                .iter()
                .map(|path| with_mic(VideoJob::single(path.clone())))
                .collect()
        } else {
            vec![with_mic(VideoJob::segmented(self.videos.clone()))]
        }
    }
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in ["stagecut=info", "stagecut_media=info", "stagecut_worker=info"] {
        if let Ok(d) = directive.parse() {
            env_filter = env_filter.add_directive(d);
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing();

    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    info!("Starting stagecut");

    check_ffmpeg().context("ffmpeg is required")?;
    check_ffprobe().context("ffprobe is required")?;

    let metrics_handle = if config.batch.write_metrics {
        match init_metrics() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Metrics disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let encoding = resolve_encoding(&config.clips.encoding, config.clips.use_gpu).await;
    let encode_slots = Arc::new(Semaphore::new(config.clips.max_concurrent_encodes));
    let orchestrator = ClipOrchestrator::new(
        config.clips.clone(),
        Arc::new(FfmpegBackend::new()),
        encode_slots,
    )
    .with_encoding(encoding);

    let output_dir = config.batch.output_dir.clone();
    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let pipeline = VideoPipeline::new(Arc::new(config), orchestrator)
        .with_observer(Arc::new(LoggingObserver));
    let report = BatchRunner::new(pipeline).run(cli.jobs()).await;

    let report_path = output_dir.join("report.json");
    report.write_json(&report_path).await?;
    info!(path = %report_path.display(), "Report written");

    if let Some(handle) = metrics_handle {
        let metrics_path = output_dir.join("metrics.prom");
        tokio::fs::write(&metrics_path, handle.render())
            .await
            .with_context(|| format!("writing {}", metrics_path.display()))?;
        info!(path = %metrics_path.display(), "Metrics written");
    }

    if report.all_failed() {
        error!("Every video failed");
        bail!("every video failed, see {}", report_path.display());
    }

    info!(
        clips = report.totals.clips_completed,
        failed = report.totals.clips_failed,
        "Done"
    );
    Ok(())
}
