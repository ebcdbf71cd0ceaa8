//! vreel command line.
//!
//! Usage:
//!   vreel search <KEYWORD> [--max N]        List candidate source videos
//!   vreel run <JOB.json>                    Compose and reframe one clip
//!   vreel publish <PATH> [--caption TEXT]   Hand a finished clip to the publisher

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vreel_media::{
    check_ffmpeg, check_ffprobe, search_videos, CenterLocator, FfmpegCodec, SkinToneLocator,
    SubjectLocator, DEFAULT_MAX_RESULTS,
};
use vreel_models::{JobEvent, JobSpec};
use vreel_worker::{
    metrics::init_metrics, spawn_job, JobRequest, LogPublisher, Pipeline, Publisher,
    WorkerConfig,
};

#[derive(Parser)]
#[command(
    name = "vreel",
    about = "Turn landscape videos into captioned portrait clips",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for candidate source videos
    Search {
        /// Search keyword
        keyword: String,

        /// Number of search results to fetch before filtering
        #[arg(long = "max", default_value_t = DEFAULT_MAX_RESULTS)]
        max_results: usize,

        /// Print candidates as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Run one job described by a JSON file
    Run {
        /// Path to the job file
        job: PathBuf,

        /// Subject locator used to position the crop
        #[arg(long, value_enum, default_value_t = LocatorKind::SkinTone)]
        locator: LocatorKind,
    },

    /// Publish a finished clip
    Publish {
        /// Path to the final clip
        path: PathBuf,

        /// Caption sent with the clip
        #[arg(long, default_value = "")]
        caption: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LocatorKind {
    /// Skin-tone heuristic on the first frame
    SkinTone,
    /// Always center the crop
    Center,
    /// OpenCV Haar cascade face detector (needs the `opencv` feature)
    Haar,
}

impl LocatorKind {
    fn build(self) -> anyhow::Result<Arc<dyn SubjectLocator>> {
        match self {
            LocatorKind::SkinTone => Ok(Arc::new(SkinToneLocator::default())),
            LocatorKind::Center => Ok(Arc::new(CenterLocator)),
            #[cfg(feature = "opencv")]
            LocatorKind::Haar => Ok(Arc::new(vreel_media::HaarCascadeLocator::default())),
            #[cfg(not(feature = "opencv"))]
            LocatorKind::Haar => bail!("this build has no OpenCV support; rebuild with --features opencv"),
        }
    }
}

fn init_tracing() {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vreel=info,vreel_media=info,vreel_worker=info"));

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
    init_tracing();

    let cli = Cli::parse();
    let config = WorkerConfig::from_env();

    if let Some(port) = config.metrics_port {
        match init_metrics(port) {
            Ok(()) => info!(port, "Prometheus exporter listening"),
            Err(e) => warn!("Failed to start metrics exporter: {}", e),
        }
    }

    match cli.command {
        Commands::Search {
            keyword,
            max_results,
            json,
        } => search(&keyword, max_results, json).await,
        Commands::Run { job, locator } => run(config, job, locator).await,
        Commands::Publish { path, caption } => {
            let id = LogPublisher.publish(&path, &caption).await?;
            println!("{}", id);
            Ok(())
        }
    }
}

async fn search(keyword: &str, max_results: usize, json: bool) -> anyhow::Result<()> {
    let candidates = search_videos(keyword, max_results).await?;
    if candidates.is_empty() {
        info!(keyword = %keyword, "No candidates within the duration range");
    }

    for candidate in candidates {
        if json {
            println!("{}", serde_json::to_string(&candidate)?);
        } else {
            println!(
                "{:>12} views  {:>6}  {}  {}\n{:>28}{}",
                candidate.view_count,
                candidate.duration_label(),
                candidate.id,
                candidate.title,
                "",
                candidate.thumbnail_url.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

async fn run(config: WorkerConfig, job: PathBuf, locator: LocatorKind) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(&job)
        .await
        .with_context(|| format!("cannot read job file {}", job.display()))?;
    let spec: JobSpec = serde_json::from_str(&raw)
        .with_context(|| format!("invalid job file {}", job.display()))?;

    let locator = locator.build()?;
    check_ffmpeg()?;
    check_ffprobe()?;

    let mut codec = FfmpegCodec::new();
    if let Some(secs) = config.ffmpeg_timeout {
        codec = codec.with_timeout(secs);
    }

    info!("Worker config: {:?}", config);
    let pipeline = Arc::new(Pipeline::new(config, Arc::new(codec), locator));
    let (handle, mut events) = spawn_job(pipeline, JobRequest::new(spec));
    info!(job_id = %handle.job_id(), "Job submitted");

    let mut interrupted = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(JobEvent::Progress { stage, percent }) => {
                    info!(stage = stage.as_str(), percent, "Progress");
                }
                Some(JobEvent::Warning { message, .. }) => warn!("{}", message),
                Some(event) => info!("{}", event),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                info!("Received interrupt, cancelling job");
                interrupted = true;
                handle.cancel();
            }
        }
    }

    match handle.wait().await {
        Ok(output) => {
            println!("{}", output.output.path.display());
            Ok(())
        }
        Err(e) => {
            error!(kind = %e.kind(), "Job failed: {}", e);
            bail!("job failed ({}): {}", e.kind(), e)
        }
    }
}
