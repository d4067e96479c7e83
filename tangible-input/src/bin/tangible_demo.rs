//! Runs the tracking pipeline against synthetic cameras and logs what it sees

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tangible_input::detector::Detector;
use tangible_input::synthetic::{ScriptedHandDetector, SyntheticPlatform};
use tangible_input::{
    DetectionResult, InitializeOptions, LogNoticeSink, PipelineConfig, RemoteDetector,
    TrackingPipeline,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tangible-demo")]
#[command(about = "Drive physical input from a (synthetic) camera feed", long_about = None)]
#[command(version)]
struct Cli {
    /// Number of synthetic cameras to expose
    #[arg(long, default_value = "2")]
    cameras: usize,

    /// Camera to open instead of the first one
    #[arg(long)]
    device: Option<String>,

    /// Maximum number of hands to detect
    #[arg(long, default_value = "2")]
    max_hands: u32,

    /// Report no hands at all
    #[arg(long)]
    empty: bool,

    /// Post frames to this HTTP detector instead of the scripted one
    #[arg(long)]
    detector_url: Option<String>,

    /// Pipeline configuration file (TOML)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(long, default_value = "10")]
    seconds: u64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let platform = Arc::new(SyntheticPlatform::new(cli.cameras, 30));
    let detector: Arc<dyn Detector> = match &cli.detector_url {
        Some(url) => Arc::new(
            RemoteDetector::new(url.clone(), config.send_timeout().unwrap_or(Duration::from_secs(5)))
                .context("failed to build remote detector")?,
        ),
        None if cli.empty => Arc::new(ScriptedHandDetector::empty()),
        None => Arc::new(ScriptedHandDetector::new()),
    };

    let pipeline = TrackingPipeline::new(platform, detector, Arc::new(LogNoticeSink), config)
        .context("failed to create pipeline")?;

    let options = InitializeOptions {
        max_targets: cli.max_hands,
        preferred_device_id: cli.device.clone(),
        ..InitializeOptions::default()
    };

    if let Err(e) = pipeline.initialize(options).await {
        warn!("Pipeline failed to initialize: {}", e);
        return Ok(());
    }

    for device in pipeline.devices() {
        info!(id = %device.id, label = %device.label, "Camera available");
    }

    pipeline.start().context("failed to start dispatch loop")?;

    let mut report = tokio::time::interval(Duration::from_secs(1));
    let deadline = tokio::time::sleep(Duration::from_secs(cli.seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = report.tick() => {
                if !pipeline.failure_state().is_ok() {
                    warn!(state = %pipeline.failure_state(), "Pipeline failed");
                    break;
                }
                log_result(pipeline.latest_result().as_deref());
            }
        }
    }

    if let Some(stats) = pipeline.dispatch_stats() {
        info!(
            dispatched = stats.dispatched,
            skipped_busy = stats.skipped_busy,
            skipped_duplicate = stats.skipped_duplicate,
            "Dispatch summary"
        );
    }

    pipeline.shutdown().await;
    Ok(())
}

fn log_result(result: Option<&DetectionResult>) {
    match result {
        None => info!("No hands detected"),
        Some(DetectionResult::Hands(hands)) => {
            for (index, wrist) in hands.wrists().enumerate() {
                info!(hand = index, x = wrist.x, y = wrist.y, "Wrist position");
            }
        }
        Some(DetectionResult::Markers(markers)) => {
            for group in &markers.groups {
                info!(group = %group.name, anchor = group.anchor_present, "Marker group");
            }
        }
    }
}
