use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hostpulse_lib::dashboard::run_dashboard;
use hostpulse_lib::{
    AnomalyMonitor, Collector, HistoryStore, MonitorConfig, SamplingLoop, SysinfoSource,
};
use log::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "hostpulse", about = "Sample host telemetry and flag unusual load")]
struct Args {
    /// Config file (defaults to the per-user config directory)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Total sampling cycle time in seconds
    #[arg(long)]
    interval: Option<u64>,
    /// Expected outlier fraction, in (0, 0.5]
    #[arg(long)]
    contamination: Option<f64>,
    /// Samples required before the first training
    #[arg(long)]
    min_samples: Option<usize>,
    /// Samples between retrains
    #[arg(long)]
    relearning_interval: Option<usize>,
    /// Samples shown in the display window
    #[arg(long)]
    window: Option<usize>,
    /// Print one JSON frame per line instead of text
    #[arg(long)]
    json: bool,
}

impl Args {
    fn apply(&self, config: &mut MonitorConfig) {
        if let Some(secs) = self.interval {
            config.sampling.run_interval_secs = secs;
        }
        if let Some(contamination) = self.contamination {
            config.detector.contamination = contamination;
        }
        if let Some(min_samples) = self.min_samples {
            config.detector.min_samples = min_samples;
        }
        if let Some(relearning) = self.relearning_interval {
            config.detector.relearning_interval = relearning;
        }
        if let Some(window) = self.window {
            config.display.window = window;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let path = args.config.clone().unwrap_or_else(MonitorConfig::default_path);
    let mut config = MonitorConfig::load_or_default(&path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;
    info!("hostpulse starting (config: {})", path.display());

    let source = Arc::new(SysinfoSource::new());
    let collector = Arc::new(Collector::new(source));
    let history = HistoryStore::new();
    let sampler = SamplingLoop::new(collector, history.clone(), config.sampling.run_interval());
    sampler.start().context("starting sampling loop")?;

    let mut monitor = AnomalyMonitor::new(config.detector.clone())?;
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {}", err);
        }
    };
    let frames = run_dashboard(
        &history,
        &mut monitor,
        &config.display,
        args.json,
        &mut std::io::stdout(),
        shutdown,
    )
    .await;

    info!("shutting down");
    sampler.stop();
    sampler.join().await;
    let frames = frames.context("writing dashboard frames")?;
    info!(
        "collected {} samples, rendered {} frames",
        history.len().await,
        frames
    );
    Ok(())
}
