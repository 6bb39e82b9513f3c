//! # Channel Processing
//!
//! Offline counterpart of the server's scheduled resync. Connects to the same Redis, walks
//! every channel in `channels:all` and requests a resync for each one.
//!
//! ## Throttle
//! Runs go through the same per-channel throttle as the HTTP endpoint, so running a sweep next
//! to a live server never crawls a channel twice inside the resync interval.
//!
//! ## Modes
//! - `sweep`: one pass with a progress bar, then exit
//! - `watch`: a pass every period until interrupted
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use shorts_server::{
    config::Config,
    ingest::{Ingestor, ResyncStatus},
    scheduler::{SweepReport, sweep_channels},
    state::AppState,
};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

pub async fn run_sweep() -> Result<SweepReport> {
    let state = connect().await?;

    sweep_with_progress(&state.ingestor).await
}

pub async fn run_watch(period: Option<Duration>) -> Result<()> {
    let state = connect().await?;
    let period = period.unwrap_or(Duration::from_secs(state.config.resync_period_secs));

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = sweep_with_progress(&state.ingestor).await {
                    error!("Sweep aborted: {e:#}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping watch");
                return Ok(());
            }
        }
    }
}

async fn connect() -> Result<std::sync::Arc<AppState>> {
    let config = Config::load();
    info!("Connecting to {}", config.redis_url);

    AppState::new(config)
        .await
        .context("Failed to initialize channel processing")
}

async fn sweep_with_progress(ingestor: &Ingestor) -> Result<SweepReport> {
    let total = ingestor
        .catalog()
        .list_all_channels()
        .await
        .context("Failed to list channels")?
        .len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .context("Invalid progress template")?
        .progress_chars("=> "),
    );

    let report = sweep_channels(ingestor, |channel_id, outcome| {
        let message = match outcome {
            Ok(ResyncStatus::Synced(count)) => format!("{channel_id}: {count} videos"),
            Ok(ResyncStatus::Ignored) => format!("{channel_id}: ignored"),
            Err(e) => format!("{channel_id}: {e}"),
        };
        pb.set_message(message);
        pb.inc(1);
    })
    .await
    .context("Sweep failed")?;

    pb.finish_with_message("Done");

    println!("Synced Channels: {}", report.synced);
    println!("Ignored Channels: {}", report.ignored);
    println!("Failed Channels: {}\n", report.failed);

    Ok(report)
}
