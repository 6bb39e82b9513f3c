//! # Scheduled Resync
//!
//! Independent task that sweeps every known channel once per period. It only talks to the
//! [`Ingestor`] through `request_resync`, so the per-channel throttle bounds its load too.
use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{error, info};

use crate::{
    error::AppError,
    ingest::{Ingestor, ResyncStatus},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub synced: usize,
    pub ignored: usize,
    pub failed: usize,
}

/// Requests a resync for every channel, reporting each outcome to `on_channel`.
pub async fn sweep_channels<F>(ingestor: &Ingestor, mut on_channel: F) -> Result<SweepReport, AppError>
where
    F: FnMut(&str, &Result<ResyncStatus, AppError>),
{
    let channels = ingestor.catalog().list_all_channels().await?;
    let mut report = SweepReport::default();

    for channel in channels {
        let outcome = ingestor.request_resync(&channel.id).await;

        match &outcome {
            Ok(ResyncStatus::Synced(_)) => report.synced += 1,
            Ok(ResyncStatus::Ignored) => report.ignored += 1,
            Err(e) => {
                error!("Scheduled sync of {} failed: {e}", channel.id);
                report.failed += 1;
            }
        }

        on_channel(&channel.id, &outcome);
    }

    Ok(report)
}

/// Sweeps on a fixed period, first sweep one period from now.
pub fn spawn_resync_schedule(ingestor: Arc<Ingestor>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            info!("Starting scheduled channel sweep");

            match sweep_channels(&ingestor, |_, _| {}).await {
                Ok(report) => info!(
                    "Sweep done: {} synced, {} ignored, {} failed",
                    report.synced, report.ignored, report.failed
                ),
                Err(e) => error!("Sweep aborted: {e}"),
            }
        }
    })
}
