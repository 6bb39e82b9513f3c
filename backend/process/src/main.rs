use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resync every known channel once.
    Sweep,

    /// Resync every known channel on a fixed period.
    Watch {
        /// Seconds between sweeps, defaults to RESYNC_PERIOD_SECS.
        #[arg(long)]
        period_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();

    match args.command {
        Command::Sweep => {
            let report = process::run_sweep().await?;
            if report.failed > 0 {
                anyhow::bail!("{} channels failed to sync", report.failed);
            }
        }
        Command::Watch { period_secs } => {
            process::run_watch(period_secs.map(Duration::from_secs)).await?;
        }
    }

    Ok(())
}
