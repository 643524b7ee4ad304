use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use super::print_json;
use scaler_api::{ApiClient, TimeRange};

#[derive(Args, Debug)]
pub struct MetricsArgs {
    #[command(subcommand)]
    pub command: MetricsCommand,
}

#[derive(Subcommand, Debug)]
pub enum MetricsCommand {
    /// Most recent aggregated sample
    Latest {
        #[arg(long, short)]
        cluster: String,
    },
    /// Raw per-server samples over a window (30s, 1m, 5m, ... 7d, 30d)
    History {
        #[arg(long, short)]
        cluster: String,
        #[arg(long, short, default_value = "1h")]
        range: TimeRange,
    },
    /// Hourly rollups over a window
    Hourly {
        #[arg(long, short)]
        cluster: String,
        #[arg(long, short, default_value = "24h")]
        range: TimeRange,
    },
}

pub async fn run(client: &ApiClient, args: &MetricsArgs) -> Result<()> {
    match &args.command {
        MetricsCommand::Latest { cluster } => {
            let latest = client
                .latest_metric(cluster)
                .await
                .context("latest metric")?;
            print_json(&latest)
        }
        MetricsCommand::History { cluster, range } => {
            let samples = client
                .metrics_history(cluster, *range)
                .await
                .context("metrics history")?;
            for s in &samples {
                println!("{}  cpu {:>6.2}%  mem {:>6.2}%", s.time, s.cpu_usage, s.memory_usage);
            }
            Ok(())
        }
        MetricsCommand::Hourly { cluster, range } => {
            let hourly = client
                .hourly_metrics(cluster, *range)
                .await
                .context("hourly metrics")?;
            print_json(&hourly)
        }
    }
}
