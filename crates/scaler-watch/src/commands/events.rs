use anyhow::{bail, Context, Result};
use clap::Args;

use super::print_json;
use scaler_api::{ApiClient, TimeRange};

#[derive(Args, Debug)]
pub struct EventsArgs {
    /// Cluster to query (omit with --recent)
    #[arg(long, short)]
    pub cluster: Option<String>,

    /// Recent events across all clusters
    #[arg(long, conflicts_with = "cluster")]
    pub recent: bool,

    /// Aggregate counts instead of individual events
    #[arg(long, requires = "cluster")]
    pub stats: bool,

    #[arg(long, short, default_value = "24h")]
    pub range: TimeRange,

    #[arg(long, short, default_value_t = 20)]
    pub limit: u32,
}

pub async fn run(client: &ApiClient, args: &EventsArgs) -> Result<()> {
    let body = match (&args.cluster, args.recent) {
        (_, true) => client
            .recent_events(args.limit)
            .await
            .context("recent events")?,
        (Some(cluster), false) if args.stats => client
            .scaling_stats(cluster, args.range)
            .await
            .context("scaling stats")?,
        (Some(cluster), false) => client
            .cluster_events(cluster, args.range, args.limit)
            .await
            .context("cluster events")?,
        (None, false) => bail!("either --cluster or --recent is required"),
    };
    print_json(&body)
}
