use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use super::print_json;
use scaler_api::{ApiClient, ClusterConfig, ClusterSpec};

#[derive(Args, Debug)]
pub struct ClustersArgs {
    #[command(subcommand)]
    pub command: ClustersCommand,
}

#[derive(Subcommand, Debug)]
pub enum ClustersCommand {
    /// List all clusters
    List,
    /// Show one cluster
    Get { id: String },
    /// Create a cluster
    Create(SpecArgs),
    /// Replace a cluster's settings
    Update {
        id: String,
        #[command(flatten)]
        spec: SpecArgs,
    },
    /// Delete a cluster
    Delete { id: String },
    /// Show the server pool of a cluster
    Status { id: String },
}

#[derive(Args, Debug)]
pub struct SpecArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub min_servers: u32,

    #[arg(long)]
    pub max_servers: u32,

    /// Metrics collector endpoint scraped by the autoscaler
    #[arg(long)]
    pub collector_endpoint: String,

    /// Target CPU utilisation in percent
    #[arg(long, default_value_t = 70.0)]
    pub target_cpu: f64,
}

impl SpecArgs {
    pub fn to_spec(&self) -> ClusterSpec {
        ClusterSpec {
            name: self.name.clone(),
            min_servers: self.min_servers,
            max_servers: self.max_servers,
            config: ClusterConfig {
                collector_endpoint: self.collector_endpoint.clone(),
                target_cpu: self.target_cpu,
            },
        }
    }
}

pub async fn run(client: &ApiClient, args: &ClustersArgs) -> Result<()> {
    match &args.command {
        ClustersCommand::List => {
            let clusters = client.list_clusters().await.context("list clusters")?;
            for c in &clusters {
                println!(
                    "{}  {:<24} {:<7} servers {}-{}  target cpu {}%",
                    c.id,
                    c.name,
                    c.status.as_str(),
                    c.min_servers,
                    c.max_servers,
                    c.config.target_cpu
                );
            }
            if clusters.is_empty() {
                println!("no clusters");
            }
            Ok(())
        }
        ClustersCommand::Get { id } => {
            let cluster = client.get_cluster(id).await.context("get cluster")?;
            print_json(&cluster)
        }
        ClustersCommand::Create(spec) => {
            let cluster = client
                .create_cluster(&spec.to_spec())
                .await
                .context("create cluster")?;
            print_json(&cluster)
        }
        ClustersCommand::Update { id, spec } => {
            let cluster = client
                .update_cluster(id, &spec.to_spec())
                .await
                .context("update cluster")?;
            print_json(&cluster)
        }
        ClustersCommand::Delete { id } => {
            let message = client.delete_cluster(id).await.context("delete cluster")?;
            println!("{}", message);
            Ok(())
        }
        ClustersCommand::Status { id } => {
            let status = client.cluster_status(id).await.context("cluster status")?;
            print_json(&status)
        }
    }
}
