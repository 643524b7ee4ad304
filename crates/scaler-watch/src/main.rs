//! scaler-watch: operator CLI for the autoscaler
//!
//! Follows a cluster's live metrics/decision stream and wraps the REST API
//! for auth, cluster management and history queries.

mod commands;
mod server;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::{
    auth::{LoginArgs, RegisterArgs},
    clusters::ClustersArgs,
    events::EventsArgs,
    metrics::MetricsArgs,
    watch::WatchArgs,
};
use scaler_api::{ApiClient, Session, DEFAULT_API_URL};

#[derive(Parser, Debug)]
#[command(name = "scaler-watch", about = "Watch and manage autoscaled clusters")]
struct Cli {
    /// Autoscaler REST API base URL
    #[arg(long, global = true, default_value = DEFAULT_API_URL, env = "SCALER_API_URL")]
    api_url: String,

    /// Bearer token for API authentication
    #[arg(long, global = true, env = "SCALER_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow a cluster's live metrics and scaling decisions
    Watch(WatchArgs),
    /// Log in and print the issued token
    Login(LoginArgs),
    /// Create an account
    Register(RegisterArgs),
    /// Manage clusters
    Clusters(ClustersArgs),
    /// Query metrics
    Metrics(MetricsArgs),
    /// Query scaling events
    Events(EventsArgs),
}

impl Cli {
    fn api_client(&self) -> anyhow::Result<ApiClient> {
        let session = match &self.token {
            Some(token) => Session::with_token(token.clone()),
            None => Session::new(),
        };
        Ok(ApiClient::new(&self.api_url, session)?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Watch(args) => commands::watch::run(args).await,
        Command::Login(args) => commands::auth::login(&cli.api_client()?, args).await,
        Command::Register(args) => commands::auth::register(&cli.api_client()?, args).await,
        Command::Clusters(args) => commands::clusters::run(&cli.api_client()?, args).await,
        Command::Metrics(args) => commands::metrics::run(&cli.api_client()?, args).await,
        Command::Events(args) => commands::events::run(&cli.api_client()?, args).await,
    }
}
