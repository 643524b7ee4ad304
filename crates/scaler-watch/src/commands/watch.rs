//! `watch`: follow one cluster's live stream until Ctrl+C

use anyhow::{Context, Result};
use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::server::{run_server, ServerState};
use scaler_stream::{StreamClient, StreamConfig, StreamObserver, StreamingState};

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Cluster to subscribe to
    #[arg(long, short)]
    pub cluster: String,

    /// Stream configuration file (YAML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// WebSocket endpoint, overrides the config file and SCALER_WS_URL
    #[arg(long)]
    pub url: Option<String>,

    /// Health server bind address
    #[arg(long, default_value = "0.0.0.0:9090")]
    pub health_addr: String,
}

/// Logs socket lifecycle callbacks
struct LogObserver {
    cluster_id: String,
}

impl StreamObserver for LogObserver {
    fn on_open(&self) {
        info!(cluster_id = %self.cluster_id, "Stream opened");
    }

    fn on_close(&self, code: Option<u16>, reason: &str) {
        info!(cluster_id = %self.cluster_id, ?code, reason, "Stream closed");
    }

    fn on_error(&self, message: &str) {
        warn!(cluster_id = %self.cluster_id, error = %message, "Stream error");
    }
}

/// A noteworthy difference between two snapshots
#[derive(Debug, Clone, PartialEq)]
enum Change {
    Connected(bool),
    Subscribed(bool),
    Metrics,
    Decision,
    Error(String),
    Reconnecting(u32),
}

fn changes(prev: &StreamingState, next: &StreamingState) -> Vec<Change> {
    let mut out = Vec::new();
    if prev.is_connected != next.is_connected {
        out.push(Change::Connected(next.is_connected));
    }
    if prev.is_subscribed != next.is_subscribed {
        out.push(Change::Subscribed(next.is_subscribed));
    }
    if next.latest_metrics.is_some() && prev.latest_metrics != next.latest_metrics {
        out.push(Change::Metrics);
    }
    if next.latest_decision.is_some() && prev.latest_decision != next.latest_decision {
        out.push(Change::Decision);
    }
    if let Some(err) = &next.error {
        if prev.error.as_ref() != Some(err) {
            out.push(Change::Error(err.clone()));
        }
    }
    if next.reconnect_count > 0 && prev.reconnect_count != next.reconnect_count {
        out.push(Change::Reconnecting(next.reconnect_count));
    }
    out
}

fn log_change(change: &Change, state: &StreamingState) {
    match change {
        Change::Connected(true) => info!("Connected"),
        Change::Connected(false) => warn!("Disconnected"),
        Change::Subscribed(true) => info!("Subscribed"),
        Change::Subscribed(false) => info!("Unsubscribed"),
        Change::Metrics => {
            if let Some(m) = &state.latest_metrics {
                info!(
                    avg_cpu = m.avg_cpu,
                    avg_memory = m.avg_memory,
                    servers = m.server_count,
                    cpu_status = ?m.cpu_status,
                    memory_status = ?m.memory_status,
                    trend = ?m.trend,
                    spike = m.has_spike,
                    recommendation = %m.recommendation,
                    "Metrics"
                );
            }
        }
        Change::Decision => {
            if let Some(d) = &state.latest_decision {
                info!(
                    action = d.action.as_str(),
                    current = d.current_servers,
                    target = d.target_servers,
                    emergency = d.is_emergency,
                    cooldown = d.cooldown_active,
                    reason = %d.reason,
                    "Decision"
                );
            }
        }
        Change::Error(err) => warn!(error = %err, "Stream error state"),
        Change::Reconnecting(attempt) => info!(attempt, "Reconnect scheduled"),
    }
}

pub async fn run(args: &WatchArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => StreamConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => StreamConfig::default(),
    };
    let mut config = config.with_env_overrides();
    if let Some(url) = &args.url {
        config = config.with_url(url.clone());
    }
    let health_addr: SocketAddr = args
        .health_addr
        .parse()
        .with_context(|| format!("invalid health address {}", args.health_addr))?;

    info!(cluster_id = %args.cluster, url = %config.url, "Starting watch");

    let observer = Arc::new(LogObserver {
        cluster_id: args.cluster.clone(),
    });
    let client = StreamClient::spawn(config, args.cluster.clone(), observer)?;
    let handle = client.handle();

    let server_state = ServerState::new(args.cluster.clone(), handle.watch_state());
    tokio::spawn(async move {
        if let Err(e) = run_server(health_addr, server_state).await {
            error!(error = %e, "Health server failed");
        }
    });
    info!(addr = %health_addr, "Health server listening");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_tx.send(true).ok();
    });

    let mut state_rx = handle.watch_state();
    let mut previous = StreamingState::default();
    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    warn!("Stream client stopped unexpectedly");
                    break;
                }
                let current = state_rx.borrow_and_update().clone();
                for change in changes(&previous, &current) {
                    log_change(&change, &current);
                }
                previous = current;
            }
            _ = shutdown_rx.changed() => break,
        }
    }

    client.shutdown().await?;
    info!("Watch stopped");
    Ok(())
}
