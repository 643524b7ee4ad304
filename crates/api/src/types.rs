use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub(crate) struct CredentialsRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    /// Token lifetime in seconds
    pub expires_in: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub id: i64,
    pub username: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: String,
}

/// Whether the autoscaler acts on a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterState {
    Active,
    Paused,
}

impl ClusterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Metrics collector the autoscaler scrapes for this cluster
    pub collector_endpoint: String,
    /// CPU utilisation (percent) the autoscaler steers towards
    pub target_cpu: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub min_servers: u32,
    pub max_servers: u32,
    pub status: ClusterState,
    pub config: ClusterConfig,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClustersResponse {
    #[serde(default)]
    pub clusters: Vec<Cluster>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageResponse {
    pub message: String,
}

/// Body for creating or updating a cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSpec {
    pub name: String,
    pub min_servers: u32,
    pub max_servers: u32,
    pub config: ClusterConfig,
}

impl ClusterSpec {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::InvalidRequest("cluster name is required".to_string()));
        }
        if self.min_servers > self.max_servers {
            return Err(ApiError::InvalidRequest(format!(
                "min_servers ({}) exceeds max_servers ({})",
                self.min_servers, self.max_servers
            )));
        }
        if !(0.0..=100.0).contains(&self.config.target_cpu) {
            return Err(ApiError::InvalidRequest(format!(
                "target_cpu must be between 0 and 100, got {}",
                self.config.target_cpu
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCounts {
    pub active: u32,
    pub draining: u32,
    pub provisioning: u32,
    pub total: u32,
}

/// Server pool summary for one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub cluster_id: String,
    pub name: String,
    pub servers: ServerCounts,
    pub status: ClusterState,
}

/// Most recent aggregated sample for a cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestMetric {
    pub time: String,
    pub avg_cpu: f64,
    pub avg_memory: f64,
    /// Servers contributing to the sample
    pub sample_count: u32,
    #[serde(default)]
    pub max_cpu: Option<f64>,
    #[serde(default)]
    pub min_cpu: Option<f64>,
}

/// One raw per-server sample from the metrics history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMetric {
    pub time: String,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MetricsHistoryResponse {
    #[serde(default)]
    pub data: Option<Vec<ServerMetric>>,
}
