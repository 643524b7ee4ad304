//! Stream message types
//!
//! Inbound messages are JSON objects tagged by `type`; outbound control
//! messages are `subscribe`/`unsubscribe` requests for one cluster.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parse an RFC 3339 wire timestamp.
fn parse_timestamp(ts: Option<&str>) -> Option<DateTime<Utc>> {
    ts.and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    #[serde(other)]
    Other,
}

/// Health bucket of a resource (CPU or memory).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Normal,
    Warning,
    Critical,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
    #[serde(other)]
    Other,
}

/// Scaling action chosen by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScaleAction {
    ScaleUp,
    ScaleDown,
    Maintain,
}

impl ScaleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScaleUp => "SCALE_UP",
            Self::ScaleDown => "SCALE_DOWN",
            Self::Maintain => "MAINTAIN",
        }
    }
}

/// Aggregated cluster metrics pushed on every collection tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub avg_cpu: f64,
    pub avg_memory: f64,
    pub server_count: u32,
    pub cpu_status: ResourceStatus,
    pub memory_status: ResourceStatus,
    pub trend: Trend,
    pub has_spike: bool,
    pub spike_percent: f64,
    pub recommendation: String,
}

impl MetricsData {
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.timestamp.as_deref())
    }
}

/// A scaling decision computed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub action: ScaleAction,
    pub current_servers: u32,
    pub target_servers: u32,
    pub reason: String,
    pub prediction_used: bool,
    pub is_emergency: bool,
    pub cooldown_active: bool,
}

impl DecisionData {
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.timestamp.as_deref())
    }
}

/// Subscription acknowledgement (`"action": "subscribed"`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubscriptionUpdate {
    pub action: String,
    pub cluster_id: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl SubscriptionUpdate {
    pub fn is_subscribed(&self) -> bool {
        self.action == "subscribed"
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricsMessage {
    pub cluster_id: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub message: Option<String>,
    pub data: MetricsData,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecisionMessage {
    pub cluster_id: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub message: Option<String>,
    pub data: DecisionData,
}

/// Incoming messages from the stream endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum InboundMessage {
    SubscriptionUpdate(SubscriptionUpdate),
    Metrics(MetricsMessage),
    Decision(DecisionMessage),
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Wire tag, used for logging and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SubscriptionUpdate(_) => "subscription_update",
            Self::Metrics(_) => "metrics",
            Self::Decision(_) => "decision",
            Self::Unknown => "unknown",
        }
    }

    pub fn cluster_id(&self) -> Option<&str> {
        match self {
            Self::SubscriptionUpdate(m) => Some(&m.cluster_id),
            Self::Metrics(m) => Some(&m.cluster_id),
            Self::Decision(m) => Some(&m.cluster_id),
            Self::Unknown => None,
        }
    }
}

/// Outgoing control messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum ControlMessage {
    Subscribe { cluster_id: String },
    Unsubscribe { cluster_id: String },
}

impl ControlMessage {
    /// JSON text as sent over the socket
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
