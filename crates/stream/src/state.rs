use serde::Serialize;
use std::fmt;

use crate::messages::{DecisionData, MetricsData};

/// Latest-known projection of the stream, shared with every reader.
///
/// Fields are replaced wholesale by the newest matching message; nothing is
/// merged across messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingState {
    pub latest_metrics: Option<MetricsData>,
    pub latest_decision: Option<DecisionData>,
    pub is_connected: bool,
    pub is_subscribed: bool,
    pub error: Option<String>,
    pub reconnect_count: u32,
}

/// Connection lifecycle phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Connecting,
    Open,
    Subscribing,
    Subscribed,
    Closing,
    Closed,
}

impl Phase {
    /// Socket handshake finished and not yet closed
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open | Self::Subscribing | Self::Subscribed)
    }

    /// A socket exists or is being established
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting) || self.is_open()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Subscribing => "subscribing",
            Self::Subscribed => "subscribed",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
