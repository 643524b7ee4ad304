//! Message routing
//!
//! Applies one decoded message to the streaming state. Messages for any
//! cluster other than the active subscription are dropped.

use tracing::{debug, info, trace};

use crate::messages::InboundMessage;
use crate::state::StreamingState;

/// What the router did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Subscription acknowledged by the backend
    Subscribed,
    Metrics,
    Decision,
    /// Message for another cluster
    Discarded,
    /// Recognized type with nothing to apply (e.g. an `unsubscribed` update)
    Ignored,
    /// Unrecognized message type
    Unknown,
}

#[derive(Debug, Clone)]
pub struct Router {
    cluster_id: String,
}

impl Router {
    pub fn new(cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
        }
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    /// Route one message, returning the next state and what was applied.
    pub fn route(&self, state: &StreamingState, message: InboundMessage) -> (StreamingState, Routed) {
        if let Some(cluster_id) = message.cluster_id() {
            if cluster_id != self.cluster_id {
                trace!(
                    kind = message.kind(),
                    cluster_id = %cluster_id,
                    subscribed = %self.cluster_id,
                    "Discarding message for another cluster"
                );
                return (state.clone(), Routed::Discarded);
            }
        }

        match message {
            InboundMessage::SubscriptionUpdate(update) if update.is_subscribed() => {
                info!(cluster_id = %update.cluster_id, "Subscribed to cluster");
                let next = StreamingState {
                    is_subscribed: true,
                    error: None,
                    ..state.clone()
                };
                (next, Routed::Subscribed)
            }
            InboundMessage::SubscriptionUpdate(update) => {
                debug!(action = %update.action, "Ignoring subscription update");
                (state.clone(), Routed::Ignored)
            }
            InboundMessage::Metrics(msg) => {
                debug!(
                    avg_cpu = msg.data.avg_cpu,
                    avg_memory = msg.data.avg_memory,
                    servers = msg.data.server_count,
                    "Metrics updated"
                );
                let next = StreamingState {
                    latest_metrics: Some(msg.data),
                    ..state.clone()
                };
                (next, Routed::Metrics)
            }
            InboundMessage::Decision(msg) => {
                debug!(
                    action = msg.data.action.as_str(),
                    target = msg.data.target_servers,
                    "Decision updated"
                );
                let next = StreamingState {
                    latest_decision: Some(msg.data),
                    ..state.clone()
                };
                (next, Routed::Decision)
            }
            InboundMessage::Unknown => (state.clone(), Routed::Unknown),
        }
    }
}
