//! scaler-stream: live metrics and scaling-decision feed for autoscaled clusters
//!
//! Opens a duplex WebSocket session to the autoscaler backend, subscribes to a
//! single cluster, decodes the (possibly multi-object) payloads it pushes and
//! exposes the latest metrics/decision snapshot to any number of readers.
//! Connection loss is recovered with a bounded, fixed-delay reconnect policy.

pub mod client;
pub mod config;
pub mod error;
pub mod frame;
pub mod machine;
pub mod messages;
pub mod metrics;
pub mod reconnect;
pub mod router;
pub mod state;
pub mod traits;

pub use client::{StreamClient, StreamHandle};
pub use config::StreamConfig;
pub use error::{ConfigError, StreamError};
pub use frame::{decode_payload, DecodedPayload, FrameGap, FrameScanner};
pub use machine::{ConnId, ConnectionMachine, Effect, Event, Lifecycle};
pub use messages::{
    ControlMessage, DecisionData, DecisionMessage, InboundMessage, MetricsData, MetricsMessage,
    ResourceStatus, ScaleAction, Severity, SubscriptionUpdate, Trend,
};
pub use reconnect::{ReconnectDecision, ReconnectPolicy};
pub use router::{Routed, Router};
pub use state::{Phase, StreamingState};
pub use traits::{NoopObserver, StreamObserver};
