//! Connection state machine
//!
//! A pure, synchronous transition system. The driver feeds it transport
//! events and consumer commands and executes the [`Effect`]s it returns in
//! order. No I/O happens here, so every transition is testable without a
//! socket.
//!
//! Each socket gets a fresh [`ConnId`]. Transport events tagged with any other
//! id are ignored, so a socket that is being torn down can never disturb its
//! replacement.

use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::config::StreamConfig;
use crate::frame::decode_payload;
use crate::messages::{ControlMessage, InboundMessage};
use crate::metrics::StreamMetrics;
use crate::reconnect::{ReconnectDecision, ReconnectPolicy};
use crate::router::{Routed, Router};
use crate::state::{Phase, StreamingState};

/// Close code sent on teardown
pub const NORMAL_CLOSURE: u16 = 1000;

pub const TEARDOWN_REASON: &str = "Client teardown";
pub const TRANSPORT_ERROR: &str = "WebSocket connection error";
pub const PARSE_ERROR: &str = "Failed to parse message";

/// Identifies one socket instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub u64);

/// Inputs to the machine
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Consumer enables streaming
    Enable,
    /// Consumer unmounts or disables streaming
    Teardown,
    /// Consumer switches to another cluster
    Retarget(String),
    /// Handshake completed
    Opened { conn: ConnId },
    /// Text payload received
    Payload { conn: ConnId, text: String },
    TransportError { conn: ConnId, message: String },
    Closed {
        conn: ConnId,
        code: Option<u16>,
        reason: String,
    },
    /// Scheduled reconnect delay elapsed
    ReconnectDue,
    /// Consumer-supplied outbound payload
    Send(Value),
}

/// Lifecycle notifications for observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    Opened,
    Closed { code: Option<u16>, reason: String },
    Error(String),
}

/// Work for the driver
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start a handshake for a new socket
    Connect { conn: ConnId, url: String },
    /// Write a text frame on the current socket
    Send(String),
    /// Close the current socket (or abandon the pending handshake)
    Close { code: u16, reason: &'static str },
    ScheduleReconnect(Duration),
    CancelReconnect,
    Notify(Lifecycle),
}

pub struct ConnectionMachine {
    config: StreamConfig,
    router: Router,
    phase: Phase,
    state: StreamingState,
    policy: ReconnectPolicy,
    /// Streaming requested by the consumer
    enabled: bool,
    /// Set on teardown so the following close does not reconnect
    intentional_close: bool,
    reconnect_pending: bool,
    conn: Option<ConnId>,
    last_conn: u64,
    metrics: StreamMetrics,
}

impl ConnectionMachine {
    pub fn new(config: StreamConfig, cluster_id: impl Into<String>) -> Self {
        let cluster_id = cluster_id.into();
        Self {
            policy: ReconnectPolicy::from_config(&config),
            metrics: StreamMetrics::new(cluster_id.clone()),
            router: Router::new(cluster_id),
            config,
            phase: Phase::Idle,
            state: StreamingState::default(),
            enabled: false,
            intentional_close: false,
            reconnect_pending: false,
            conn: None,
            last_conn: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &StreamingState {
        &self.state
    }

    pub fn cluster_id(&self) -> &str {
        self.router.cluster_id()
    }

    pub fn current_conn(&self) -> Option<ConnId> {
        self.conn
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Enable => {
                self.enabled = true;
                self.start()
            }
            Event::Teardown => {
                self.enabled = false;
                self.close_intentionally()
            }
            Event::Retarget(cluster_id) => self.retarget(cluster_id),
            Event::Opened { conn } if self.is_current(conn) => self.on_open(),
            Event::Payload { conn, text } if self.is_current(conn) => self.on_payload(&text),
            Event::TransportError { conn, message } if self.is_current(conn) => {
                self.on_transport_error(message)
            }
            Event::Closed { conn, code, reason } if self.is_current(conn) => {
                self.on_close(code, reason)
            }
            Event::ReconnectDue => self.on_reconnect_due(),
            Event::Send(value) => self.send(value),
            stale => {
                trace!(event = ?stale, "Ignoring event from a replaced connection");
                Vec::new()
            }
        }
    }

    fn is_current(&self, conn: ConnId) -> bool {
        self.conn == Some(conn)
    }

    /// idle/closed -> connecting
    fn start(&mut self) -> Vec<Effect> {
        if self.router.cluster_id().is_empty() {
            warn!("No cluster id, not connecting");
            return Vec::new();
        }
        if self.phase.is_active() {
            debug!(phase = %self.phase, "Already connecting or connected");
            return Vec::new();
        }

        self.intentional_close = false;
        self.policy.reset();

        let mut effects = Vec::new();
        if self.reconnect_pending {
            self.reconnect_pending = false;
            effects.push(Effect::CancelReconnect);
        }
        effects.extend(self.connect());
        effects
    }

    fn connect(&mut self) -> Vec<Effect> {
        self.last_conn += 1;
        let conn = ConnId(self.last_conn);
        self.conn = Some(conn);
        self.reconnect_pending = false;
        self.phase = Phase::Connecting;

        info!(
            url = %self.config.url,
            cluster_id = %self.router.cluster_id(),
            conn = conn.0,
            "Connecting to stream"
        );

        vec![Effect::Connect {
            conn,
            url: self.config.url.clone(),
        }]
    }

    /// connecting -> open -> subscribing
    fn on_open(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Connecting {
            debug!(phase = %self.phase, "Ignoring open outside of connecting");
            return Vec::new();
        }

        info!(cluster_id = %self.router.cluster_id(), "Stream connected");
        self.phase = Phase::Open;
        self.policy.reset();
        self.metrics.set_connected();
        self.state = StreamingState {
            is_connected: true,
            error: None,
            reconnect_count: 0,
            ..self.state.clone()
        };

        let subscribe = ControlMessage::Subscribe {
            cluster_id: self.router.cluster_id().to_string(),
        };
        self.phase = Phase::Subscribing;

        let mut effects: Vec<Effect> = control_effect(&subscribe).into_iter().collect();
        effects.push(Effect::Notify(Lifecycle::Opened));
        effects
    }

    fn on_payload(&mut self, text: &str) -> Vec<Effect> {
        if !self.phase.is_open() {
            debug!(phase = %self.phase, "Ignoring payload on a socket that is not open");
            return Vec::new();
        }

        let decoded = decode_payload(text);
        let mut failures = decoded.failures;

        for frame in decoded.frames {
            let kind = frame.get("type").and_then(Value::as_str).map(str::to_owned);
            let Some(kind) = kind else {
                warn!(message = %frame, "Unknown message type");
                continue;
            };

            // Foreign traffic is dropped before shape checks
            if let Some(cluster_id) = frame.get("cluster_id").and_then(Value::as_str) {
                if cluster_id != self.router.cluster_id() {
                    trace!(
                        kind = %kind,
                        cluster_id = %cluster_id,
                        subscribed = %self.router.cluster_id(),
                        "Discarding message for another cluster"
                    );
                    continue;
                }
            }

            let message = match InboundMessage::from_value(frame) {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, kind = %kind, "Invalid message");
                    failures += 1;
                    continue;
                }
            };

            if message == InboundMessage::Unknown {
                warn!(kind = %kind, "Unknown message type");
                continue;
            }

            self.metrics.inc_message(message.kind());
            let (next, routed) = self.router.route(&self.state, message);
            self.state = next;

            if routed == Routed::Subscribed && self.phase == Phase::Subscribing {
                self.phase = Phase::Subscribed;
            }
        }

        if failures > 0 {
            self.metrics.add_decode_failures(failures);
            self.state = StreamingState {
                error: Some(PARSE_ERROR.to_string()),
                ..self.state.clone()
            };
        }

        Vec::new()
    }

    /// Errors are surfaced but the close that follows drives the transition.
    fn on_transport_error(&mut self, message: String) -> Vec<Effect> {
        if self.phase == Phase::Closing {
            debug!(error = %message, "Ignoring transport error while closing");
            return Vec::new();
        }
        warn!(error = %message, "Stream transport error");
        self.state = StreamingState {
            error: Some(TRANSPORT_ERROR.to_string()),
            ..self.state.clone()
        };
        vec![Effect::Notify(Lifecycle::Error(message))]
    }

    fn on_close(&mut self, code: Option<u16>, reason: String) -> Vec<Effect> {
        info!(?code, reason = %reason, phase = %self.phase, "Stream closed");

        let notify = Effect::Notify(Lifecycle::Closed { code, reason });

        if self.phase == Phase::Closing {
            self.phase = Phase::Closed;
            self.conn = None;
            return vec![notify];
        }
        if !self.phase.is_active() {
            return Vec::new();
        }

        self.phase = Phase::Closed;
        self.conn = None;
        self.metrics.set_disconnected();
        self.state = StreamingState {
            is_connected: false,
            is_subscribed: false,
            ..self.state.clone()
        };

        let mut effects = vec![notify];
        if self.intentional_close || !self.config.reconnect {
            return effects;
        }

        match self.policy.on_unplanned_close() {
            ReconnectDecision::Retry { attempt, delay } => {
                info!(
                    attempt,
                    max_attempts = self.policy.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Reconnecting"
                );
                self.metrics.inc_reconnect();
                self.reconnect_pending = true;
                self.state = StreamingState {
                    reconnect_count: attempt,
                    ..self.state.clone()
                };
                effects.push(Effect::ScheduleReconnect(delay));
            }
            ReconnectDecision::Exhausted { max_attempts } => {
                warn!(max_attempts, "Reconnect budget exhausted");
                self.state = StreamingState {
                    error: Some(format!(
                        "Failed to reconnect after {} attempts",
                        max_attempts
                    )),
                    ..self.state.clone()
                };
            }
        }

        effects
    }

    /// closed -> connecting
    fn on_reconnect_due(&mut self) -> Vec<Effect> {
        if !self.reconnect_pending || self.intentional_close || self.phase != Phase::Closed {
            debug!(phase = %self.phase, "Ignoring stale reconnect timer");
            self.reconnect_pending = false;
            return Vec::new();
        }
        self.connect()
    }

    /// any -> closing/closed, no reconnection
    fn close_intentionally(&mut self) -> Vec<Effect> {
        self.intentional_close = true;
        let mut effects = Vec::new();

        if self.reconnect_pending {
            self.reconnect_pending = false;
            effects.push(Effect::CancelReconnect);
        }

        if matches!(self.phase, Phase::Subscribing | Phase::Subscribed) {
            let unsubscribe = ControlMessage::Unsubscribe {
                cluster_id: self.router.cluster_id().to_string(),
            };
            effects.extend(control_effect(&unsubscribe));
        }

        if self.phase.is_active() {
            info!(cluster_id = %self.router.cluster_id(), "Closing stream");
            effects.push(Effect::Close {
                code: NORMAL_CLOSURE,
                reason: TEARDOWN_REASON,
            });
            self.phase = Phase::Closing;
        } else if self.phase != Phase::Idle {
            self.phase = Phase::Closed;
        }

        self.metrics.set_disconnected();
        self.state = StreamingState::default();
        effects
    }

    /// Tear down and, if streaming is enabled, reconnect for the new cluster.
    fn retarget(&mut self, cluster_id: String) -> Vec<Effect> {
        if cluster_id == self.router.cluster_id() {
            return Vec::new();
        }

        info!(from = %self.router.cluster_id(), to = %cluster_id, "Switching cluster");
        let mut effects = self.close_intentionally();
        self.metrics.remove();
        self.router = Router::new(cluster_id.clone());
        self.metrics = StreamMetrics::new(cluster_id);

        if self.enabled {
            effects.extend(self.start());
        }
        effects
    }

    fn send(&mut self, value: Value) -> Vec<Effect> {
        if !self.phase.is_open() {
            warn!(phase = %self.phase, "Stream is not connected, dropping outbound message");
            return Vec::new();
        }
        vec![Effect::Send(value.to_string())]
    }
}

fn control_effect(message: &ControlMessage) -> Option<Effect> {
    match message.to_text() {
        Ok(text) => Some(Effect::Send(text)),
        Err(e) => {
            warn!(error = %e, message = ?message, "Failed to serialize control message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> StreamConfig {
        StreamConfig::default().with_url("ws://autoscaler.test/ws")
    }

    fn subscribe_text(cluster: &str) -> String {
        ControlMessage::Subscribe {
            cluster_id: cluster.to_string(),
        }
        .to_text()
        .unwrap()
    }

    fn unsubscribe_text(cluster: &str) -> String {
        ControlMessage::Unsubscribe {
            cluster_id: cluster.to_string(),
        }
        .to_text()
        .unwrap()
    }

    fn metrics_json(cluster: &str, cpu: f64) -> String {
        json!({
            "type": "metrics",
            "cluster_id": cluster,
            "timestamp": "2025-01-14T10:30:00Z",
            "severity": "info",
            "message": "tick",
            "data": {
                "avg_cpu": cpu,
                "avg_memory": 40.0,
                "server_count": 3,
                "cpu_status": "normal",
                "memory_status": "normal",
                "trend": "stable",
                "has_spike": false,
                "spike_percent": 0.0,
                "recommendation": "none"
            }
        })
        .to_string()
    }

    fn decision_json(cluster: &str, target: u32) -> String {
        json!({
            "type": "decision",
            "cluster_id": cluster,
            "timestamp": "2025-01-14T10:30:05Z",
            "severity": "info",
            "message": "scale",
            "data": {
                "action": "SCALE_UP",
                "current_servers": 3,
                "target_servers": target,
                "reason": "cpu above target",
                "prediction_used": true,
                "is_emergency": false,
                "cooldown_active": false
            }
        })
        .to_string()
    }

    fn subscribed_json(cluster: &str) -> String {
        json!({
            "type": "subscription_update",
            "action": "subscribed",
            "cluster_id": cluster,
            "timestamp": "2025-01-14T10:29:59Z"
        })
        .to_string()
    }

    fn connect_conn(effects: &[Effect]) -> ConnId {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::Connect { conn, .. } => Some(*conn),
                _ => None,
            })
            .expect("expected a Connect effect")
    }

    /// Enable and open, returning the live connection id
    fn opened(machine: &mut ConnectionMachine) -> ConnId {
        let conn = connect_conn(&machine.handle(Event::Enable));
        machine.handle(Event::Opened { conn });
        conn
    }

    fn subscribed(machine: &mut ConnectionMachine, cluster: &str) -> ConnId {
        let conn = opened(machine);
        machine.handle(Event::Payload {
            conn,
            text: subscribed_json(cluster),
        });
        conn
    }

    fn close(machine: &mut ConnectionMachine, conn: ConnId) -> Vec<Effect> {
        machine.handle(Event::Closed {
            conn,
            code: Some(1006),
            reason: "abnormal".to_string(),
        })
    }

    #[test]
    fn test_enable_connects_once() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        assert_eq!(machine.phase(), Phase::Idle);

        let effects = machine.handle(Event::Enable);
        assert_eq!(
            effects,
            vec![Effect::Connect {
                conn: ConnId(1),
                url: "ws://autoscaler.test/ws".to_string(),
            }]
        );
        assert_eq!(machine.phase(), Phase::Connecting);

        // already connecting
        assert!(machine.handle(Event::Enable).is_empty());
    }

    #[test]
    fn test_enable_without_cluster_is_noop() {
        let mut machine = ConnectionMachine::new(config(), "");
        assert!(machine.handle(Event::Enable).is_empty());
        assert_eq!(machine.phase(), Phase::Idle);
    }

    #[test]
    fn test_open_subscribes_before_anything_else() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let conn = connect_conn(&machine.handle(Event::Enable));

        let effects = machine.handle(Event::Opened { conn });
        assert_eq!(effects[0], Effect::Send(subscribe_text("c1")));
        assert_eq!(effects[1], Effect::Notify(Lifecycle::Opened));
        assert_eq!(
            effects.iter().filter(|e| matches!(e, Effect::Send(_))).count(),
            1
        );

        assert_eq!(machine.phase(), Phase::Subscribing);
        assert!(machine.state().is_connected);
        assert!(!machine.state().is_subscribed);
        assert!(machine.state().error.is_none());
    }

    #[test]
    fn test_subscription_ack_completes_subscribe() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let conn = opened(&mut machine);

        machine.handle(Event::Payload {
            conn,
            text: subscribed_json("c1"),
        });

        assert_eq!(machine.phase(), Phase::Subscribed);
        assert!(machine.state().is_subscribed);
    }

    #[test]
    fn test_ack_for_other_cluster_does_not_subscribe() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let conn = opened(&mut machine);

        machine.handle(Event::Payload {
            conn,
            text: subscribed_json("c2"),
        });

        assert_eq!(machine.phase(), Phase::Subscribing);
        assert!(!machine.state().is_subscribed);
    }

    #[test]
    fn test_concatenated_payload_updates_both_snapshots() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let conn = subscribed(&mut machine, "c1");

        let payload = format!("{}{}", metrics_json("c1", 72.5), decision_json("c1", 5));
        machine.handle(Event::Payload { conn, text: payload });

        let state = machine.state();
        assert_eq!(state.latest_metrics.as_ref().map(|m| m.avg_cpu), Some(72.5));
        assert_eq!(state.latest_decision.as_ref().map(|d| d.target_servers), Some(5));
        assert!(state.error.is_none());
    }

    #[test]
    fn test_other_cluster_messages_are_discarded() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let conn = subscribed(&mut machine, "c1");
        machine.handle(Event::Payload {
            conn,
            text: metrics_json("c1", 10.0),
        });
        let before = machine.state().clone();

        machine.handle(Event::Payload {
            conn,
            text: format!("{}\n{}", metrics_json("c2", 99.0), decision_json("c2", 9)),
        });

        assert_eq!(machine.state(), &before);
    }

    #[test]
    fn test_foreign_cluster_is_dropped_before_shape_checks() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let conn = subscribed(&mut machine, "c1");

        machine.handle(Event::Payload {
            conn,
            text: r#"{"type":"metrics","cluster_id":"c2","data":{"avg_cpu":1}}"#.to_string(),
        });

        assert!(machine.state().error.is_none());
        assert!(machine.state().latest_metrics.is_none());
        assert!(machine.state().is_subscribed);
    }

    #[test]
    fn test_unexpected_severity_still_updates_metrics() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let conn = subscribed(&mut machine, "c1");

        let text = metrics_json("c1", 91.0)
            .replace(r#""severity":"info""#, r#""severity":"critical""#);
        machine.handle(Event::Payload { conn, text });

        assert!(machine.state().error.is_none());
        assert_eq!(
            machine.state().latest_metrics.as_ref().map(|m| m.avg_cpu),
            Some(91.0)
        );
    }

    #[test]
    fn test_malformed_payload_sets_parse_error_without_closing() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let conn = subscribed(&mut machine, "c1");

        let effects = machine.handle(Event::Payload {
            conn,
            text: format!("{}\nnot-json", metrics_json("c1", 33.0)),
        });

        assert!(effects.is_empty());
        assert_eq!(machine.phase(), Phase::Subscribed);
        assert_eq!(machine.state().error.as_deref(), Some(PARSE_ERROR));
        // the good line still applied
        assert_eq!(
            machine.state().latest_metrics.as_ref().map(|m| m.avg_cpu),
            Some(33.0)
        );
    }

    #[test]
    fn test_invalid_message_shape_counts_as_parse_error() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let conn = subscribed(&mut machine, "c1");

        machine.handle(Event::Payload {
            conn,
            text: r#"{"type":"metrics","cluster_id":"c1","data":{"avg_cpu":"high"}}"#.to_string(),
        });

        assert_eq!(machine.state().error.as_deref(), Some(PARSE_ERROR));
        assert!(machine.state().latest_metrics.is_none());
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let conn = subscribed(&mut machine, "c1");

        machine.handle(Event::Payload {
            conn,
            text: r#"{"type":"heartbeat","cluster_id":"c1"}{"no_type":true}"#.to_string(),
        });

        assert!(machine.state().error.is_none());
        assert!(machine.state().is_subscribed);
    }

    #[test]
    fn test_transport_error_does_not_change_phase() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let conn = subscribed(&mut machine, "c1");

        let effects = machine.handle(Event::TransportError {
            conn,
            message: "broken pipe".to_string(),
        });

        assert_eq!(
            effects,
            vec![Effect::Notify(Lifecycle::Error("broken pipe".to_string()))]
        );
        assert_eq!(machine.phase(), Phase::Subscribed);
        assert_eq!(machine.state().error.as_deref(), Some(TRANSPORT_ERROR));
    }

    #[test]
    fn test_unplanned_close_schedules_reconnect() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let conn = subscribed(&mut machine, "c1");

        let effects = close(&mut machine, conn);

        assert!(effects.contains(&Effect::ScheduleReconnect(Duration::from_millis(3000))));
        assert!(effects.iter().any(|e| matches!(e, Effect::Notify(Lifecycle::Closed { .. }))));
        assert_eq!(machine.phase(), Phase::Closed);
        assert!(!machine.state().is_connected);
        assert!(!machine.state().is_subscribed);
        assert_eq!(machine.state().reconnect_count, 1);
        assert!(machine.reconnect_pending());

        let effects = machine.handle(Event::ReconnectDue);
        assert_eq!(connect_conn(&effects), ConnId(2));
        assert_eq!(machine.phase(), Phase::Connecting);
    }

    #[test]
    fn test_snapshots_survive_reconnect() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let conn = subscribed(&mut machine, "c1");
        machine.handle(Event::Payload {
            conn,
            text: metrics_json("c1", 55.0),
        });

        close(&mut machine, conn);
        assert_eq!(
            machine.state().latest_metrics.as_ref().map(|m| m.avg_cpu),
            Some(55.0)
        );
    }

    #[test]
    fn test_reconnect_budget_exhausts() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let mut conn = opened(&mut machine);

        // the first close plus one per failed attempt
        for attempt in 1..=5 {
            let effects = close(&mut machine, conn);
            assert!(
                effects.iter().any(|e| matches!(e, Effect::ScheduleReconnect(_))),
                "attempt {} should be scheduled",
                attempt
            );
            assert_eq!(machine.state().reconnect_count, attempt);
            conn = connect_conn(&machine.handle(Event::ReconnectDue));
        }

        let effects = close(&mut machine, conn);
        assert!(!effects.iter().any(|e| matches!(e, Effect::ScheduleReconnect(_))));
        assert_eq!(
            machine.state().error.as_deref(),
            Some("Failed to reconnect after 5 attempts")
        );
        assert!(!machine.reconnect_pending());
        assert!(machine.handle(Event::ReconnectDue).is_empty());
        assert_eq!(machine.phase(), Phase::Closed);
    }

    #[test]
    fn test_successful_open_resets_budget() {
        let config = StreamConfig {
            max_reconnect_attempts: 2,
            ..config()
        };
        let mut machine = ConnectionMachine::new(config, "c1");
        let mut conn = opened(&mut machine);

        for _ in 0..4 {
            // one failure, then a healthy reconnect
            close(&mut machine, conn);
            assert_eq!(machine.state().reconnect_count, 1);
            conn = connect_conn(&machine.handle(Event::ReconnectDue));
            machine.handle(Event::Opened { conn });
            assert_eq!(machine.state().reconnect_count, 0);
        }

        let effects = close(&mut machine, conn);
        assert!(effects.iter().any(|e| matches!(e, Effect::ScheduleReconnect(_))));
    }

    #[test]
    fn test_reconnect_disabled_just_closes() {
        let config = StreamConfig {
            reconnect: false,
            ..config()
        };
        let mut machine = ConnectionMachine::new(config, "c1");
        let conn = opened(&mut machine);

        let effects = close(&mut machine, conn);
        assert_eq!(effects.len(), 1);
        assert!(machine.state().error.is_none());
        assert_eq!(machine.phase(), Phase::Closed);
    }

    #[test]
    fn test_failed_handshake_counts_as_unplanned_close() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let conn = connect_conn(&machine.handle(Event::Enable));

        machine.handle(Event::TransportError {
            conn,
            message: "connection refused".to_string(),
        });
        let effects = close(&mut machine, conn);

        assert!(effects.iter().any(|e| matches!(e, Effect::ScheduleReconnect(_))));
        assert_eq!(machine.state().error.as_deref(), Some(TRANSPORT_ERROR));
    }

    #[test]
    fn test_teardown_unsubscribes_and_closes_normally() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let conn = subscribed(&mut machine, "c1");
        machine.handle(Event::Payload {
            conn,
            text: metrics_json("c1", 12.0),
        });

        let effects = machine.handle(Event::Teardown);
        assert_eq!(
            effects,
            vec![
                Effect::Send(unsubscribe_text("c1")),
                Effect::Close {
                    code: NORMAL_CLOSURE,
                    reason: TEARDOWN_REASON,
                },
            ]
        );
        assert_eq!(machine.phase(), Phase::Closing);
        assert_eq!(machine.state(), &StreamingState::default());

        // the close that follows must not reconnect
        let effects = close(&mut machine, conn);
        assert!(!effects.iter().any(|e| matches!(e, Effect::ScheduleReconnect(_))));
        assert_eq!(machine.phase(), Phase::Closed);
        assert!(!machine.reconnect_pending());
    }

    #[test]
    fn test_failed_unsubscribe_does_not_dirty_reset_state() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let conn = subscribed(&mut machine, "c1");

        machine.handle(Event::Teardown);
        // driver reports the unsubscribe write failing on the closing socket
        let effects = machine.handle(Event::TransportError {
            conn,
            message: "broken pipe".to_string(),
        });

        assert!(effects.is_empty());
        assert_eq!(machine.state(), &StreamingState::default());

        close(&mut machine, conn);
        assert_eq!(machine.phase(), Phase::Closed);
        assert_eq!(machine.state(), &StreamingState::default());
    }

    #[test]
    fn test_teardown_while_connecting_abandons_handshake() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let conn = connect_conn(&machine.handle(Event::Enable));

        let effects = machine.handle(Event::Teardown);
        assert_eq!(
            effects,
            vec![Effect::Close {
                code: NORMAL_CLOSURE,
                reason: TEARDOWN_REASON,
            }]
        );

        // a late open for the abandoned socket is ignored
        assert!(machine.handle(Event::Opened { conn }).is_empty());
        assert!(!machine.state().is_connected);
    }

    #[test]
    fn test_teardown_cancels_pending_reconnect() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let conn = subscribed(&mut machine, "c1");
        close(&mut machine, conn);
        assert!(machine.reconnect_pending());

        let effects = machine.handle(Event::Teardown);
        assert_eq!(effects, vec![Effect::CancelReconnect]);
        assert_eq!(machine.phase(), Phase::Closed);

        assert!(machine.handle(Event::ReconnectDue).is_empty());
        assert_eq!(machine.phase(), Phase::Closed);
    }

    #[test]
    fn test_reenable_after_exhaustion_gets_fresh_budget() {
        let config = StreamConfig {
            max_reconnect_attempts: 1,
            ..config()
        };
        let mut machine = ConnectionMachine::new(config, "c1");
        let conn = opened(&mut machine);
        close(&mut machine, conn);
        let conn = connect_conn(&machine.handle(Event::ReconnectDue));
        close(&mut machine, conn);
        assert!(machine.state().error.is_some());

        let conn = connect_conn(&machine.handle(Event::Enable));
        let effects = close(&mut machine, conn);
        assert!(effects.iter().any(|e| matches!(e, Effect::ScheduleReconnect(_))));
    }

    #[test]
    fn test_retarget_is_teardown_and_fresh_handshake() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let old = subscribed(&mut machine, "c1");
        machine.handle(Event::Payload {
            conn: old,
            text: metrics_json("c1", 10.0),
        });

        let effects = machine.handle(Event::Retarget("c2".to_string()));
        assert_eq!(effects[0], Effect::Send(unsubscribe_text("c1")));
        assert!(matches!(effects[1], Effect::Close { code: NORMAL_CLOSURE, .. }));
        let new = connect_conn(&effects);
        assert_ne!(new, old);
        assert_eq!(machine.cluster_id(), "c2");
        assert_eq!(machine.phase(), Phase::Connecting);
        assert_eq!(machine.state(), &StreamingState::default());

        // the old socket's close is stale
        assert!(close(&mut machine, old).is_empty());
        assert_eq!(machine.phase(), Phase::Connecting);

        let effects = machine.handle(Event::Opened { conn: new });
        assert_eq!(effects[0], Effect::Send(subscribe_text("c2")));

        // old cluster's data is now foreign
        machine.handle(Event::Payload {
            conn: new,
            text: metrics_json("c1", 80.0),
        });
        assert!(machine.state().latest_metrics.is_none());
    }

    #[test]
    fn test_retarget_same_cluster_is_noop() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        subscribed(&mut machine, "c1");
        assert!(machine.handle(Event::Retarget("c1".to_string())).is_empty());
        assert_eq!(machine.phase(), Phase::Subscribed);
    }

    #[test]
    fn test_retarget_while_disabled_does_not_connect() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let effects = machine.handle(Event::Retarget("c2".to_string()));
        assert!(effects.is_empty());
        assert_eq!(machine.cluster_id(), "c2");
        assert_eq!(machine.phase(), Phase::Idle);
    }

    #[test]
    fn test_send_only_when_open() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        assert!(machine.handle(Event::Send(json!({"type": "ping"}))).is_empty());

        let conn = connect_conn(&machine.handle(Event::Enable));
        assert!(machine.handle(Event::Send(json!({"type": "ping"}))).is_empty());

        machine.handle(Event::Opened { conn });
        assert_eq!(
            machine.handle(Event::Send(json!({"type": "ping"}))),
            vec![Effect::Send(r#"{"type":"ping"}"#.to_string())]
        );
    }

    #[test]
    fn test_payload_from_stale_connection_is_ignored() {
        let mut machine = ConnectionMachine::new(config(), "c1");
        let conn = subscribed(&mut machine, "c1");
        close(&mut machine, conn);
        let fresh = connect_conn(&machine.handle(Event::ReconnectDue));
        machine.handle(Event::Opened { conn: fresh });

        machine.handle(Event::Payload {
            conn,
            text: metrics_json("c1", 66.0),
        });
        assert!(machine.state().latest_metrics.is_none());
    }
}
