//! Stream client
//!
//! Owns the socket and the reconnect timer on a tokio task and drives the
//! [`ConnectionMachine`]. Consumers talk to the task through a cloneable
//! [`StreamHandle`] and read state from a watch channel.

use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Sleep};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::machine::{ConnId, ConnectionMachine, Effect, Event, Lifecycle};
use crate::state::{Phase, StreamingState};
use crate::traits::StreamObserver;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Handshake = BoxFuture<'static, Result<WsStream, tungstenite::Error>>;

const COMMAND_BUFFER: usize = 64;

#[derive(Debug)]
enum Command {
    Enable,
    Disable,
    Retarget(String),
    Send(Value),
    Shutdown,
}

/// Cloneable handle to a running stream client
#[derive(Debug, Clone)]
pub struct StreamHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<StreamingState>,
    phase: watch::Receiver<Phase>,
}

impl StreamHandle {
    /// Snapshot of the current streaming state
    pub fn state(&self) -> StreamingState {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Receiver notified on every state change
    pub fn watch_state(&self) -> watch::Receiver<StreamingState> {
        self.state.clone()
    }

    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.phase.clone()
    }

    /// Send a JSON payload on the open socket.
    ///
    /// Fire and forget: the payload is dropped with a warning when the socket
    /// is not open or the client has stopped.
    pub fn send(&self, payload: Value) {
        if let Err(e) = self.commands.try_send(Command::Send(payload)) {
            warn!(error = %e, "Failed to queue outbound message");
        }
    }

    /// Start streaming (no-op if already connected)
    pub async fn enable(&self) -> Result<(), StreamError> {
        self.command(Command::Enable).await
    }

    /// Unsubscribe and close without reconnecting
    pub async fn disable(&self) -> Result<(), StreamError> {
        self.command(Command::Disable).await
    }

    /// Switch the subscription to another cluster
    pub async fn set_cluster(&self, cluster_id: impl Into<String>) -> Result<(), StreamError> {
        self.command(Command::Retarget(cluster_id.into())).await
    }

    async fn command(&self, command: Command) -> Result<(), StreamError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| StreamError::Stopped)
    }
}

/// A running stream client
pub struct StreamClient {
    handle: StreamHandle,
    task: JoinHandle<()>,
}

impl StreamClient {
    /// Spawn the driver task. Connects immediately when `config.enabled`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        config: StreamConfig,
        cluster_id: impl Into<String>,
        observer: Arc<dyn StreamObserver>,
    ) -> Result<Self, StreamError> {
        let cluster_id = cluster_id.into();
        config.validate()?;
        if cluster_id.trim().is_empty() {
            return Err(StreamError::MissingCluster);
        }

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state_rx) = watch::channel(StreamingState::default());
        let (phase_tx, phase_rx) = watch::channel(Phase::Idle);

        let enabled = config.enabled;
        let driver = Driver {
            machine: ConnectionMachine::new(config, cluster_id),
            observer,
            commands: command_rx,
            socket: None,
            handshake: None,
            reconnect_timer: None,
            state_tx,
            phase_tx,
        };
        let task = tokio::spawn(driver.run(enabled));

        Ok(Self {
            handle: StreamHandle {
                commands: command_tx,
                state: state_rx,
                phase: phase_rx,
            },
            task,
        })
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }

    /// Unsubscribe, close the socket with a normal closure and wait for the
    /// driver task to exit.
    pub async fn shutdown(self) -> Result<(), StreamError> {
        // the task may already be gone if every handle was dropped
        let _ = self.handle.commands.send(Command::Shutdown).await;
        self.task.await?;
        Ok(())
    }
}

struct Driver {
    machine: ConnectionMachine,
    observer: Arc<dyn StreamObserver>,
    commands: mpsc::Receiver<Command>,
    socket: Option<(ConnId, WsStream)>,
    handshake: Option<(ConnId, Handshake)>,
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    state_tx: watch::Sender<StreamingState>,
    phase_tx: watch::Sender<Phase>,
}

impl Driver {
    async fn run(mut self, enabled: bool) {
        info!(cluster_id = %self.machine.cluster_id(), "Stream client started");
        if enabled {
            self.dispatch(Event::Enable).await;
        }

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let event = match command {
                        Some(Command::Enable) => Event::Enable,
                        Some(Command::Disable) => Event::Teardown,
                        Some(Command::Retarget(cluster_id)) => Event::Retarget(cluster_id),
                        Some(Command::Send(payload)) => Event::Send(payload),
                        Some(Command::Shutdown) | None => {
                            self.dispatch(Event::Teardown).await;
                            break;
                        }
                    };
                    self.dispatch(event).await;
                }

                (conn, result) = wait_handshake(&mut self.handshake), if self.handshake.is_some() => {
                    self.handshake = None;
                    self.on_handshake(conn, result).await;
                }

                (conn, frame) = next_frame(&mut self.socket), if self.socket.is_some() => {
                    self.on_frame(conn, frame).await;
                }

                _ = wait_timer(&mut self.reconnect_timer), if self.reconnect_timer.is_some() => {
                    self.reconnect_timer = None;
                    self.dispatch(Event::ReconnectDue).await;
                }
            }
        }

        info!(cluster_id = %self.machine.cluster_id(), "Stream client stopped");
    }

    async fn on_handshake(&mut self, conn: ConnId, result: Result<WsStream, tungstenite::Error>) {
        match result {
            Ok(ws) => {
                debug!(conn = conn.0, "Handshake complete");
                self.socket = Some((conn, ws));
                self.dispatch(Event::Opened { conn }).await;
            }
            Err(e) => {
                warn!(error = %e, conn = conn.0, "Handshake failed");
                self.dispatch(Event::TransportError {
                    conn,
                    message: e.to_string(),
                })
                .await;
                self.dispatch(Event::Closed {
                    conn,
                    code: None,
                    reason: String::new(),
                })
                .await;
            }
        }
    }

    async fn on_frame(&mut self, conn: ConnId, frame: Option<Result<Message, tungstenite::Error>>) {
        match frame {
            Some(Ok(Message::Text(text))) => {
                trace!(len = text.len(), "Received text frame");
                self.dispatch(Event::Payload { conn, text }).await;
            }
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => self.dispatch(Event::Payload { conn, text }).await,
                Err(e) => warn!(error = %e, "Dropping non-UTF-8 binary frame"),
            },
            Some(Ok(Message::Ping(data))) => {
                trace!("Received ping, sending pong");
                if let Some((_, ws)) = self.socket.as_mut() {
                    let result = ws.send(Message::Pong(data)).await;
                    if let Err(e) = result {
                        warn!(error = %e, "Failed to send pong");
                    }
                }
            }
            Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
            Some(Ok(Message::Close(frame))) => {
                self.socket = None;
                let (code, reason) = match frame {
                    Some(frame) => (Some(u16::from(frame.code)), frame.reason.into_owned()),
                    None => (None, String::new()),
                };
                self.dispatch(Event::Closed { conn, code, reason }).await;
            }
            Some(Err(e)) => {
                self.socket = None;
                self.dispatch(Event::TransportError {
                    conn,
                    message: e.to_string(),
                })
                .await;
                self.dispatch(Event::Closed {
                    conn,
                    code: None,
                    reason: String::new(),
                })
                .await;
            }
            None => {
                debug!(conn = conn.0, "Stream ended");
                self.socket = None;
                self.dispatch(Event::Closed {
                    conn,
                    code: None,
                    reason: String::new(),
                })
                .await;
            }
        }
    }

    /// Feed an event to the machine and execute the resulting effects,
    /// including any events those effects produce.
    async fn dispatch(&mut self, event: Event) {
        let mut events = VecDeque::from([event]);

        while let Some(event) = events.pop_front() {
            for effect in self.machine.handle(event) {
                self.execute(effect, &mut events).await;
            }
        }

        self.publish();
    }

    async fn execute(&mut self, effect: Effect, events: &mut VecDeque<Event>) {
        match effect {
            Effect::Connect { conn, url } => {
                self.socket = None;
                self.handshake = Some((
                    conn,
                    async move { connect_async(url.as_str()).await.map(|(ws, _)| ws) }.boxed(),
                ));
            }
            Effect::Send(text) => {
                let Some((conn, ws)) = self.socket.as_mut() else {
                    warn!("No open socket, dropping outbound message");
                    return;
                };
                let conn = *conn;
                let result = ws.send(Message::Text(text)).await;
                if let Err(e) = result {
                    warn!(error = %e, "Failed to send message");
                    self.socket = None;
                    events.push_back(Event::TransportError {
                        conn,
                        message: e.to_string(),
                    });
                    events.push_back(Event::Closed {
                        conn,
                        code: None,
                        reason: String::new(),
                    });
                }
            }
            Effect::Close { code, reason } => {
                if let Some((conn, mut ws)) = self.socket.take() {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: Cow::Borrowed(reason),
                    };
                    if let Err(e) = ws.close(Some(frame)).await {
                        debug!(error = %e, "Close handshake failed");
                    }
                    events.push_back(Event::Closed {
                        conn,
                        code: Some(code),
                        reason: reason.to_string(),
                    });
                } else if let Some((conn, _)) = self.handshake.take() {
                    debug!(conn = conn.0, "Abandoning pending handshake");
                    events.push_back(Event::Closed {
                        conn,
                        code: Some(code),
                        reason: reason.to_string(),
                    });
                }
            }
            Effect::ScheduleReconnect(delay) => {
                self.reconnect_timer = Some(Box::pin(sleep(delay)));
            }
            Effect::CancelReconnect => {
                self.reconnect_timer = None;
            }
            Effect::Notify(lifecycle) => match lifecycle {
                Lifecycle::Opened => self.observer.on_open(),
                Lifecycle::Closed { code, reason } => self.observer.on_close(code, &reason),
                Lifecycle::Error(message) => self.observer.on_error(&message),
            },
        }
    }

    fn publish(&self) {
        let state = self.machine.state();
        self.state_tx.send_if_modified(|current| {
            if current == state {
                false
            } else {
                *current = state.clone();
                true
            }
        });

        let phase = self.machine.phase();
        self.phase_tx.send_if_modified(|current| {
            if *current == phase {
                false
            } else {
                *current = phase;
                true
            }
        });
    }
}

async fn wait_handshake(
    handshake: &mut Option<(ConnId, Handshake)>,
) -> (ConnId, Result<WsStream, tungstenite::Error>) {
    match handshake {
        Some((conn, fut)) => {
            let result = fut.await;
            (*conn, result)
        }
        None => future::pending().await,
    }
}

async fn next_frame(
    socket: &mut Option<(ConnId, WsStream)>,
) -> (ConnId, Option<Result<Message, tungstenite::Error>>) {
    match socket {
        Some((conn, ws)) => {
            let frame = ws.next().await;
            (*conn, frame)
        }
        None => future::pending().await,
    }
}

async fn wait_timer(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending().await,
    }
}
