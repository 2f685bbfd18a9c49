//! Subscription session lifecycle — handshake, queueing, and dispatch.
//!
//! One actor task per session owns the transport, the handshake state, and
//! the pending queue. `connect` / `submit` / `disconnect` never block and
//! never fail synchronously: they hand a command to the actor over a
//! channel, which also preserves submission order under concurrent callers.
//! All failures surface on the caller's [`SessionEvent`] stream.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use gridlink_core::{InboundEnvelope, SubscriptionRequest, encode_init, encode_start};
use metrics::counter;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::state::{SessionState, Step, transition};
use crate::transport::{Connector, Frame, Transport, TransportError};

/// A decoded server message or session failure, delivered to the caller.
///
/// Per-operation routing is the caller's job: the session keeps no record
/// of submitted requests, it only carries the ids back.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// An application result for the given operation id.
    Data {
        /// Operation id the result belongs to.
        id: Option<String>,
        /// The application payload, passed through unmodified.
        payload: Value,
    },
    /// A protocol-level operation error. The session stops sending until
    /// reconnected; the transport stays open.
    OperationError {
        /// Operation id the error belongs to, when the server keyed it.
        id: Option<String>,
        /// Error detail from the server.
        payload: Option<Value>,
    },
    /// The server completed the given operation. The session stops sending
    /// until reconnected.
    Completed {
        /// Operation id that completed.
        id: Option<String>,
    },
    /// The server rejected the handshake. Queued requests stay buffered
    /// for the next `connect`.
    HandshakeFailed {
        /// Rejection detail from the server.
        payload: Option<Value>,
    },
    /// The transport failed to open, closed unexpectedly, or broke.
    TransportFailed(
        /// The underlying failure.
        TransportError,
    ),
    /// A single outbound envelope could not be encoded or written. The
    /// rest of a flush is still attempted.
    SendFailed {
        /// Operation id of the failed request, if any.
        id: Option<String>,
        /// The underlying failure.
        error: TransportError,
    },
}

enum Command {
    Connect,
    Disconnect,
    Submit(SubscriptionRequest),
}

/// Handle to a realtime subscription session.
///
/// Construct with [`SubscriptionSession::new`] inside a tokio runtime; the
/// returned receiver is the caller-facing event stream. Dropping the handle
/// closes the transport and ends the session task.
pub struct SubscriptionSession {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state: Arc<RwLock<SessionState>>,
    _actor: JoinHandle<()>,
}

impl SubscriptionSession {
    /// Spawn a session over the given connector.
    ///
    /// `connection_payload` is sent once in the `connection_init` envelope
    /// and is immutable for the session's lifetime.
    pub fn new<C: Connector>(
        connector: C,
        connection_payload: HashMap<String, String>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(SessionState::Disconnected));
        let actor = Actor {
            connector,
            connection_payload,
            state: Arc::clone(&state),
            events: event_tx,
            queue: VecDeque::new(),
            transport: None,
        };
        let handle = tokio::spawn(actor.run(cmd_rx));
        (
            Self {
                cmd_tx,
                state,
                _actor: handle,
            },
            event_rx,
        )
    }

    /// Spawn a session against a WebSocket endpoint.
    pub fn endpoint(
        url: impl Into<String>,
        connection_payload: HashMap<String, String>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        Self::new(crate::transport::WsConnector::new(url), connection_payload)
    }

    /// Open the transport and start the handshake.
    ///
    /// No-op unless the session is `Disconnected` or `Errored`. Failures
    /// land on the event stream, never here.
    pub fn connect(&self) {
        let _ = self.cmd_tx.send(Command::Connect);
    }

    /// Close the transport, discard the queue, return to `Disconnected`.
    ///
    /// Idempotent from any state, including a never-connected session.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect);
    }

    /// Submit a subscription request.
    ///
    /// Sent immediately once the handshake is acknowledged, queued
    /// otherwise. The queue is unbounded and flushed in submission order.
    pub fn submit(&self, request: SubscriptionRequest) {
        let _ = self.cmd_tx.send(Command::Submit(request));
    }

    /// Snapshot of the current session state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }
}

struct Actor<C: Connector> {
    connector: C,
    connection_payload: HashMap<String, String>,
    state: Arc<RwLock<SessionState>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    queue: VecDeque<SubscriptionRequest>,
    transport: Option<C::Transport>,
}

enum Wake {
    Command(Option<Command>),
    Inbound(Option<Result<String, TransportError>>),
}

impl<C: Connector> Actor<C> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let wake = tokio::select! {
                cmd = commands.recv() => Wake::Command(cmd),
                inbound = next_inbound(&mut self.transport) => Wake::Inbound(inbound),
            };
            match wake {
                // Handle dropped: close and end the task.
                Wake::Command(None) => {
                    if let Some(mut transport) = self.transport.take() {
                        transport.close().await;
                    }
                    break;
                }
                Wake::Command(Some(Command::Connect)) => self.open().await,
                Wake::Command(Some(Command::Disconnect)) => self.teardown().await,
                Wake::Command(Some(Command::Submit(request))) => self.submit(request).await,
                Wake::Inbound(inbound) => self.handle_inbound(inbound).await,
            }
        }
    }

    async fn open(&mut self) {
        let current = *self.state.read();
        if !matches!(
            current,
            SessionState::Disconnected | SessionState::Errored
        ) {
            warn!(state = ?current, "connect ignored");
            return;
        }
        // An errored session may still hold the old transport.
        if let Some(mut stale) = self.transport.take() {
            stale.close().await;
        }

        self.set_state(SessionState::Connecting);
        let mut transport = match self.connector.connect().await {
            Ok(transport) => transport,
            Err(error) => {
                self.fail(error);
                return;
            }
        };
        counter!("ws_connects_total").increment(1);

        let init = match encode_init(&self.connection_payload) {
            Ok(text) => text,
            Err(e) => {
                self.fail(TransportError::Send(format!("encode connection_init: {e}")));
                return;
            }
        };
        if let Err(error) = transport.send(Frame::Text(init)).await {
            self.fail(error);
            return;
        }
        info!("connection_init sent, awaiting ack");
        self.transport = Some(transport);
    }

    async fn teardown(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
            info!("disconnected");
        }
        self.queue.clear();
        self.set_state(SessionState::Disconnected);
    }

    async fn submit(&mut self, request: SubscriptionRequest) {
        counter!("subscription_requests_total").increment(1);
        if *self.state.read() == SessionState::Acknowledged {
            self.send_start(&request).await;
        } else {
            debug!(id = %request.id, queued = self.queue.len() + 1, "not acknowledged, queueing");
            self.queue.push_back(request);
        }
    }

    async fn handle_inbound(&mut self, inbound: Option<Result<String, TransportError>>) {
        match inbound {
            None => self.fail(TransportError::Closed),
            Some(Err(error)) => self.fail(error),
            Some(Ok(text)) => self.dispatch(&text).await,
        }
    }

    async fn dispatch(&mut self, text: &str) {
        counter!("ws_messages_received_total").increment(1);
        let envelope = match InboundEnvelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "undecodable server message, skipping");
                return;
            }
        };

        let current = *self.state.read();
        let (next, step) = transition(current, &envelope);
        if next != current {
            self.set_state(next);
        }
        match step {
            Step::FlushQueue => self.flush().await,
            Step::ReplyKeepAlive => self.reply_keep_alive().await,
            Step::Deliver(event) => {
                let _ = self.events.send(event);
            }
            Step::Ignore => debug!(op = ?envelope.op, state = ?current, "envelope ignored"),
        }
    }

    async fn flush(&mut self) {
        info!(queued = self.queue.len(), "acknowledged, flushing queue");
        // Independent per-item delivery: one failure must not block the rest.
        while let Some(request) = self.queue.pop_front() {
            self.send_start(&request).await;
        }
    }

    async fn send_start(&mut self, request: &SubscriptionRequest) {
        let text = match encode_start(request) {
            Ok(text) => text,
            Err(e) => {
                let _ = self.events.send(SessionEvent::SendFailed {
                    id: Some(request.id.clone()),
                    error: TransportError::Send(format!("encode start: {e}")),
                });
                return;
            }
        };
        if let Some(transport) = self.transport.as_mut() {
            match transport.send(Frame::Text(text)).await {
                Ok(()) => {
                    counter!("subscription_requests_sent_total").increment(1);
                    debug!(id = %request.id, "start sent");
                }
                Err(error) => {
                    warn!(id = %request.id, %error, "start send failed");
                    let _ = self.events.send(SessionEvent::SendFailed {
                        id: Some(request.id.clone()),
                        error,
                    });
                }
            }
        }
    }

    async fn reply_keep_alive(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            if let Err(error) = transport.send(Frame::Ping).await {
                warn!(%error, "keep-alive probe failed");
            }
        }
    }

    fn fail(&mut self, error: TransportError) {
        warn!(%error, "transport failure");
        self.transport = None;
        self.set_state(SessionState::Errored);
        let _ = self.events.send(SessionEvent::TransportFailed(error));
    }

    fn set_state(&self, next: SessionState) {
        *self.state.write() = next;
    }
}

async fn next_inbound<T: Transport>(
    transport: &mut Option<T>,
) -> Option<Result<String, TransportError>> {
    match transport.as_mut() {
        Some(transport) => transport.receive().await,
        None => std::future::pending().await,
    }
}
