//! # gridlink-subscriptions
//!
//! Realtime subscription session over WebSocket, speaking the legacy
//! `subscriptions-transport-ws` vocabulary defined in `gridlink-core`.
//!
//! The session performs the `connection_init`/`connection_ack` handshake
//! before any subscription is allowed on the wire, queues requests
//! submitted earlier, flushes them in submission order on acknowledgement,
//! and answers server keep-alives with transport Pings. Decoded
//! `data`/`error`/`complete` envelopes reach the caller on an event stream.
//!
//! There is no automatic reconnection, backoff, or handshake timeout: a
//! failed session stays failed until the caller calls
//! [`SubscriptionSession::connect`] again.

#![deny(unsafe_code)]

pub mod session;
pub mod state;
pub mod transport;

pub use session::{SessionEvent, SubscriptionSession};
pub use state::SessionState;
pub use transport::{Connector, Frame, Transport, TransportError, WsConnector};
