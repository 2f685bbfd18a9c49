//! # gridlink-core
//!
//! Wire vocabulary for the gridlink realtime subscription client.
//!
//! This crate provides the shared types the session crate builds on:
//!
//! - **`OperationType`**: closed tagged enum of the wire `type` strings,
//!   with an explicit `Unrecognized` catch-all so unknown tags decode
//!   instead of failing
//! - **`InboundEnvelope`**: the decoded server-to-client message unit
//! - **`OperationPayload` / `SubscriptionRequest`**: caller-issued
//!   subscription work, passed through unmodified
//! - **Outbound encoders**: `connection_init`, `start`, `stop`, and
//!   `connection_terminate` envelopes

#![deny(unsafe_code)]

pub mod envelope;
pub mod request;

pub use envelope::{
    InboundEnvelope, OperationType, encode_init, encode_start, encode_stop, encode_terminate,
};
pub use request::{OperationPayload, SubscriptionRequest};
