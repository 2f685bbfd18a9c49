//! Session state machine, independent of any socket.
//!
//! [`transition`] is the single authority for how an inbound envelope moves
//! the session between states and what the receive loop must do next. It is
//! pure data-in/data-out so the whole table is unit-testable without a
//! transport.

use gridlink_core::{InboundEnvelope, OperationType};
use serde_json::Value;

use crate::session::SessionEvent;

/// Handshake / liveness state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport open.
    Disconnected,
    /// Transport open, `connection_init` sent, waiting for the ack.
    Connecting,
    /// Handshake complete; subscriptions go straight to the wire.
    Acknowledged,
    /// Handshake rejected, protocol error, completion, or transport
    /// failure. Non-sendable until the caller reconnects; new submissions
    /// queue.
    Errored,
}

/// What the receive loop does after applying a transition.
#[derive(Debug, PartialEq)]
pub(crate) enum Step {
    /// Ack arrived: drain the pending queue onto the wire, in order.
    FlushQueue,
    /// Server keep-alive: answer with a transport Ping, deliver nothing.
    ReplyKeepAlive,
    /// Hand a decoded event to the caller.
    Deliver(SessionEvent),
    /// Envelope is unrecognized or undefined for this state.
    Ignore,
}

/// Apply one inbound envelope to the current state.
pub(crate) fn transition(state: SessionState, envelope: &InboundEnvelope) -> (SessionState, Step) {
    use OperationType::{Complete, ConnectionAck, ConnectionError, Data, Error, KeepAlive};
    use SessionState::{Acknowledged, Connecting, Errored};

    match (state, envelope.op) {
        (Connecting, ConnectionAck) => (Acknowledged, Step::FlushQueue),
        (Connecting, ConnectionError) => (
            Errored,
            Step::Deliver(SessionEvent::HandshakeFailed {
                payload: envelope.payload.clone(),
            }),
        ),
        // The server may start pinging before the ack lands; answer either
        // way, as the original client does.
        (Connecting | Acknowledged, KeepAlive) => (state, Step::ReplyKeepAlive),
        (Acknowledged, Data) => (
            Acknowledged,
            Step::Deliver(SessionEvent::Data {
                id: envelope.id.clone(),
                payload: envelope.payload.clone().unwrap_or(Value::Null),
            }),
        ),
        (Acknowledged, Error) => (
            Errored,
            Step::Deliver(SessionEvent::OperationError {
                id: envelope.id.clone(),
                payload: envelope.payload.clone(),
            }),
        ),
        (Acknowledged, Complete) => (
            Errored,
            Step::Deliver(SessionEvent::Completed {
                id: envelope.id.clone(),
            }),
        ),
        _ => (state, Step::Ignore),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn envelope(op: &str) -> InboundEnvelope {
        InboundEnvelope::decode(&format!(r#"{{"type":"{op}"}}"#)).unwrap()
    }

    fn keyed(op: &str, id: &str) -> InboundEnvelope {
        InboundEnvelope::decode(&format!(r#"{{"id":"{id}","type":"{op}"}}"#)).unwrap()
    }

    #[test]
    fn ack_while_connecting_flushes() {
        let (state, step) = transition(SessionState::Connecting, &envelope("connection_ack"));
        assert_eq!(state, SessionState::Acknowledged);
        assert_eq!(step, Step::FlushQueue);
    }

    #[test]
    fn handshake_error_surfaces_and_errors() {
        let env = InboundEnvelope::decode(
            r#"{"type":"connection_error","payload":{"message":"bad token"}}"#,
        )
        .unwrap();
        let (state, step) = transition(SessionState::Connecting, &env);
        assert_eq!(state, SessionState::Errored);
        assert_matches!(
            step,
            Step::Deliver(SessionEvent::HandshakeFailed { payload: Some(p) })
                if p["message"] == "bad token"
        );
    }

    #[test]
    fn keep_alive_is_answered_in_both_live_states() {
        for state in [SessionState::Connecting, SessionState::Acknowledged] {
            let (next, step) = transition(state, &envelope("ka"));
            assert_eq!(next, state);
            assert_eq!(step, Step::ReplyKeepAlive);
        }
    }

    #[test]
    fn data_forwards_payload_keyed_by_id() {
        let env =
            InboundEnvelope::decode(r#"{"id":"x","type":"data","payload":{"v":1}}"#).unwrap();
        let (state, step) = transition(SessionState::Acknowledged, &env);
        assert_eq!(state, SessionState::Acknowledged);
        assert_matches!(
            step,
            Step::Deliver(SessionEvent::Data { id: Some(id), payload })
                if id == "x" && payload["v"] == 1
        );
    }

    #[test]
    fn operation_error_demotes_but_keys_by_id() {
        let (state, step) = transition(SessionState::Acknowledged, &keyed("error", "x"));
        assert_eq!(state, SessionState::Errored);
        assert_matches!(
            step,
            Step::Deliver(SessionEvent::OperationError { id: Some(id), .. }) if id == "x"
        );
    }

    #[test]
    fn complete_demotes_to_non_sendable() {
        let (state, step) = transition(SessionState::Acknowledged, &keyed("complete", "x"));
        assert_eq!(state, SessionState::Errored);
        assert_matches!(step, Step::Deliver(SessionEvent::Completed { id: Some(id) }) if id == "x");
    }

    #[test]
    fn unrecognized_type_never_changes_state() {
        for state in [
            SessionState::Disconnected,
            SessionState::Connecting,
            SessionState::Acknowledged,
            SessionState::Errored,
        ] {
            let (next, step) = transition(state, &envelope("mystery"));
            assert_eq!(next, state);
            assert_eq!(step, Step::Ignore);
        }
    }

    #[test]
    fn data_before_ack_is_ignored() {
        let (state, step) = transition(SessionState::Connecting, &keyed("data", "x"));
        assert_eq!(state, SessionState::Connecting);
        assert_eq!(step, Step::Ignore);
    }

    #[test]
    fn errored_state_ignores_everything() {
        for op in ["connection_ack", "data", "error", "complete", "ka"] {
            let (state, step) = transition(SessionState::Errored, &envelope(op));
            assert_eq!(state, SessionState::Errored, "op {op}");
            assert_eq!(step, Step::Ignore, "op {op}");
        }
    }
}
