//! Wire envelopes for the legacy `subscriptions-transport-ws` vocabulary.
//!
//! Every message on the socket is `{ "id": <string, optional>, "type":
//! <string>, "payload": <object> }`. The `type` strings are fixed — the
//! server depends on the exact values.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::SubscriptionRequest;

/// Wire `type` tags, both directions.
///
/// Decoding never fails on the tag: anything outside the vocabulary maps
/// to [`OperationType::Unrecognized`] and is skipped by the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    /// Client handshake opener; payload carries the connection parameters.
    #[serde(rename = "connection_init")]
    ConnectionInit,
    /// Server handshake acknowledgement; gates all application traffic.
    #[serde(rename = "connection_ack")]
    ConnectionAck,
    /// Server handshake rejection.
    #[serde(rename = "connection_error")]
    ConnectionError,
    /// Server keep-alive; answered with a transport Ping, never delivered.
    #[serde(rename = "ka")]
    KeepAlive,
    /// Client-initiated teardown.
    #[serde(rename = "connection_terminate")]
    ConnectionTerminate,
    /// Client subscription start; payload is `{ query, variables }`.
    #[serde(rename = "start")]
    Start,
    /// Client subscription stop, keyed by operation id.
    #[serde(rename = "stop")]
    Stop,
    /// Server application result, keyed by operation id.
    #[serde(rename = "data")]
    Data,
    /// Server operation error, keyed by operation id.
    #[serde(rename = "error")]
    Error,
    /// Server operation completion, keyed by operation id.
    #[serde(rename = "complete")]
    Complete,
    /// Any tag outside the vocabulary.
    #[serde(other)]
    Unrecognized,
}

/// A decoded server-to-client message.
///
/// Transient: consumed once by the dispatcher and discarded, except `data`
/// payloads which are forwarded to the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    /// Operation id this envelope refers to, when the type carries one.
    #[serde(default)]
    pub id: Option<String>,
    /// The wire type tag.
    #[serde(rename = "type")]
    pub op: OperationType,
    /// Opaque payload; absent on `ka` and `connection_ack`.
    #[serde(default)]
    pub payload: Option<Value>,
}

impl InboundEnvelope {
    /// Decode an envelope from a received text frame.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Client-to-server envelope shape shared by all outbound encoders.
#[derive(Debug, Serialize)]
struct OutboundEnvelope<'a, P: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(rename = "type")]
    op: OperationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<P>,
}

/// Encode the handshake opener carrying the connection parameters.
pub fn encode_init(payload: &HashMap<String, String>) -> Result<String, serde_json::Error> {
    serde_json::to_string(&OutboundEnvelope {
        id: None,
        op: OperationType::ConnectionInit,
        payload: Some(payload),
    })
}

/// Encode a subscription `start` envelope.
pub fn encode_start(request: &SubscriptionRequest) -> Result<String, serde_json::Error> {
    serde_json::to_string(&OutboundEnvelope {
        id: Some(&request.id),
        op: OperationType::Start,
        payload: Some(&request.payload),
    })
}

/// Encode a `stop` envelope for the given operation id.
pub fn encode_stop(id: &str) -> Result<String, serde_json::Error> {
    serde_json::to_string(&OutboundEnvelope::<()> {
        id: Some(id),
        op: OperationType::Stop,
        payload: None,
    })
}

/// Encode the client teardown envelope.
pub fn encode_terminate() -> Result<String, serde_json::Error> {
    serde_json::to_string(&OutboundEnvelope::<()> {
        id: None,
        op: OperationType::ConnectionTerminate,
        payload: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::OperationPayload;

    #[test]
    fn decode_ack() {
        let env = InboundEnvelope::decode(r#"{"type":"connection_ack"}"#).unwrap();
        assert_eq!(env.op, OperationType::ConnectionAck);
        assert!(env.id.is_none());
        assert!(env.payload.is_none());
    }

    #[test]
    fn decode_keep_alive() {
        let env = InboundEnvelope::decode(r#"{"type":"ka"}"#).unwrap();
        assert_eq!(env.op, OperationType::KeepAlive);
    }

    #[test]
    fn decode_data_keeps_id_and_payload() {
        let env =
            InboundEnvelope::decode(r#"{"id":"x","type":"data","payload":{"v":1}}"#).unwrap();
        assert_eq!(env.op, OperationType::Data);
        assert_eq!(env.id.as_deref(), Some("x"));
        assert_eq!(env.payload, Some(serde_json::json!({"v": 1})));
    }

    #[test]
    fn decode_unknown_tag_is_unrecognized() {
        let env = InboundEnvelope::decode(r#"{"type":"surprise_me"}"#).unwrap();
        assert_eq!(env.op, OperationType::Unrecognized);
    }

    #[test]
    fn decode_missing_type_is_an_error() {
        assert!(InboundEnvelope::decode(r#"{"id":"x"}"#).is_err());
    }

    #[test]
    fn decode_malformed_json_is_an_error() {
        assert!(InboundEnvelope::decode("not json").is_err());
    }

    #[test]
    fn encode_init_shape() {
        let mut params = HashMap::new();
        let _ = params.insert("x-client-id".to_string(), "abc123".to_string());
        let json: Value = serde_json::from_str(&encode_init(&params).unwrap()).unwrap();
        assert_eq!(json["type"], "connection_init");
        assert_eq!(json["payload"]["x-client-id"], "abc123");
        assert!(json.get("id").is_none());
    }

    #[test]
    fn encode_start_shape() {
        let req = SubscriptionRequest::new(
            "42",
            OperationPayload::query("subscription { chargeSession { soc } }"),
        );
        let json: Value = serde_json::from_str(&encode_start(&req).unwrap()).unwrap();
        assert_eq!(json["id"], "42");
        assert_eq!(json["type"], "start");
        assert_eq!(
            json["payload"]["query"],
            "subscription { chargeSession { soc } }"
        );
        assert_eq!(json["payload"]["variables"], serde_json::json!({}));
    }

    #[test]
    fn encode_stop_shape() {
        let json: Value = serde_json::from_str(&encode_stop("42").unwrap()).unwrap();
        assert_eq!(json["id"], "42");
        assert_eq!(json["type"], "stop");
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn encode_terminate_shape() {
        let json: Value = serde_json::from_str(&encode_terminate().unwrap()).unwrap();
        assert_eq!(json["type"], "connection_terminate");
        assert!(json.get("id").is_none());
    }

    #[test]
    fn tags_round_trip_as_wire_strings() {
        for (tag, op) in [
            ("connection_init", OperationType::ConnectionInit),
            ("connection_ack", OperationType::ConnectionAck),
            ("connection_error", OperationType::ConnectionError),
            ("ka", OperationType::KeepAlive),
            ("connection_terminate", OperationType::ConnectionTerminate),
            ("start", OperationType::Start),
            ("stop", OperationType::Stop),
            ("data", OperationType::Data),
            ("error", OperationType::Error),
            ("complete", OperationType::Complete),
        ] {
            let decoded: OperationType =
                serde_json::from_value(Value::String(tag.to_string())).unwrap();
            assert_eq!(decoded, op, "tag {tag}");
        }
    }
}
