//! Caller-issued subscription work.

use std::collections::HashMap;

use serde::Serialize;

/// The opaque GraphQL operation content of a subscription, passed through
/// to the server unmodified.
#[derive(Debug, Clone, Serialize)]
pub struct OperationPayload {
    /// Optional routing key some backends expect alongside the query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// The GraphQL subscription document.
    pub query: String,
    /// Operation variables.
    pub variables: HashMap<String, String>,
}

impl OperationPayload {
    /// Build a payload from a query with no variables.
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            key: None,
            query: query.into(),
            variables: HashMap::new(),
        }
    }
}

/// A single subscription request.
///
/// The `id` is caller-supplied and must be unique per server connection;
/// the session does not validate it and keeps no record of the request
/// after transmission — `data`/`error`/`complete` envelopes come back
/// keyed by this id and routing them is the caller's job.
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    /// Caller-unique operation id.
    pub id: String,
    /// Query and variables, forwarded as-is.
    pub payload: OperationPayload,
}

impl SubscriptionRequest {
    /// Create a request with the given id and payload.
    pub fn new(id: impl Into<String>, payload: OperationPayload) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}
