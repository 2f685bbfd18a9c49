//! Message-oriented socket abstraction owned by the session.
//!
//! The session never touches `tokio-tungstenite` directly; it drives a
//! [`Transport`] obtained from a [`Connector`], which keeps the state
//! machine testable against an in-memory double.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::warn;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors from the socket layer.
///
/// Third-party error types are flattened to strings here so callers only
/// ever see this enum.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Opening the socket failed.
    #[error("connect failed: {0}")]
    Connect(String),
    /// A write failed.
    #[error("send failed: {0}")]
    Send(String),
    /// A read failed.
    #[error("receive failed: {0}")]
    Receive(String),
    /// The peer closed the connection while the session expected traffic.
    #[error("connection closed unexpectedly")]
    Closed,
}

/// An outbound transport unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// An encoded envelope.
    Text(String),
    /// A liveness probe, sent in answer to server keep-alives.
    Ping,
}

/// A bidirectional message-oriented socket.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Write one frame.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Wait for the next text message.
    ///
    /// Returns `None` once the peer has closed the connection. Must be
    /// cancel-safe: the session polls this inside a `select!`.
    async fn receive(&mut self) -> Option<Result<String, TransportError>>;

    /// Close with a normal-closure reason. Never fails.
    async fn close(&mut self);
}

/// Opens a [`Transport`]; the seam where tests substitute a double.
#[async_trait]
pub trait Connector: Send + 'static {
    /// The transport this connector produces.
    type Transport: Transport;

    /// Open a fresh transport.
    async fn connect(&mut self) -> Result<Self::Transport, TransportError>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
pub struct WsConnector {
    url: String,
    headers: Vec<(String, String)>,
}

impl WsConnector {
    /// Connector for the given `ws://` or `wss://` endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Add a request header sent with the upgrade (API keys and the like).
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&mut self) -> Result<WsTransport, TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Connect(format!("header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Connect(format!("header value: {e}")))?;
            let _ = request.headers_mut().insert(name, value);
        }

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(WsTransport { inner: stream })
    }
}

/// A live WebSocket connection.
pub struct WsTransport {
    inner: WsStream,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Ping => Message::Ping(vec![].into()),
        };
        self.inner
            .send(message)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn receive(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                // Some backends emit envelopes as binary frames.
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => {
                        warn!(len = bytes.len(), "skipping non-UTF8 binary frame");
                    }
                },
                Ok(Message::Close(_)) => return None,
                // Pings are answered by tungstenite itself.
                Ok(_) => {}
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self
            .inner
            .close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "".into(),
            }))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_error_display() {
        let err = TransportError::Connect("refused".into());
        assert_eq!(err.to_string(), "connect failed: refused");
    }

    #[test]
    fn closed_error_display() {
        assert_eq!(
            TransportError::Closed.to_string(),
            "connection closed unexpectedly"
        );
    }

    #[test]
    fn connector_collects_headers() {
        let connector = WsConnector::new("wss://api.example.com/graphql")
            .with_header("x-client-id", "abc")
            .with_header("x-app-id", "def");
        assert_eq!(connector.headers.len(), 2);
        assert_eq!(connector.headers[0].0, "x-client-id");
    }
}
