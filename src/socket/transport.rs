//! WebSocket Transport Layer
//!
//! Single responsibility: Open an authenticated WebSocket connection and
//! send binary messages on it. No knowledge of reconnection policy or
//! socket lifecycle management.
//!
//! # The Transport Seam
//!
//! `AuthorizedSocket` talks to the transport through the [`Transport`] and
//! [`TransportHandle`] traits rather than a concrete WebSocket type. The
//! traits mirror the events a connection attempt produces:
//!
//! - `error(err)` — zero or more, while the attempt is in flight
//! - `close(code)` — the attempt failed before ever opening
//! - `open(handle)` — the attempt succeeded
//!
//! The production implementation is [`WsTransport`] / [`WsHandle`] on
//! `tokio-tungstenite`. Tests script their own implementation to drive the
//! lifecycle state machine deterministically.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{http::Request, protocol::Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

/// Close code reported when the peer's close frame carries no status.
const NO_STATUS_CLOSE_CODE: u16 = 1005;

/// Close code reported for abrupt termination (handshake failure, broken
/// stream, EOF without a close frame).
const ABNORMAL_CLOSE_CODE: u16 = 1006;

/// An error produced by a transport implementation.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// One event observed during a connection attempt.
///
/// Events arrive in transport order until either `Open` or `Closed` is
/// seen, which ends the attempt.
pub enum DialEvent<H> {
    /// A transport error. Does not by itself fail or succeed the attempt.
    Error(TransportError),
    /// The transport closed before opening. The attempt has failed.
    Closed { code: u16 },
    /// The connection is open and ready. The attempt has succeeded.
    Open(H),
}

/// Opens connections to a remote endpoint.
pub trait Transport: Send + Sync + 'static {
    type Handle: TransportHandle;

    /// Begin opening an authenticated connection.
    ///
    /// `credentials` is the raw `"<id>:<secret>"` pair; the transport's own
    /// auth mechanism is responsible for any encoding.
    ///
    /// Returns the event stream for this attempt.
    fn dial(&self, url: &str, credentials: &str) -> mpsc::UnboundedReceiver<DialEvent<Self::Handle>>;
}

/// A live, open connection produced by a successful dial.
#[async_trait]
pub trait TransportHandle: Send + Sync + 'static {
    /// Send a binary payload.
    async fn send(&self, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Request close and wait until the transport confirms. Idempotent.
    async fn close(&self);

    /// Resolve with the close code once the transport closes, however that
    /// happens. Multiple waiters are allowed.
    async fn closed(&self) -> u16;
}

/// Type alias for the WebSocket send half
type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, Message>;

/// The production WebSocket transport.
pub struct WsTransport;

impl Transport for WsTransport {
    type Handle = WsHandle;

    fn dial(&self, url: &str, credentials: &str) -> mpsc::UnboundedReceiver<DialEvent<WsHandle>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let url = url.to_string();
        let authorization = basic_auth_header(credentials);

        tokio::spawn(async move {
            debug!(url = %url, "dialing WebSocket");

            let request = match build_request(&url, &authorization) {
                Ok(request) => request,
                Err(err) => {
                    let _ = tx.send(DialEvent::Error(err));
                    let _ = tx.send(DialEvent::Closed {
                        code: ABNORMAL_CLOSE_CODE,
                    });
                    return;
                }
            };

            match connect_async_with_config(request, None, false).await {
                Ok((ws, _response)) => {
                    debug!(url = %url, "WebSocket connected");
                    let _ = tx.send(DialEvent::Open(WsHandle::new(ws)));
                }
                Err(err) => {
                    // A failed handshake never opened: error, then abnormal close.
                    let _ = tx.send(DialEvent::Error(TransportError(err.to_string())));
                    let _ = tx.send(DialEvent::Closed {
                        code: ABNORMAL_CLOSE_CODE,
                    });
                }
            }
        });

        rx
    }
}

/// A connected WebSocket handle.
///
/// A reader task drains incoming frames and resolves the close signal with
/// the peer's close code. The send half lives behind a mutex so the handle
/// can be shared.
pub struct WsHandle {
    sink: Mutex<WsSink>,
    closed_rx: watch::Receiver<Option<u16>>,
}

impl WsHandle {
    fn new(ws: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>) -> Self {
        let (sink, stream) = ws.split();
        let (closed_tx, closed_rx) = watch::channel(None);

        tokio::spawn(async move {
            let code = reader_loop(stream).await;
            debug!(code = code, "WebSocket closed");
            let _ = closed_tx.send(Some(code));
        });

        Self {
            sink: Mutex::new(sink),
            closed_rx,
        }
    }
}

#[async_trait]
impl TransportHandle for WsHandle {
    async fn send(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .send(Message::Binary(payload))
            .await
            .map_err(|e| TransportError(format!("failed to send: {}", e)))
    }

    async fn close(&self) {
        // Best-effort close frame; the peer (or the broken stream) resolves
        // the close signal either way.
        {
            let _ = self.sink.lock().await.send(Message::Close(None)).await;
        }
        let _ = self.closed().await;
    }

    async fn closed(&self) -> u16 {
        let mut rx = self.closed_rx.clone();
        let code = match rx.wait_for(|code| code.is_some()).await {
            Ok(code) => (*code).unwrap_or(ABNORMAL_CLOSE_CODE),
            Err(_) => ABNORMAL_CLOSE_CODE,
        };
        code
    }
}

/// Drain incoming frames until the connection closes; return the close code.
async fn reader_loop(
    mut stream: SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>,
) -> u16 {
    loop {
        match stream.next().await {
            Some(Ok(Message::Close(frame))) => {
                return frame
                    .map(|f| u16::from(f.code))
                    .unwrap_or(NO_STATUS_CLOSE_CODE);
            }
            Some(Ok(_)) => {
                // Ping/pong are handled by tungstenite; inbound payloads are
                // the bus layer's concern, not the socket's.
                continue;
            }
            Some(Err(_)) | None => return ABNORMAL_CLOSE_CODE,
        }
    }
}

/// Build the upgrade request with the transport's HTTP Basic auth header.
fn build_request(url: &str, authorization: &str) -> Result<Request<()>, TransportError> {
    Request::builder()
        .uri(url)
        .header("Host", extract_host(url))
        .header("Authorization", authorization)
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header(
            "Sec-WebSocket-Key",
            tokio_tungstenite::tungstenite::handshake::client::generate_key(),
        )
        .body(())
        .map_err(|e| TransportError(format!("failed to build request: {}", e)))
}

/// HTTP Basic auth header for a raw `"<id>:<secret>"` pair.
fn basic_auth_header(credentials: &str) -> String {
    format!("Basic {}", BASE64.encode(credentials))
}

/// Extract host from URL for Host header
fn extract_host(url: &str) -> &str {
    url.split("//")
        .nth(1)
        .and_then(|s| s.split('/').next())
        .unwrap_or("localhost")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_host() {
        assert_eq!(extract_host("ws://localhost:4444"), "localhost:4444");
        assert_eq!(extract_host("wss://example.com/bus"), "example.com");
        assert_eq!(extract_host("invalid"), "localhost");
    }

    #[test]
    fn test_basic_auth_header_encodes_verbatim_pair() {
        assert_eq!(basic_auth_header("svc:sek"), "Basic c3ZjOnNlaw==");
    }
}
