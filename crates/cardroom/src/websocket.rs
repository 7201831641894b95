//! WebSocket transport using `tokio-tungstenite`.
//!
//! Each accepted socket is split into a receiving half, read by the
//! connection handler, and a sending half, owned by a writer task. The two
//! halves never contend for a lock.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cardroom_protocol::ConnectionId;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::TransportError;

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<TcpStream>;

/// Listens for incoming WebSocket connections.
pub struct WebSocketListener {
    listener: TcpListener,
}

impl WebSocketListener {
    /// Binds to `addr`. Use port 0 to let the OS pick one.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        tracing::info!(addr, "WebSocket listener bound");
        Ok(Self { listener })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener
            .local_addr()
            .map_err(TransportError::BindFailed)
    }

    /// Waits for the next TCP connection. The WebSocket upgrade is left to
    /// [`PendingConnection::upgrade`] so a slow peer can't hold up the
    /// accept loop.
    pub async fn accept(&self) -> Result<PendingConnection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::AcceptFailed(e.into()))?;

        let id = ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %addr, "accepted TCP connection");

        Ok(PendingConnection { id, addr, stream })
    }
}

/// A TCP connection that hasn't completed the WebSocket handshake yet.
pub struct PendingConnection {
    id: ConnectionId,
    addr: SocketAddr,
    stream: TcpStream,
}

impl PendingConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Completes the WebSocket upgrade, giving up after `timeout`.
    pub async fn upgrade(self, timeout: Duration) -> Result<WebSocketConnection, TransportError> {
        let ws = match time::timeout(timeout, tokio_tungstenite::accept_async(self.stream)).await {
            Ok(result) => result.map_err(TransportError::AcceptFailed)?,
            Err(_) => return Err(TransportError::UpgradeTimedOut(self.addr)),
        };

        tracing::debug!(id = %self.id, addr = %self.addr, "WebSocket upgrade complete");
        Ok(WebSocketConnection { ws })
    }
}

/// An upgraded WebSocket connection, not yet split.
pub struct WebSocketConnection {
    ws: WsStream,
}

impl WebSocketConnection {
    /// Splits into independently owned sending and receiving halves.
    pub fn split(self) -> (FrameSender, FrameReceiver) {
        let (sink, stream) = self.ws.split();
        (FrameSender { sink }, FrameReceiver { stream })
    }
}

/// The sending half of a connection.
pub struct FrameSender {
    sink: SplitSink<WsStream, Message>,
}

impl FrameSender {
    /// Sends one encoded envelope as a binary frame.
    pub async fn send(&mut self, data: Vec<u8>) -> Result<(), TransportError> {
        self.sink
            .send(Message::Binary(data.into()))
            .await
            .map_err(TransportError::SendFailed)
    }

    /// Sends a close frame.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.sink.close().await.map_err(TransportError::SendFailed)
    }
}

/// The receiving half of a connection.
pub struct FrameReceiver {
    stream: SplitStream<WsStream>,
}

impl FrameReceiver {
    /// Receives the next data frame. Text and binary frames are both
    /// accepted; control frames are skipped.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_bytes().to_vec())),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e)),
            }
        }
    }
}
