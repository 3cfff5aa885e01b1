//! Transport abstraction over the Noise socket.
//!
//! The session core never touches raw websockets or the Noise state
//! machine; it talks to a connected [`FrameSocket`] that moves opaque
//! encrypted frames, and learns about inbound frames and disconnects
//! through the event channel handed out by the [`SocketFactory`].

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("noise handshake failed: {0}")]
    Handshake(String),
    #[error("frame send failed: {0}")]
    Send(String),
    #[error("socket closed")]
    Closed,
}

/// Events reported by a live socket.
#[derive(Debug)]
pub enum SocketEvent {
    /// One encrypted-and-now-decrypted, still framed payload.
    Frame(Bytes),
    /// The connection ended. `remote` is true when the server closed it.
    Disconnected { remote: bool },
}

/// A connected, post-handshake Noise socket.
#[async_trait]
pub trait FrameSocket: Send + Sync {
    async fn send_frame(&self, payload: &[u8]) -> Result<(), TransportError>;
    /// Tear the socket down. `force` also aborts in-flight sends.
    async fn stop(&self, force: bool);
    fn is_connected(&self) -> bool;
    /// Cancelled when the socket dies, however it dies. Background tasks
    /// bound to this connection terminate on it.
    fn cancellation(&self) -> CancellationToken;
}

/// Opens sockets. Implementations dial through their configured proxy and
/// complete the Noise handshake with a freshly generated ephemeral key pair
/// before returning, so the socket handed back is ready for stanzas.
#[async_trait]
pub trait SocketFactory: Send + Sync {
    async fn connect(
        &self,
    ) -> Result<(Arc<dyn FrameSocket>, mpsc::Receiver<SocketEvent>), TransportError>;
}
