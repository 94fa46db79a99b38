//! Transport abstraction.
//!
//! The engine never touches BLE directly. An adapter delivers complete,
//! reassembled frames and connection state changes as events, and accepts
//! complete frames to send. GATT specifics (MTU, notification chunking,
//! characteristic routing) live behind this trait.

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::TransportError;

/// Link state as reported by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// One event from the transport adapter.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A complete inbound frame (plain or secure; the session decides).
    Frame(Bytes),
    /// The link changed state.
    Connection(ConnectionState),
}

/// A frame-oriented transport to one lock.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one complete frame. Resolves once handed to the link.
    async fn send(&self, frame: Bytes) -> Result<(), TransportError>;

    /// Await the next event. `None` means the adapter shut down.
    async fn next_event(&self) -> Option<TransportEvent>;
}
