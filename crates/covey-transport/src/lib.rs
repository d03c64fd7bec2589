//! Byte-frame connections for Covey.
//!
//! Every client, whether it is issuing control requests or occupying a
//! town, reaches the server as a [`Connection`] handed out by a
//! [`Transport`]. Frames are opaque bytes here; decoding them is the
//! protocol crate's job.
//!
//! The `websocket` feature (on by default) provides [`WebSocketTransport`].

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide number of a client connection. Shows up in every log line
/// about that client as `conn-N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next unused id.
    pub fn allocate() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A listening endpoint that yields client connections one at a time.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Resolves once a client has connected and finished any upgrade
    /// handshake the transport needs.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;
}

/// One client's frame pipe.
///
/// A live occupant's handler waits in `recv` for the next movement while
/// town events are pushed out through `send`, so implementations must let
/// the two run concurrently on a shared reference.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Next frame from the client, or `Ok(None)` once the client has
    /// closed its side.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Idempotent.
    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_allocate_is_unique() {
        let a = ConnectionId::allocate();
        let b = ConnectionId::allocate();

        assert_ne!(a, b);
        assert!(b.0 > a.0);
    }

    #[test]
    fn test_connection_id_display_is_log_friendly() {
        assert_eq!(ConnectionId(7).to_string(), "conn-7");
    }
}
