//! # Covey
//!
//! A multiplayer virtual-town server.
//!
//! Clients create, list, update, delete, and join *towns* through the
//! control plane, then open a live connection to hear about and broadcast
//! movement. Each town runs as its own actor; the server wires control
//! requests and live connections to them over WebSocket.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use covey::prelude::*;
//!
//! # async fn run() -> Result<(), CoveyError> {
//! let server = CoveyServer::builder()
//!     .bind("0.0.0.0:8081")
//!     .build(LocalVideoProvider)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;
mod service;

pub use error::{ControlError, CoveyError};
pub use server::{CoveyServer, CoveyServerBuilder, DEFAULT_HANDSHAKE_TIMEOUT};
pub use service::{TownCredentials, TownService};

/// Everything needed to run or embed a server.
pub mod prelude {
    pub use crate::{
        ControlError, CoveyError, CoveyServer, CoveyServerBuilder, TownCredentials,
        TownService,
    };
    pub use covey_protocol::{
        ControlMessage, Direction, Envelope, LiveMessage, Location, Payload, Player,
        PlayerId, TownId, TownSummary,
    };
    pub use covey_session::{LocalVideoProvider, SessionError, VideoTokenProvider};
    pub use covey_town::{JoinedTown, TownConfig, TownError};
}
