//! Wire protocol for Covey.
//!
//! This crate defines what clients and the server say to each other:
//!
//! - **Town data** ([`TownId`], [`Player`], [`Location`], [`TownSummary`])
//! - **Messages** ([`Envelope`], [`Payload`], [`ControlMessage`],
//!   [`LiveMessage`])
//! - **Codec** ([`Codec`], [`JsonCodec`])
//! - **Errors** ([`ProtocolError`])
//!
//! A connection carries two kinds of traffic. Control messages are
//! request/response pairs for the town lifecycle (create, list, update,
//! delete, join). Live messages are the event stream of one occupant
//! after it has authenticated with a session token.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ControlMessage, Direction, Envelope, LiveMessage, Location, Payload,
    Player, PlayerId, TownId, TownSummary,
};
