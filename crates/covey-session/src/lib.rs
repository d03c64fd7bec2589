//! Town sessions for Covey.
//!
//! A session is what a successful join hands back: an unguessable token
//! that later authenticates the live connection, bound to one player and
//! one video-access token.
//!
//! - [`SessionStore`] issues, looks up, and retires sessions for one town.
//! - [`VideoTokenProvider`] is the external video service, reduced to the
//!   single call the town needs.
//!
//! # How it fits in the stack
//!
//! ```text
//! Town layer (above)  ← owns one SessionStore per town
//!     ↕
//! Session layer (this crate)  ← tokens and video provisioning
//!     ↕
//! Protocol layer (below)  ← provides TownId, PlayerId
//! ```

#![allow(async_fn_in_trait)]

mod error;
mod session;
mod store;
mod video;

pub use error::SessionError;
pub use session::Session;
pub use store::SessionStore;
pub use video::{LocalVideoProvider, VideoTokenProvider};
