//! Towns for Covey.
//!
//! Each town runs as an isolated Tokio task (actor model) that owns the
//! town's players, sessions, and listeners. Nothing outside the task can
//! touch that state; everything goes through a [`TownHandle`], so every
//! mutation of one town is applied in a single, well-defined order.
//!
//! # Key types
//!
//! - [`TownRegistry`]: creates, looks up, lists, updates, and deletes towns
//! - [`TownHandle`]: send commands to a running town
//! - [`TownListener`]: the four notifications a connected occupant gets
//! - [`TownConfig`]: id alphabet, id and password lengths

mod config;
mod error;
mod listener;
mod registry;
mod town;

pub use config::TownConfig;
pub use error::TownError;
pub use listener::{ListenerId, TownListener};
pub use registry::{CreatedTown, TownRegistry};
pub use town::{ConnectedSession, JoinedTown, TownHandle, TownInfo, WeakTownHandle};
