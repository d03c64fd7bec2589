//! The listener protocol: how a town talks to its connected occupants.

use std::fmt;

use covey_protocol::Player;

/// Identity of one listener registration within a town.
///
/// Listeners are registered and removed by this id, never by comparing
/// the listeners themselves, so two structurally equal listeners can
/// never be mistaken for each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L-{}", self.0)
    }
}

/// A sink for town events, usually one per live connection.
///
/// The town calls these methods from its own task, one at a time and in
/// the order the events happened. Implementations must not block: the
/// connection adapter just queues the event for its writer.
pub trait TownListener: Send + 'static {
    /// Another player finished joining the town.
    fn on_player_joined(&mut self, player: &Player);

    /// Another player moved. `player.location` is the new location.
    fn on_player_moved(&mut self, player: &Player);

    /// Another player left. `player` is their last known state.
    fn on_player_disconnected(&mut self, player: &Player);

    /// The town was torn down. The listener has already been removed and
    /// should terminate its connection.
    fn on_town_destroyed(&mut self);
}
