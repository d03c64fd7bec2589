//! Town data types and the messages that travel on the wire.
//!
//! Everything in this module is plain data: it can be serialized, cloned
//! and compared, but it has no behavior tied to a running town. The town
//! crate owns the state; this crate only describes its shape.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The short, human-typable identifier of a town (e.g. `"3FA0C91B"`).
///
/// Town ids are strings rather than counters because people read them out
/// loud and type them into a join box. `#[serde(transparent)]` keeps the
/// JSON representation a bare string.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TownId(pub String);

impl TownId {
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TownId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TownId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identifies a player within one town.
///
/// Assigned by the town at join time. Two towns may hand out the same
/// number; a `PlayerId` is only meaningful next to its `TownId`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// Which way an avatar is facing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

/// Where a player is and what their avatar is doing.
///
/// Coordinates are map pixels. The server never validates them: movement
/// comes from an already-authenticated connection and is stored as-is.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub moving: bool,
    pub facing: Direction,
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// One occupant of a town, as other occupants see them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    /// Free-form display name. Not authenticated, not unique.
    pub user_name: String,
    pub location: Location,
}

impl Player {
    /// Creates a player standing at the default spawn location.
    pub fn new(id: PlayerId, user_name: impl Into<String>) -> Self {
        Self {
            id,
            user_name: user_name.into(),
            location: Location::default(),
        }
    }
}

/// A public town as it appears in the town listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TownSummary {
    pub town_id: TownId,
    pub friendly_name: String,
    /// Number of live connections, not the number of reserved players.
    pub occupancy: usize,
}

// ---------------------------------------------------------------------------
// ControlMessage: the request/response control plane
// ---------------------------------------------------------------------------

/// Control-plane requests and their responses.
///
/// Requests flow client → server and every request gets exactly one
/// response on the same connection: either the matching success variant
/// or [`ControlMessage::Error`].
///
/// Internally tagged, so `CreateTown` looks like
/// `{ "type": "CreateTown", "friendly_name": "Lobby", "is_public": true }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Client → Server: create a new town.
    CreateTown {
        friendly_name: String,
        is_public: bool,
    },

    /// Server → Client: the town exists. `update_password` is shown once
    /// and is required for every later update or delete.
    TownCreated {
        town_id: TownId,
        update_password: String,
    },

    /// Client → Server: list public towns.
    ListTowns,

    /// Server → Client: the public towns right now.
    TownList { towns: Vec<TownSummary> },

    /// Client → Server: rename a town and/or change its visibility.
    /// Omitted fields are left unchanged.
    UpdateTown {
        town_id: TownId,
        password: String,
        #[serde(default)]
        friendly_name: Option<String>,
        #[serde(default)]
        is_public: Option<bool>,
    },

    /// Client → Server: delete a town and evict everyone in it.
    DeleteTown { town_id: TownId, password: String },

    /// Server → Client: the update or delete went through.
    Ack,

    /// Client → Server: reserve a place in a town.
    JoinTown { town_id: TownId, user_name: String },

    /// Server → Client: the join succeeded. The client opens a live
    /// connection with `session_token` next.
    TownJoined {
        session_token: String,
        player_id: PlayerId,
        video_token: String,
        friendly_name: String,
        is_public: bool,
        /// Everyone already announced in the town, excluding the joiner.
        current_players: Vec<Player>,
    },

    /// Server → Client: the request failed. `code` follows HTTP
    /// conventions (400, 403, 404, 502).
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// LiveMessage: the per-occupant event stream
// ---------------------------------------------------------------------------

/// Messages on a live (authenticated) town connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LiveMessage {
    /// Client → Server: must be the first live frame. Anything wrong
    /// with it gets the connection closed without a reply.
    Handshake {
        town_id: TownId,
        session_token: String,
    },

    /// Server → Client: the session is bound to this connection.
    HandshakeAck { player_id: PlayerId },

    /// Client → Server: the sender's avatar moved.
    Move { location: Location },

    /// Client → Server: the occupant is leaving.
    Disconnect { reason: String },

    /// Server → Client: someone finished joining the town.
    PlayerJoined { player: Player },

    /// Server → Client: someone else moved.
    PlayerMoved { player: Player },

    /// Server → Client: someone left. Carries the player as last seen.
    PlayerDisconnected { player: Player },

    /// Server → Client: the town was deleted. The server closes the
    /// connection right after this frame.
    TownDestroyed,
}

// ---------------------------------------------------------------------------
// Payload & Envelope
// ---------------------------------------------------------------------------

/// Either a control-plane message or a live-connection message.
///
/// Adjacently tagged: `{ "type": "Live", "data": { "type": "Move", ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    Control(ControlMessage),
    Live(LiveMessage),
}

/// The top-level frame. Every message on the wire is an Envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-sender sequence number, starting at 0 for the first frame.
    pub seq: u64,

    /// Milliseconds since the sender's connection started.
    pub timestamp: u64,

    pub payload: Payload,
}

impl Envelope {
    /// Wraps a control message with a zero timestamp.
    pub fn control(seq: u64, msg: ControlMessage) -> Self {
        Self {
            seq,
            timestamp: 0,
            payload: Payload::Control(msg),
        }
    }

    /// Wraps a live message with a zero timestamp.
    pub fn live(seq: u64, msg: LiveMessage) -> Self {
        Self {
            seq,
            timestamp: 0,
            payload: Payload::Live(msg),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The browser client parses these JSON shapes directly, so the tests
    //! pin down the serde attributes rather than round-tripping every type.

    use super::*;

    #[test]
    fn test_town_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&TownId::from("3FA0C91B")).unwrap();
        assert_eq!(json, "\"3FA0C91B\"");
    }

    #[test]
    fn test_player_id_display() {
        assert_eq!(PlayerId(7).to_string(), "P-7");
    }

    #[test]
    fn test_direction_serializes_lowercase() {
        let json = serde_json::to_string(&Direction::Down).unwrap();
        assert_eq!(json, "\"down\"");
    }

    #[test]
    fn test_location_accepts_integer_coordinates() {
        let location: Location = serde_json::from_str(
            r#"{"x": 100, "y": 100, "moving": true, "facing": "down"}"#,
        )
        .unwrap();
        assert_eq!(
            location,
            Location {
                x: 100.0,
                y: 100.0,
                moving: true,
                facing: Direction::Down,
            }
        );
    }

    #[test]
    fn test_player_new_starts_at_default_location() {
        let player = Player::new(PlayerId(1), "ada");
        assert_eq!(player.location, Location::default());
        assert_eq!(player.user_name, "ada");
    }

    #[test]
    fn test_control_create_town_json_format() {
        let msg = ControlMessage::CreateTown {
            friendly_name: "Lobby".into(),
            is_public: true,
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "CreateTown");
        assert_eq!(json["friendly_name"], "Lobby");
        assert_eq!(json["is_public"], true);
    }

    #[test]
    fn test_control_update_town_optional_fields_default_to_none() {
        let msg: ControlMessage = serde_json::from_str(
            r#"{"type": "UpdateTown", "town_id": "AB12", "password": "pw"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ControlMessage::UpdateTown {
                town_id: TownId::from("AB12"),
                password: "pw".into(),
                friendly_name: None,
                is_public: None,
            }
        );
    }

    #[test]
    fn test_control_error_json_format() {
        let msg = ControlMessage::Error {
            code: 404,
            message: "no such town".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "Error");
        assert_eq!(json["code"], 404);
    }

    #[test]
    fn test_live_player_moved_json_format() {
        let mut player = Player::new(PlayerId(3), "grace");
        player.location.x = 12.5;
        let msg = LiveMessage::PlayerMoved { player };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "PlayerMoved");
        assert_eq!(json["player"]["id"], 3);
        assert_eq!(json["player"]["location"]["x"], 12.5);
        assert_eq!(json["player"]["location"]["facing"], "down");
    }

    #[test]
    fn test_live_town_destroyed_is_tag_only() {
        let json = serde_json::to_string(&LiveMessage::TownDestroyed).unwrap();
        assert_eq!(json, r#"{"type":"TownDestroyed"}"#);
    }

    #[test]
    fn test_payload_is_adjacently_tagged() {
        let envelope = Envelope::live(
            4,
            LiveMessage::Handshake {
                town_id: TownId::from("AB12"),
                session_token: "tok".into(),
            },
        );
        let json: serde_json::Value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["seq"], 4);
        assert_eq!(json["payload"]["type"], "Live");
        assert_eq!(json["payload"]["data"]["type"], "Handshake");
        assert_eq!(json["payload"]["data"]["town_id"], "AB12");
    }

    #[test]
    fn test_decode_unknown_live_message_type_returns_error() {
        let unknown = r#"{"type": "Teleport", "x": 1}"#;
        let result: Result<LiveMessage, _> = serde_json::from_str(unknown);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_envelope_missing_payload_returns_error() {
        let result: Result<Envelope, _> =
            serde_json::from_str(r#"{"seq": 1, "timestamp": 0}"#);
        assert!(result.is_err());
    }
}
