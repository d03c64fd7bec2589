//! The session record.

use covey_protocol::PlayerId;

/// One occupant's binding to a town.
///
/// A session is created when a join is reserved, before the video token
/// exists. Until [`video_token`](Self::video_token) is filled in, the
/// session is *pending*: the player holds a place in the town but nobody
/// has been told about them and the token cannot open a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The secret the client presents when opening its live connection.
    /// 32 hex characters, 128 bits of randomness.
    pub token: String,

    /// The player this session belongs to. The player record itself is
    /// owned by the town and is retired together with this session.
    pub player_id: PlayerId,

    /// Access token for the town's video channel, once provisioned.
    pub video_token: Option<String>,
}

impl Session {
    /// Returns `true` while the video token is still being fetched.
    pub fn is_pending(&self) -> bool {
        self.video_token.is_none()
    }
}
