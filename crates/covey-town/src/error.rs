//! Error types for the town layer.

use covey_protocol::TownId;
use covey_session::SessionError;

/// Errors that can occur during town operations.
#[derive(Debug, thiserror::Error)]
pub enum TownError {
    /// The town's actor has stopped, usually because the town was deleted
    /// after the caller looked it up.
    #[error("town {0} is unavailable")]
    Unavailable(TownId),

    /// A live connection presented a session token that is unknown,
    /// retired, still pending, or already bound to another connection.
    /// Deliberately carries no detail.
    #[error("session rejected")]
    AuthFailed,

    /// The session was ended while its video token was being fetched,
    /// e.g. because the town was emptied. Nobody was told about the join.
    #[error("join to town {0} was cancelled")]
    JoinCancelled(TownId),

    /// The town configuration cannot be used, e.g. a zero id length.
    #[error("invalid town config: {0}")]
    InvalidConfig(String),

    /// Every town id the configured alphabet and length allow is taken,
    /// or too few are free to find one quickly.
    #[error("no free town id left")]
    IdSpaceExhausted,

    /// A session-layer failure, most importantly video provisioning.
    #[error(transparent)]
    Session(#[from] SessionError),
}
