//! Error types for the Covey server.

use covey_protocol::{ControlMessage, ProtocolError, TownId};
use covey_town::TownError;
use covey_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum CoveyError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A town-level error, such as an unusable town config.
    #[error(transparent)]
    Town(#[from] TownError),
}

/// A failed control-plane request, as the client sees it.
///
/// Each variant maps to an HTTP-style status code. Credential failures
/// are all reported as [`ControlError::Rejected`] so a caller cannot tell
/// which part was wrong.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// The request was malformed or failed validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown town, wrong password, or unacceptable update.
    #[error("rejected")]
    Rejected,

    /// No live town has this id.
    #[error("town {0} not found")]
    TownNotFound(TownId),

    /// The video provider could not issue a token.
    #[error("video service unavailable")]
    VideoUnavailable,

    /// No new town can be created: the id space is used up.
    #[error("no more towns can be created")]
    TownLimitReached,
}

impl ControlError {
    /// Returns the status code sent to the client.
    pub fn code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::Rejected => 403,
            Self::TownNotFound(_) => 404,
            Self::VideoUnavailable => 502,
            Self::TownLimitReached => 503,
        }
    }

    /// Renders this error as a wire message.
    pub fn to_message(&self) -> ControlMessage {
        ControlMessage::Error {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let covey_err: CoveyError = err.into();
        assert!(matches!(covey_err, CoveyError::Transport(_)));
        assert!(covey_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let covey_err: CoveyError = err.into();
        assert!(matches!(covey_err, CoveyError::Protocol(_)));
    }

    #[test]
    fn test_from_town_error() {
        let err = TownError::InvalidConfig("town_id_len must be at least 1".into());
        let covey_err: CoveyError = err.into();
        assert!(matches!(covey_err, CoveyError::Town(_)));
        assert!(covey_err.to_string().contains("town_id_len"));
    }

    #[test]
    fn test_control_error_codes() {
        assert_eq!(ControlError::InvalidRequest("x".into()).code(), 400);
        assert_eq!(ControlError::Rejected.code(), 403);
        assert_eq!(ControlError::TownNotFound(TownId::from("X")).code(), 404);
        assert_eq!(ControlError::VideoUnavailable.code(), 502);
        assert_eq!(ControlError::TownLimitReached.code(), 503);
    }

    #[test]
    fn test_control_error_to_message_carries_code() {
        let msg = ControlError::TownNotFound(TownId::from("AB12CD34")).to_message();
        assert_eq!(
            msg,
            ControlMessage::Error {
                code: 404,
                message: "town AB12CD34 not found".into(),
            }
        );
    }
}
