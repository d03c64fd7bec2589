//! Error types for the session layer.

/// Errors that can occur while issuing or completing a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No live session holds this token. Either it was never issued, or
    /// its session already ended. Callers must not reveal which.
    #[error("invalid session token")]
    InvalidToken,

    /// The video token provider failed. The message is opaque: the
    /// provider's failure modes are not part of our contract.
    #[error("video provisioning failed: {0}")]
    VideoProvisioning(String),
}
