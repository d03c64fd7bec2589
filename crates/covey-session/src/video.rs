//! The video token provider hook.
//!
//! Each town has a video channel run by an external service. Covey does
//! not talk to that service directly; it calls a [`VideoTokenProvider`]
//! once per join and stores whatever opaque token comes back.

use covey_protocol::{PlayerId, TownId};

use crate::SessionError;
use crate::store::generate_token;

/// Fetches a video-access token for one player in one town.
///
/// The call may be slow and may fail; the town treats both as normal. A
/// failure aborts the join and rolls the player back out of the town.
/// There is no retry: the client can simply join again.
///
/// # Example
///
/// ```rust
/// use covey_protocol::{PlayerId, TownId};
/// use covey_session::{SessionError, VideoTokenProvider};
///
/// /// Refuses every request, e.g. while the video service is down.
/// struct VideoOffline;
///
/// impl VideoTokenProvider for VideoOffline {
///     async fn token_for_town(
///         &self,
///         _town_id: &TownId,
///         _player_id: PlayerId,
///     ) -> Result<String, SessionError> {
///         Err(SessionError::VideoProvisioning("service offline".into()))
///     }
/// }
/// ```
pub trait VideoTokenProvider: Send + Sync + 'static {
    /// Returns a token granting `player_id` access to the video channel
    /// of `town_id`.
    ///
    /// # Errors
    /// Any failure is reported as [`SessionError::VideoProvisioning`].
    fn token_for_town(
        &self,
        town_id: &TownId,
        player_id: PlayerId,
    ) -> impl std::future::Future<Output = Result<String, SessionError>> + Send;
}

/// A provider for local development that mints random tokens itself.
///
/// The tokens grant nothing; they only let the rest of the system run
/// without a video service.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalVideoProvider;

impl VideoTokenProvider for LocalVideoProvider {
    async fn token_for_town(
        &self,
        town_id: &TownId,
        player_id: PlayerId,
    ) -> Result<String, SessionError> {
        tracing::debug!(%town_id, %player_id, "issuing local video token");
        Ok(format!("local-{}", generate_token()))
    }
}
