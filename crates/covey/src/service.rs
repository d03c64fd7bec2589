//! The control plane: create, list, update, delete, and join towns.
//!
//! [`TownService`] is what a request handler talks to. It validates input,
//! delegates to the [`TownRegistry`] and the town actors, and turns every
//! failure into a typed [`ControlError`].

use std::sync::Arc;

use covey_protocol::{ControlMessage, TownId, TownSummary};
use covey_session::VideoTokenProvider;
use covey_town::{JoinedTown, TownConfig, TownError, TownHandle, TownRegistry};
use tokio::sync::Mutex;

use crate::ControlError;

/// Credentials handed to the creator of a new town.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TownCredentials {
    pub town_id: TownId,
    /// Shown once. Required for every later update or delete.
    pub update_password: String,
}

/// Control-plane operations over one registry.
///
/// Cheap to clone; clones share the registry and the video provider.
pub struct TownService<P> {
    registry: Arc<Mutex<TownRegistry>>,
    video: Arc<P>,
}

impl<P> Clone for TownService<P> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            video: Arc::clone(&self.video),
        }
    }
}

impl<P: VideoTokenProvider> TownService<P> {
    /// Creates a service with an empty registry.
    pub fn new(config: TownConfig, video: P) -> Self {
        Self {
            registry: Arc::new(Mutex::new(TownRegistry::new(config))),
            video: Arc::new(video),
        }
    }

    /// Creates a town.
    ///
    /// # Errors
    /// - [`ControlError::InvalidRequest`]: the name is empty or only
    ///   whitespace. No town is created.
    /// - [`ControlError::TownLimitReached`]: no free town id is left
    ///   under the configured alphabet and length
    pub async fn create_town(
        &self,
        friendly_name: &str,
        is_public: bool,
    ) -> Result<TownCredentials, ControlError> {
        if friendly_name.trim().is_empty() {
            return Err(ControlError::InvalidRequest(
                "friendly name must not be empty".into(),
            ));
        }

        let created = self
            .registry
            .lock()
            .await
            .create_town(friendly_name, is_public)
            .map_err(|e| {
                tracing::warn!(error = %e, "town creation failed");
                ControlError::TownLimitReached
            })?;
        Ok(TownCredentials {
            town_id: created.town_id,
            update_password: created.update_password,
        })
    }

    /// Lists every public town with its current occupancy.
    pub async fn list_towns(&self) -> Vec<TownSummary> {
        self.registry.lock().await.list_public_towns().await
    }

    /// Renames a town and/or changes its visibility.
    ///
    /// # Errors
    /// [`ControlError::Rejected`] for an unknown town, a wrong password, or
    /// a blank new name, without saying which.
    pub async fn update_town(
        &self,
        town_id: &TownId,
        password: &str,
        friendly_name: Option<String>,
        is_public: Option<bool>,
    ) -> Result<(), ControlError> {
        let updated = self
            .registry
            .lock()
            .await
            .update_town(town_id, password, friendly_name, is_public)
            .await;
        if updated { Ok(()) } else { Err(ControlError::Rejected) }
    }

    /// Deletes a town, evicting everyone in it.
    ///
    /// # Errors
    /// [`ControlError::Rejected`] for an unknown town or a wrong password.
    pub async fn delete_town(&self, town_id: &TownId, password: &str) -> Result<(), ControlError> {
        let deleted = self
            .registry
            .lock()
            .await
            .delete_town(town_id, password)
            .await;
        if deleted { Ok(()) } else { Err(ControlError::Rejected) }
    }

    /// Joins a town as `user_name`.
    ///
    /// The registry lock is released before the video token is fetched, so
    /// a slow provider never stalls other requests.
    ///
    /// # Errors
    /// - [`ControlError::TownNotFound`]: no such town, or it went away
    ///   during the join
    /// - [`ControlError::VideoUnavailable`]: the video provider failed
    pub async fn join_town(
        &self,
        town_id: &TownId,
        user_name: &str,
    ) -> Result<JoinedTown, ControlError> {
        let handle = self
            .lookup(town_id)
            .await
            .ok_or_else(|| ControlError::TownNotFound(town_id.clone()))?;

        handle
            .join(user_name, self.video.as_ref())
            .await
            .map_err(|e| match e {
                TownError::Session(e) => {
                    tracing::warn!(%town_id, error = %e, "join failed: video provider");
                    ControlError::VideoUnavailable
                }
                TownError::Unavailable(_) | TownError::JoinCancelled(_) => {
                    ControlError::TownNotFound(town_id.clone())
                }
                TownError::AuthFailed => ControlError::Rejected,
                other @ (TownError::InvalidConfig(_) | TownError::IdSpaceExhausted) => {
                    tracing::error!(%town_id, error = %other, "unexpected join failure");
                    ControlError::TownNotFound(town_id.clone())
                }
            })
    }

    /// Returns a handle to a live town.
    pub async fn lookup(&self, town_id: &TownId) -> Option<TownHandle> {
        self.registry.lock().await.lookup(town_id)
    }

    /// Answers one control request. Failures come back as
    /// [`ControlMessage::Error`].
    pub async fn handle(&self, request: ControlMessage) -> ControlMessage {
        self.dispatch(request)
            .await
            .unwrap_or_else(|e| e.to_message())
    }

    async fn dispatch(&self, request: ControlMessage) -> Result<ControlMessage, ControlError> {
        match request {
            ControlMessage::CreateTown {
                friendly_name,
                is_public,
            } => {
                let created = self.create_town(&friendly_name, is_public).await?;
                Ok(ControlMessage::TownCreated {
                    town_id: created.town_id,
                    update_password: created.update_password,
                })
            }
            ControlMessage::ListTowns => Ok(ControlMessage::TownList {
                towns: self.list_towns().await,
            }),
            ControlMessage::UpdateTown {
                town_id,
                password,
                friendly_name,
                is_public,
            } => {
                self.update_town(&town_id, &password, friendly_name, is_public)
                    .await?;
                Ok(ControlMessage::Ack)
            }
            ControlMessage::DeleteTown { town_id, password } => {
                self.delete_town(&town_id, &password).await?;
                Ok(ControlMessage::Ack)
            }
            ControlMessage::JoinTown { town_id, user_name } => {
                let joined = self.join_town(&town_id, &user_name).await?;
                Ok(ControlMessage::TownJoined {
                    session_token: joined.session_token,
                    player_id: joined.player.id,
                    video_token: joined.video_token,
                    friendly_name: joined.friendly_name,
                    is_public: joined.is_public,
                    current_players: joined.current_players,
                })
            }
            ControlMessage::TownCreated { .. }
            | ControlMessage::TownList { .. }
            | ControlMessage::Ack
            | ControlMessage::TownJoined { .. }
            | ControlMessage::Error { .. } => Err(ControlError::InvalidRequest(
                "not a request message".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use covey_session::{LocalVideoProvider, SessionError};
    use covey_protocol::PlayerId;

    use super::*;

    struct FailingVideo;

    impl VideoTokenProvider for FailingVideo {
        async fn token_for_town(
            &self,
            _town_id: &TownId,
            _player_id: PlayerId,
        ) -> Result<String, SessionError> {
            Err(SessionError::VideoProvisioning("down".into()))
        }
    }

    fn service() -> TownService<LocalVideoProvider> {
        TownService::new(TownConfig::default(), LocalVideoProvider)
    }

    #[tokio::test]
    async fn test_create_town_blank_name_returns_invalid_request() {
        let service = service();

        let result = service.create_town("  \t", true).await;

        assert!(matches!(result, Err(ControlError::InvalidRequest(_))));
        assert!(service.list_towns().await.is_empty());
        assert_eq!(service.registry.lock().await.town_count(), 0);
    }

    #[tokio::test]
    async fn test_update_town_unknown_and_wrong_password_look_alike() {
        let service = service();
        let created = service.create_town("Lobby", true).await.unwrap();

        let unknown = service
            .update_town(&TownId::from("00000000"), "pw", None, Some(false))
            .await;
        let wrong = service
            .update_town(&created.town_id, "pw", None, Some(false))
            .await;

        assert_eq!(unknown, Err(ControlError::Rejected));
        assert_eq!(wrong, Err(ControlError::Rejected));
    }

    #[tokio::test]
    async fn test_join_town_unknown_returns_not_found() {
        let service = service();

        let result = service.join_town(&TownId::from("00000000"), "ada").await;

        assert!(matches!(result, Err(ControlError::TownNotFound(_))));
    }

    #[tokio::test]
    async fn test_join_town_video_failure_returns_video_unavailable() {
        let service = TownService::new(TownConfig::default(), FailingVideo);
        let created = service.create_town("Lobby", true).await.unwrap();

        let result = service.join_town(&created.town_id, "ada").await;

        assert_eq!(result, Err(ControlError::VideoUnavailable));
        let handle = service.lookup(&created.town_id).await.unwrap();
        assert_eq!(handle.info().await.unwrap().player_count, 0);
    }

    #[tokio::test]
    async fn test_create_town_id_space_used_up_returns_503() {
        let config = TownConfig {
            town_id_alphabet: "A".into(),
            town_id_len: 1,
            ..TownConfig::default()
        };
        let service = TownService::new(config, LocalVideoProvider);
        service.create_town("First", true).await.unwrap();

        let second = service.create_town("Second", true).await;
        let reply = service
            .handle(ControlMessage::CreateTown {
                friendly_name: "Third".into(),
                is_public: true,
            })
            .await;

        assert_eq!(second, Err(ControlError::TownLimitReached));
        assert!(matches!(reply, ControlMessage::Error { code: 503, .. }));
        assert_eq!(service.list_towns().await.len(), 1);
    }

    #[tokio::test]
    async fn test_handle_response_message_returns_400() {
        let service = service();

        let reply = service.handle(ControlMessage::Ack).await;

        assert!(matches!(reply, ControlMessage::Error { code: 400, .. }));
    }

    #[tokio::test]
    async fn test_handle_delete_then_join_returns_404() {
        let service = service();
        let created = match service
            .handle(ControlMessage::CreateTown {
                friendly_name: "Lobby".into(),
                is_public: false,
            })
            .await
        {
            ControlMessage::TownCreated {
                town_id,
                update_password,
            } => (town_id, update_password),
            other => panic!("unexpected reply: {other:?}"),
        };

        let deleted = service
            .handle(ControlMessage::DeleteTown {
                town_id: created.0.clone(),
                password: created.1,
            })
            .await;
        let joined = service
            .handle(ControlMessage::JoinTown {
                town_id: created.0,
                user_name: "ada".into(),
            })
            .await;

        assert_eq!(deleted, ControlMessage::Ack);
        assert!(matches!(joined, ControlMessage::Error { code: 404, .. }));
    }
}
