//! Town actor: an isolated Tokio task that owns one town.
//!
//! Players, sessions, and listeners live inside the actor and are only
//! reachable through [`TownHandle`] commands. The actor handles one
//! command at a time, so every transition (a move, a disconnect, a
//! metadata update) is applied whole before the next one starts.
//!
//! # Deferred join announcement
//!
//! A join is two commands with an `await` in between:
//!
//! ```text
//! Reserve ──→ (fetch video token, outside the actor) ──→ CompleteJoin
//!    │                        │                              │
//!    ▼                        ▼ (fails)                      ▼
//! player + pending session   AbortJoin: both removed,     session live,
//! exist, nobody is told      nobody was ever told         PlayerJoined sent
//! ```
//!
//! While the session is pending the player holds a place in the town but
//! is invisible: it is left out of join snapshots, its moves are not
//! broadcast, and its token cannot open a live connection. `CompleteJoin`
//! re-checks that the session still exists before announcing anything.

use std::collections::BTreeMap;
use std::fmt;

use covey_protocol::{Location, Player, PlayerId, TownId, TownSummary};
use covey_session::{Session, SessionStore, VideoTokenProvider};
use tokio::sync::{mpsc, oneshot};

use crate::{ListenerId, TownError, TownListener};

// ---------------------------------------------------------------------------
// Public result types
// ---------------------------------------------------------------------------

/// A snapshot of town metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TownInfo {
    pub town_id: TownId,
    pub friendly_name: String,
    pub is_public: bool,
    /// Registered listeners. This, not `player_count`, is the occupancy.
    pub occupancy: usize,
    /// Players holding a place, including pending joins.
    pub player_count: usize,
    pub session_count: usize,
}

impl TownInfo {
    /// The listing entry for this town.
    pub fn summary(&self) -> TownSummary {
        TownSummary {
            town_id: self.town_id.clone(),
            friendly_name: self.friendly_name.clone(),
            occupancy: self.occupancy,
        }
    }
}

/// Everything a client needs after a successful join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedTown {
    pub session_token: String,
    pub player: Player,
    pub video_token: String,
    pub friendly_name: String,
    pub is_public: bool,
    /// Announced players other than the joiner, ordered by id.
    pub current_players: Vec<Player>,
}

/// The result of binding a live connection to its session.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedSession {
    pub listener_id: ListenerId,
    pub player: Player,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub(crate) struct Reservation {
    session_token: String,
    player: Player,
}

/// Commands sent to a town actor through its channel. Variants carrying a
/// `oneshot::Sender` expect a reply.
pub(crate) enum TownCommand {
    Reserve {
        user_name: String,
        reply: oneshot::Sender<Reservation>,
    },
    CompleteJoin {
        session_token: String,
        video_token: String,
        reply: oneshot::Sender<Result<JoinedTown, TownError>>,
    },
    AbortJoin {
        session_token: String,
    },
    Connect {
        session_token: String,
        listener: Box<dyn TownListener>,
        reply: oneshot::Sender<Result<ConnectedSession, TownError>>,
    },
    AddListener {
        listener: Box<dyn TownListener>,
        reply: oneshot::Sender<ListenerId>,
    },
    RemoveListener {
        listener_id: ListenerId,
    },
    UpdateLocation {
        player_id: PlayerId,
        location: Location,
    },
    Disconnect {
        listener_id: ListenerId,
        session_token: String,
    },
    UpdateMetadata {
        password: String,
        friendly_name: Option<String>,
        is_public: Option<bool>,
        reply: oneshot::Sender<bool>,
    },
    DisconnectAll,
    Destroy {
        password: String,
        reply: oneshot::Sender<bool>,
    },
    GetInfo {
        reply: oneshot::Sender<TownInfo>,
    },
    GetPlayers {
        reply: oneshot::Sender<Vec<Player>>,
    },
}

// ---------------------------------------------------------------------------
// TownHandle
// ---------------------------------------------------------------------------

/// Handle to a running town actor.
///
/// Cheap to clone. The registry holds the owning handle; connections hold
/// a [`WeakTownHandle`] so they never keep a deleted town reachable.
#[derive(Clone)]
pub struct TownHandle {
    town_id: TownId,
    sender: mpsc::Sender<TownCommand>,
}

impl fmt::Debug for TownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TownHandle")
            .field("town_id", &self.town_id)
            .finish_non_exhaustive()
    }
}

impl TownHandle {
    /// Returns the town's id.
    pub fn town_id(&self) -> &TownId {
        &self.town_id
    }

    /// Returns a non-owning handle to this town.
    pub fn downgrade(&self) -> WeakTownHandle {
        WeakTownHandle {
            town_id: self.town_id.clone(),
            sender: self.sender.downgrade(),
        }
    }

    /// Joins the town as `user_name`.
    ///
    /// Reserves a player and a pending session, fetches a video token from
    /// `video`, then completes the join, which announces the new player to
    /// every registered listener. If the fetch fails the reservation is
    /// rolled back and nobody hears about it.
    ///
    /// # Errors
    /// - [`TownError::Session`]: the video provider failed
    /// - [`TownError::JoinCancelled`]: the town ended the session while
    ///   the video token was being fetched
    /// - [`TownError::Unavailable`]: the town is gone
    pub async fn join<P: VideoTokenProvider>(
        &self,
        user_name: impl Into<String>,
        video: &P,
    ) -> Result<JoinedTown, TownError> {
        let user_name = user_name.into();
        let reservation = self
            .request(|reply| TownCommand::Reserve { user_name, reply })
            .await?;

        // Dropping this future between here and the end rolls the
        // reservation back through the guard.
        let mut pending = PendingJoin {
            sender: self.sender.clone(),
            session_token: Some(reservation.session_token.clone()),
        };

        match video
            .token_for_town(&self.town_id, reservation.player.id)
            .await
        {
            Ok(video_token) => {
                let result = self
                    .request(|reply| TownCommand::CompleteJoin {
                        session_token: reservation.session_token,
                        video_token,
                        reply,
                    })
                    .await?;
                pending.disarm();
                result
            }
            Err(e) => {
                tracing::info!(
                    town_id = %self.town_id,
                    player_id = %reservation.player.id,
                    error = %e,
                    "video provisioning failed, rolling back join"
                );
                self.send(TownCommand::AbortJoin {
                    session_token: reservation.session_token,
                })
                .await?;
                pending.disarm();
                Err(TownError::Session(e))
            }
        }
    }

    /// Binds a live connection to its session and registers `listener`.
    ///
    /// # Errors
    /// [`TownError::AuthFailed`] if the token does not name a live,
    /// not-yet-connected session.
    pub async fn connect(
        &self,
        session_token: &str,
        listener: Box<dyn TownListener>,
    ) -> Result<ConnectedSession, TownError> {
        let session_token = session_token.to_string();
        self.request(|reply| TownCommand::Connect {
            session_token,
            listener,
            reply,
        })
        .await?
    }

    /// Registers a listener that is not bound to any player.
    pub async fn add_listener(
        &self,
        listener: Box<dyn TownListener>,
    ) -> Result<ListenerId, TownError> {
        self.request(|reply| TownCommand::AddListener { listener, reply })
            .await
    }

    /// Deregisters a listener. Unknown ids are ignored.
    pub async fn remove_listener(
        &self,
        listener_id: ListenerId,
    ) -> Result<(), TownError> {
        self.send(TownCommand::RemoveListener { listener_id }).await
    }

    /// Overwrites a player's location and tells everyone else (fire-and-forget).
    pub async fn update_location(
        &self,
        player_id: PlayerId,
        location: Location,
    ) -> Result<(), TownError> {
        self.send(TownCommand::UpdateLocation {
            player_id,
            location,
        })
        .await
    }

    /// Ends a connected session: removes the listener, the player and the
    /// session, and tells the remaining listeners. Repeating it is a no-op.
    pub async fn disconnect(
        &self,
        listener_id: ListenerId,
        session_token: &str,
    ) -> Result<(), TownError> {
        self.send(TownCommand::Disconnect {
            listener_id,
            session_token: session_token.to_string(),
        })
        .await
    }

    /// Renames the town and/or changes its visibility.
    ///
    /// Returns `false`, changing nothing, if the password is wrong or the
    /// new name is blank.
    pub async fn update_metadata(
        &self,
        password: &str,
        friendly_name: Option<String>,
        is_public: Option<bool>,
    ) -> Result<bool, TownError> {
        let password = password.to_string();
        self.request(|reply| TownCommand::UpdateMetadata {
            password,
            friendly_name,
            is_public,
            reply,
        })
        .await
    }

    /// Tells every listener the town is gone and empties the town. The
    /// actor keeps running; use the registry to delete the town.
    pub async fn disconnect_all(&self) -> Result<(), TownError> {
        self.send(TownCommand::DisconnectAll).await
    }

    /// Verifies `password`, then empties the town and stops its actor.
    /// Returns `false`, changing nothing, on a wrong password.
    pub(crate) async fn destroy(&self, password: &str) -> Result<bool, TownError> {
        let password = password.to_string();
        self.request(|reply| TownCommand::Destroy { password, reply })
            .await
    }

    /// Requests the current town metadata.
    pub async fn info(&self) -> Result<TownInfo, TownError> {
        self.request(|reply| TownCommand::GetInfo { reply }).await
    }

    /// Requests every player holding a place, pending joins included,
    /// ordered by id.
    pub async fn players(&self) -> Result<Vec<Player>, TownError> {
        self.request(|reply| TownCommand::GetPlayers { reply }).await
    }

    async fn send(&self, cmd: TownCommand) -> Result<(), TownError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| TownError::Unavailable(self.town_id.clone()))
    }

    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> TownCommand,
    ) -> Result<R, TownError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(make(reply_tx)).await?;
        reply_rx
            .await
            .map_err(|_| TownError::Unavailable(self.town_id.clone()))
    }
}

/// A handle that does not keep the town's command channel open.
#[derive(Clone)]
pub struct WeakTownHandle {
    town_id: TownId,
    sender: mpsc::WeakSender<TownCommand>,
}

impl fmt::Debug for WeakTownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakTownHandle")
            .field("town_id", &self.town_id)
            .finish_non_exhaustive()
    }
}

impl WeakTownHandle {
    /// Returns the town's id.
    pub fn town_id(&self) -> &TownId {
        &self.town_id
    }

    /// Returns a usable handle, or `None` once the town's actor has
    /// stopped and every owning handle is gone.
    pub fn upgrade(&self) -> Option<TownHandle> {
        self.sender.upgrade().map(|sender| TownHandle {
            town_id: self.town_id.clone(),
            sender,
        })
    }
}

/// Rolls back a reserved join if the joining future is dropped before it
/// finishes.
struct PendingJoin {
    sender: mpsc::Sender<TownCommand>,
    session_token: Option<String>,
}

impl PendingJoin {
    fn disarm(&mut self) {
        self.session_token = None;
    }
}

impl Drop for PendingJoin {
    fn drop(&mut self) {
        if let Some(session_token) = self.session_token.take() {
            let sender = self.sender.clone();
            tokio::spawn(async move {
                let _ = sender.send(TownCommand::AbortJoin { session_token }).await;
            });
        }
    }
}

// ---------------------------------------------------------------------------
// TownActor
// ---------------------------------------------------------------------------

struct ListenerEntry {
    id: ListenerId,
    /// The player whose connection this listener represents, if any.
    /// That player's own events are not echoed back to it.
    player_id: Option<PlayerId>,
    listener: Box<dyn TownListener>,
}

/// The internal town state. Runs inside a Tokio task.
struct TownActor {
    town_id: TownId,
    friendly_name: String,
    is_public: bool,
    password: String,
    players: BTreeMap<PlayerId, Player>,
    sessions: SessionStore,
    /// Registration order is notification order.
    listeners: Vec<ListenerEntry>,
    next_player_id: u64,
    next_listener_id: u64,
    receiver: mpsc::Receiver<TownCommand>,
}

impl TownActor {
    /// Runs the actor loop until the town is destroyed or every owning
    /// handle is dropped.
    async fn run(mut self) {
        tracing::info!(town_id = %self.town_id, "town actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                TownCommand::Reserve { user_name, reply } => {
                    let reservation = self.reserve(user_name);
                    if let Err(reservation) = reply.send(reservation) {
                        self.abort_join(&reservation.session_token);
                    }
                }
                TownCommand::CompleteJoin {
                    session_token,
                    video_token,
                    reply,
                } => {
                    let result = self.complete_join(&session_token, video_token);
                    if let Err(Ok(_)) = reply.send(result) {
                        // The joiner is gone but everyone was told; undo
                        // it the same way a disconnect would.
                        self.abort_join(&session_token);
                    }
                }
                TownCommand::AbortJoin { session_token } => {
                    self.abort_join(&session_token);
                }
                TownCommand::Connect {
                    session_token,
                    listener,
                    reply,
                } => {
                    let result = self.connect(&session_token, listener);
                    if let Err(Ok(connected)) = reply.send(result) {
                        self.remove_listener(connected.listener_id);
                    }
                }
                TownCommand::AddListener { listener, reply } => {
                    let listener_id = self.add_listener(None, listener);
                    if reply.send(listener_id).is_err() {
                        self.remove_listener(listener_id);
                    }
                }
                TownCommand::RemoveListener { listener_id } => {
                    self.remove_listener(listener_id);
                }
                TownCommand::UpdateLocation {
                    player_id,
                    location,
                } => {
                    self.update_location(player_id, location);
                }
                TownCommand::Disconnect {
                    listener_id,
                    session_token,
                } => {
                    self.on_disconnect(listener_id, &session_token);
                }
                TownCommand::UpdateMetadata {
                    password,
                    friendly_name,
                    is_public,
                    reply,
                } => {
                    let updated = self.update_metadata(&password, friendly_name, is_public);
                    let _ = reply.send(updated);
                }
                TownCommand::DisconnectAll => {
                    self.disconnect_all();
                }
                TownCommand::Destroy { password, reply } => {
                    if passwords_match(&password, &self.password) {
                        self.disconnect_all();
                        let _ = reply.send(true);
                        tracing::info!(town_id = %self.town_id, "town destroyed");
                        break;
                    }
                    tracing::debug!(town_id = %self.town_id, "destroy rejected");
                    let _ = reply.send(false);
                }
                TownCommand::GetInfo { reply } => {
                    let _ = reply.send(self.info());
                }
                TownCommand::GetPlayers { reply } => {
                    let _ = reply.send(self.players.values().cloned().collect());
                }
            }

            self.check_invariants();
        }

        tracing::info!(town_id = %self.town_id, "town actor stopped");
    }

    fn reserve(&mut self, user_name: String) -> Reservation {
        let player_id = PlayerId(self.next_player_id);
        self.next_player_id += 1;

        let player = Player::new(player_id, user_name);
        self.players.insert(player_id, player.clone());
        let session_token = self.sessions.create(player_id).token.clone();

        tracing::info!(
            town_id = %self.town_id,
            %player_id,
            "player reserved, awaiting video token"
        );
        Reservation {
            session_token,
            player,
        }
    }

    fn complete_join(
        &mut self,
        session_token: &str,
        video_token: String,
    ) -> Result<JoinedTown, TownError> {
        let player_id = match self
            .sessions
            .attach_video_token(session_token, video_token.clone())
        {
            Ok(session) => session.player_id,
            Err(_) => {
                tracing::info!(
                    town_id = %self.town_id,
                    "session ended before its join completed, not announcing"
                );
                return Err(TownError::JoinCancelled(self.town_id.clone()));
            }
        };

        let Some(player) = self.players.get(&player_id).cloned() else {
            tracing::error!(town_id = %self.town_id, %player_id, "session has no player");
            return Err(TownError::JoinCancelled(self.town_id.clone()));
        };

        let mut current_players: Vec<Player> = self
            .sessions
            .iter()
            .filter(|s| !s.is_pending() && s.player_id != player_id)
            .filter_map(|s| self.players.get(&s.player_id).cloned())
            .collect();
        current_players.sort_by_key(|p| p.id);

        for entry in &mut self.listeners {
            entry.listener.on_player_joined(&player);
        }

        tracing::info!(
            town_id = %self.town_id,
            %player_id,
            players = self.players.len(),
            "player joined"
        );

        Ok(JoinedTown {
            session_token: session_token.to_string(),
            player,
            video_token,
            friendly_name: self.friendly_name.clone(),
            is_public: self.is_public,
            current_players,
        })
    }

    fn abort_join(&mut self, session_token: &str) {
        if let Some((session, player)) = self.retire_session(session_token) {
            if !session.is_pending() {
                self.broadcast_disconnected(&player);
            }
            tracing::info!(
                town_id = %self.town_id,
                player_id = %player.id,
                "join rolled back"
            );
        }
    }

    fn connect(
        &mut self,
        session_token: &str,
        listener: Box<dyn TownListener>,
    ) -> Result<ConnectedSession, TownError> {
        let player_id = self
            .sessions
            .authenticate(session_token)
            .map_err(|_| TownError::AuthFailed)?
            .player_id;

        if self
            .listeners
            .iter()
            .any(|entry| entry.player_id == Some(player_id))
        {
            tracing::debug!(
                town_id = %self.town_id,
                %player_id,
                "session already has a live connection"
            );
            return Err(TownError::AuthFailed);
        }

        let player = self
            .players
            .get(&player_id)
            .cloned()
            .ok_or(TownError::AuthFailed)?;
        let listener_id = self.add_listener(Some(player_id), listener);

        Ok(ConnectedSession {
            listener_id,
            player,
        })
    }

    fn add_listener(
        &mut self,
        player_id: Option<PlayerId>,
        listener: Box<dyn TownListener>,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push(ListenerEntry {
            id,
            player_id,
            listener,
        });

        tracing::debug!(
            town_id = %self.town_id,
            listener_id = %id,
            occupancy = self.listeners.len(),
            "listener registered"
        );
        id
    }

    fn remove_listener(&mut self, listener_id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|entry| entry.id != listener_id);
        before != self.listeners.len()
    }

    fn update_location(&mut self, player_id: PlayerId, location: Location) {
        let announced = self.is_announced(player_id);
        let Some(player) = self.players.get_mut(&player_id) else {
            tracing::debug!(
                town_id = %self.town_id,
                %player_id,
                "movement for absent player ignored"
            );
            return;
        };
        player.location = location;

        if !announced {
            return;
        }
        let player = player.clone();
        for entry in self
            .listeners
            .iter_mut()
            .filter(|entry| entry.player_id != Some(player_id))
        {
            entry.listener.on_player_moved(&player);
        }
    }

    fn on_disconnect(&mut self, listener_id: ListenerId, session_token: &str) {
        self.remove_listener(listener_id);

        let Some((_, player)) = self.retire_session(session_token) else {
            tracing::debug!(
                town_id = %self.town_id,
                %listener_id,
                "disconnect for an ended session ignored"
            );
            return;
        };

        self.broadcast_disconnected(&player);
        tracing::info!(
            town_id = %self.town_id,
            player_id = %player.id,
            occupancy = self.listeners.len(),
            "player disconnected"
        );
    }

    fn update_metadata(
        &mut self,
        password: &str,
        friendly_name: Option<String>,
        is_public: Option<bool>,
    ) -> bool {
        if !passwords_match(password, &self.password) {
            tracing::debug!(town_id = %self.town_id, "metadata update rejected: password");
            return false;
        }
        if friendly_name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            tracing::debug!(town_id = %self.town_id, "metadata update rejected: blank name");
            return false;
        }

        if let Some(name) = friendly_name {
            self.friendly_name = name;
        }
        if let Some(is_public) = is_public {
            self.is_public = is_public;
        }
        tracing::info!(
            town_id = %self.town_id,
            friendly_name = %self.friendly_name,
            is_public = self.is_public,
            "town metadata updated"
        );
        true
    }

    fn disconnect_all(&mut self) {
        let listeners = std::mem::take(&mut self.listeners);
        let evicted = listeners.len();
        for mut entry in listeners {
            entry.listener.on_town_destroyed();
        }
        self.sessions.drain();
        self.players.clear();

        tracing::info!(town_id = %self.town_id, evicted, "town emptied");
    }

    fn info(&self) -> TownInfo {
        TownInfo {
            town_id: self.town_id.clone(),
            friendly_name: self.friendly_name.clone(),
            is_public: self.is_public,
            occupancy: self.listeners.len(),
            player_count: self.players.len(),
            session_count: self.sessions.len(),
        }
    }

    /// Removes a session together with its player and any listener bound
    /// to that player.
    fn retire_session(&mut self, session_token: &str) -> Option<(Session, Player)> {
        let session = self.sessions.remove(session_token)?;
        self.listeners
            .retain(|entry| entry.player_id != Some(session.player_id));
        let Some(player) = self.players.remove(&session.player_id) else {
            tracing::error!(
                town_id = %self.town_id,
                player_id = %session.player_id,
                "session has no player"
            );
            return None;
        };
        Some((session, player))
    }

    fn broadcast_disconnected(&mut self, player: &Player) {
        for entry in &mut self.listeners {
            entry.listener.on_player_disconnected(player);
        }
    }

    fn is_announced(&self, player_id: PlayerId) -> bool {
        self.sessions
            .iter()
            .any(|s| s.player_id == player_id && !s.is_pending())
    }

    fn check_invariants(&self) {
        debug_assert_eq!(
            self.players.len(),
            self.sessions.len(),
            "players and sessions out of step in town {}",
            self.town_id
        );
        debug_assert!(
            self.sessions
                .iter()
                .all(|s| self.players.contains_key(&s.player_id)),
            "session without player in town {}",
            self.town_id
        );
    }
}

/// Compares a supplied password against the stored one.
///
/// Always walks the whole stored password and never exits early, so the
/// time taken does not reveal how much of a guess was right.
pub(crate) fn passwords_match(supplied: &str, expected: &str) -> bool {
    let supplied = supplied.as_bytes();
    let expected = expected.as_bytes();

    let mut diff = supplied.len() ^ expected.len();
    for (i, byte) in expected.iter().enumerate() {
        let other = supplied.get(i).copied().unwrap_or(0);
        diff |= usize::from(byte ^ other);
    }
    diff == 0
}

/// Spawns a new town actor task and returns a handle to it.
pub(crate) fn spawn_town(
    town_id: TownId,
    friendly_name: String,
    is_public: bool,
    password: String,
    channel_size: usize,
) -> TownHandle {
    let (tx, rx) = mpsc::channel(channel_size);

    let actor = TownActor {
        town_id: town_id.clone(),
        friendly_name,
        is_public,
        password,
        players: BTreeMap::new(),
        sessions: SessionStore::new(),
        listeners: Vec::new(),
        next_player_id: 1,
        next_listener_id: 1,
        receiver: rx,
    };

    tokio::spawn(actor.run());

    TownHandle { town_id, sender: tx }
}
