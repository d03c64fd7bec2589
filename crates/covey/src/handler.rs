//! Per-connection handler: control requests, live handshake, event relay.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Loop: receive control requests → answer each one
//!   2. Receive `Handshake` → authenticate against the town
//!   3. Send `HandshakeAck` → the connection is a live occupant
//!   4. Loop: relay town events out, movement and `Disconnect` in
//!
//! A live connection moves through `Unauthenticated → Listening →
//! Terminated`. Terminated is final: the town hears about the disconnect
//! exactly once, however the connection ended.

use std::sync::Arc;
use std::time::Instant;

use covey_protocol::{
    Codec, ControlMessage, Envelope, LiveMessage, Payload, Player, PlayerId, TownId,
};
use covey_session::VideoTokenProvider;
use covey_town::{ListenerId, TownListener, WeakTownHandle};
use covey_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;

use crate::server::ServerState;
use crate::{ControlError, CoveyError};

/// Forwards town events to the connection's writer.
///
/// The town calls this from its own task, so it only queues: the handler
/// loop encodes and sends.
struct ConnectionListener {
    tx: mpsc::UnboundedSender<LiveMessage>,
}

impl ConnectionListener {
    fn forward(&self, msg: LiveMessage) {
        // The receiver is gone once the handler exits; the disconnect that
        // follows removes this listener.
        let _ = self.tx.send(msg);
    }
}

impl TownListener for ConnectionListener {
    fn on_player_joined(&mut self, player: &Player) {
        self.forward(LiveMessage::PlayerJoined {
            player: player.clone(),
        });
    }

    fn on_player_moved(&mut self, player: &Player) {
        self.forward(LiveMessage::PlayerMoved {
            player: player.clone(),
        });
    }

    fn on_player_disconnected(&mut self, player: &Player) {
        self.forward(LiveMessage::PlayerDisconnected {
            player: player.clone(),
        });
    }

    fn on_town_destroyed(&mut self) {
        self.forward(LiveMessage::TownDestroyed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LiveState {
    Listening,
    Terminated,
}

/// An authenticated occupant's binding to its town.
///
/// Ends the session when terminated, or on drop if the handler exits
/// early (error, panic). Since `Drop` is synchronous, the drop path
/// spawns a fire-and-forget task.
struct LiveSession {
    town: WeakTownHandle,
    listener_id: ListenerId,
    session_token: String,
    player_id: PlayerId,
    state: LiveState,
}

impl LiveSession {
    /// Tells the town this occupant left. Only the first call does anything.
    async fn terminate(&mut self) {
        if self.state == LiveState::Terminated {
            return;
        }
        self.state = LiveState::Terminated;

        if let Some(town) = self.town.upgrade() {
            if let Err(e) = town.disconnect(self.listener_id, &self.session_token).await {
                tracing::debug!(player_id = %self.player_id, error = %e, "disconnect not delivered");
            }
        }
    }

    /// The town already removed this occupant (it was destroyed).
    fn evicted(&mut self) {
        self.state = LiveState::Terminated;
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if self.state == LiveState::Terminated {
            return;
        }
        self.state = LiveState::Terminated;

        if let Some(town) = self.town.upgrade() {
            let listener_id = self.listener_id;
            let session_token = std::mem::take(&mut self.session_token);
            tokio::spawn(async move {
                let _ = town.disconnect(listener_id, &session_token).await;
            });
        }
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<P, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<P, C>>,
) -> Result<(), CoveyError>
where
    P: VideoTokenProvider,
    C: Codec,
{
    let conn_id = conn.id();
    let start = Instant::now();
    let mut seq: u64 = 0;
    tracing::debug!(%conn_id, "handling new connection");

    // --- Unauthenticated: control requests until a handshake ---
    let (town_id, session_token) = loop {
        let data = match tokio::time::timeout(state.handshake_timeout, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::debug!(%conn_id, "connection closed before handshake");
                return Ok(());
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                tracing::info!(%conn_id, "handshake timed out");
                conn.close().await?;
                return Ok(());
            }
        };

        let envelope: Envelope = match state.codec.decode(&data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "undecodable request");
                let reply = ControlError::InvalidRequest("malformed frame".into()).to_message();
                send_control(&conn, &state.codec, reply, &mut seq, &start).await?;
                continue;
            }
        };

        match envelope.payload {
            Payload::Control(request) => {
                let reply = state.service.handle(request).await;
                send_control(&conn, &state.codec, reply, &mut seq, &start).await?;
            }
            Payload::Live(LiveMessage::Handshake {
                town_id,
                session_token,
            }) => break (town_id, session_token),
            Payload::Live(_) => {
                tracing::debug!(%conn_id, "live message before handshake");
                conn.close().await?;
                return Ok(());
            }
        }
    };

    // --- Handshake ---
    let Some((mut live, mut events)) = authenticate(&conn, &state, &town_id, &session_token).await?
    else {
        conn.close().await?;
        return Ok(());
    };

    tracing::info!(%conn_id, %town_id, player_id = %live.player_id, "occupant connected");
    send_live(
        &conn,
        &state.codec,
        LiveMessage::HandshakeAck {
            player_id: live.player_id,
        },
        &mut seq,
        &start,
    )
    .await?;

    // --- Listening ---
    loop {
        tokio::select! {
            inbound = conn.recv() => {
                let data = match inbound {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%conn_id, player_id = %live.player_id, "connection closed");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%conn_id, error = %e, "recv error");
                        break;
                    }
                };

                match state.codec.decode::<Envelope>(&data).map(|env| env.payload) {
                    Ok(Payload::Live(LiveMessage::Move { location })) => {
                        let Some(town) = live.town.upgrade() else { break };
                        if town.update_location(live.player_id, location).await.is_err() {
                            break;
                        }
                    }
                    Ok(Payload::Live(LiveMessage::Disconnect { reason })) => {
                        tracing::info!(%conn_id, player_id = %live.player_id, %reason, "client disconnected");
                        break;
                    }
                    Ok(_) | Err(_) => {
                        tracing::debug!(%conn_id, player_id = %live.player_id, "protocol violation, closing");
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Some(LiveMessage::TownDestroyed) => {
                        live.evicted();
                        // Best effort: the socket is being closed either way.
                        let _ = send_live(&conn, &state.codec, LiveMessage::TownDestroyed, &mut seq, &start).await;
                        tracing::info!(%conn_id, %town_id, "town destroyed, closing");
                        break;
                    }
                    Some(msg) => {
                        if let Err(e) = send_live(&conn, &state.codec, msg, &mut seq, &start).await {
                            tracing::debug!(%conn_id, error = %e, "send error");
                            break;
                        }
                    }
                    None => {
                        live.evicted();
                        break;
                    }
                }
            }
        }
    }

    // --- Terminated ---
    live.terminate().await;
    conn.close().await?;
    Ok(())
}

/// Binds the connection to its session and returns the receiving end of
/// its listener. `None` means the credentials were rejected; the caller
/// closes without a reply.
async fn authenticate<P, C>(
    conn: &WebSocketConnection,
    state: &ServerState<P, C>,
    town_id: &TownId,
    session_token: &str,
) -> Result<Option<(LiveSession, mpsc::UnboundedReceiver<LiveMessage>)>, CoveyError>
where
    P: VideoTokenProvider,
    C: Codec,
{
    let conn_id = conn.id();

    let Some(town) = state.service.lookup(town_id).await else {
        tracing::info!(%conn_id, %town_id, "handshake rejected");
        return Ok(None);
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let listener = Box::new(ConnectionListener { tx });
    let connected = match town.connect(session_token, listener).await {
        Ok(connected) => connected,
        Err(e) => {
            tracing::info!(%conn_id, %town_id, error = %e, "handshake rejected");
            return Ok(None);
        }
    };

    let live = LiveSession {
        town: town.downgrade(),
        listener_id: connected.listener_id,
        session_token: session_token.to_string(),
        player_id: connected.player.id,
        state: LiveState::Listening,
    };
    Ok(Some((live, rx)))
}

async fn send_control<C: Codec>(
    conn: &WebSocketConnection,
    codec: &C,
    msg: ControlMessage,
    seq: &mut u64,
    start: &Instant,
) -> Result<(), CoveyError> {
    send_envelope(conn, codec, Payload::Control(msg), seq, start).await
}

async fn send_live<C: Codec>(
    conn: &WebSocketConnection,
    codec: &C,
    msg: LiveMessage,
    seq: &mut u64,
    start: &Instant,
) -> Result<(), CoveyError> {
    send_envelope(conn, codec, Payload::Live(msg), seq, start).await
}

async fn send_envelope<C: Codec>(
    conn: &WebSocketConnection,
    codec: &C,
    payload: Payload,
    seq: &mut u64,
    start: &Instant,
) -> Result<(), CoveyError> {
    let envelope = Envelope {
        seq: next_seq(seq),
        timestamp: start.elapsed().as_millis() as u64,
        payload,
    };
    let bytes = codec.encode(&envelope)?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Returns the current sequence number and advances it.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}
