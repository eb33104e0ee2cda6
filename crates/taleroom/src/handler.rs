//! Per-connection handler: handshake, then request routing and event
//! delivery.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive `hello` → validate version → send `welcome`
//!   2. Claim the player id for this connection (most recent wins)
//!   3. Loop: inbound frames become engine calls; events from every room
//!      this connection joined are framed and written out

use std::sync::Arc;

use taleroom_protocol::{
    Channel, ClientEvent, Codec, Envelope, ErrorKind, PlayerId, RoomCode, ServerEvent,
    PROTOCOL_VERSION,
};
use taleroom_room::{PlayerSender, RoomOutbound, RoomRequest};
use taleroom_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::server::ServerState;
use crate::{Engine, TaleroomError};

/// Drop guard that releases the player id and starts the grace period in
/// every joined room when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async work.
struct ConnectionGuard {
    player: PlayerId,
    connection: ConnectionId,
    engine: Arc<Engine>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let player = self.player.clone();
        let connection = self.connection;
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            engine.disconnect(&player, connection).await;
        });
    }
}

/// Whether the loop keeps going after a frame.
enum Flow {
    Continue,
    Close,
}

/// Frames outbound events: numbers them and stamps them with the engine
/// clock.
struct Outbox<'a, C: Codec> {
    conn: &'a WebSocketConnection,
    codec: &'a C,
    engine: &'a Engine,
    seq: u64,
}

impl<C: Codec> Outbox<'_, C> {
    async fn send(
        &mut self,
        room: Option<RoomCode>,
        channel: Channel,
        event: ServerEvent,
    ) -> Result<(), TaleroomError> {
        self.seq += 1;
        let envelope = Envelope {
            seq: self.seq,
            timestamp: self.engine.server_time(),
            channel,
            room,
            event,
        };
        let bytes = self.codec.encode(&envelope)?;
        if channel == Channel::Unreliable {
            self.conn.send_unreliable(&bytes).await?;
        } else {
            self.conn.send(&bytes).await?;
        }
        Ok(())
    }

    async fn error(
        &mut self,
        room: Option<RoomCode>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Result<(), TaleroomError> {
        let event = ServerEvent::Error {
            kind,
            message: message.into(),
        };
        self.send(room, Channel::ReliableOrdered, event).await
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), TaleroomError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let engine = Arc::clone(&state.engine);
    let mut outbox = Outbox {
        conn: &conn,
        codec: &state.codec,
        engine: &engine,
        seq: 0,
    };

    // --- Step 1: Handshake ---
    let (player, name) = perform_hello(&conn, &state, &mut outbox).await?;

    // --- Step 2: Claim the player id ---
    let claim = engine.connect(player.clone(), name.clone(), conn_id).await;
    tracing::info!(%conn_id, %player, resumed = claim.resumed, "player connected");
    let _guard = ConnectionGuard {
        player: player.clone(),
        connection: conn_id,
        engine: Arc::clone(&engine),
    };

    // --- Step 3: Message loop ---
    let (tx, mut rx) = mpsc::unbounded_channel::<RoomOutbound>();
    let idle_timeout = engine.config().idle_timeout;
    let idle = tokio::time::sleep(idle_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            frame = conn.recv() => {
                let data = match frame {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%player, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%player, error = %e, "recv error");
                        break;
                    }
                };
                idle.as_mut().reset(Instant::now() + idle_timeout);
                let caller = Caller {
                    engine: &engine,
                    player: &player,
                    name: &name,
                    connection: conn_id,
                    sender: &tx,
                };
                if let Flow::Close = handle_frame(&state.codec, &caller, &mut outbox, &data).await? {
                    break;
                }
            }
            Some(out) = rx.recv() => {
                let replaced = matches!(out.event, ServerEvent::SessionReplaced);
                outbox.send(Some(out.room), out.channel, out.event).await?;
                if replaced {
                    tracing::info!(%player, "connection replaced by a newer one");
                    let _ = conn.close().await;
                    break;
                }
            }
            _ = &mut idle => {
                tracing::info!(%player, "connection timed out");
                break;
            }
        }
    }

    // _guard drops here → engine.disconnect fires.
    Ok(())
}

/// Receives `hello`, checks the protocol version and answers `welcome`.
async fn perform_hello<C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<C>,
    outbox: &mut Outbox<'_, C>,
) -> Result<(PlayerId, String), TaleroomError> {
    let timeout = state.engine.config().hello_timeout;
    let data = match tokio::time::timeout(timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(TaleroomError::Handshake("connection closed before hello".into()));
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(TaleroomError::Handshake("hello timed out".into())),
    };

    let envelope: Envelope<ClientEvent> = match state.codec.decode(&data) {
        Ok(envelope) => envelope,
        Err(e) => {
            outbox.error(None, ErrorKind::Validation, e.to_string()).await?;
            return Err(e.into());
        }
    };

    let ClientEvent::Hello { version, player_id, name } = envelope.event else {
        outbox.error(None, ErrorKind::Validation, "expected hello").await?;
        return Err(TaleroomError::Handshake("first frame must be hello".into()));
    };

    if version != PROTOCOL_VERSION {
        let message = format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}");
        outbox.error(None, ErrorKind::Validation, message.as_str()).await?;
        return Err(TaleroomError::Handshake(message));
    }

    let welcome = ServerEvent::Welcome {
        player_id: player_id.clone(),
        server_time: state.engine.server_time(),
        protocol_version: PROTOCOL_VERSION,
    };
    outbox.send(None, Channel::ReliableOrdered, welcome).await?;
    Ok((player_id, name))
}

/// Who is speaking on this connection.
struct Caller<'a> {
    engine: &'a Engine,
    player: &'a PlayerId,
    name: &'a str,
    connection: ConnectionId,
    sender: &'a PlayerSender,
}

/// Applies one inbound frame. Refusals are answered with an `error`
/// event; only transport failures end the connection.
async fn handle_frame<C: Codec>(
    codec: &C,
    caller: &Caller<'_>,
    outbox: &mut Outbox<'_, C>,
    data: &[u8],
) -> Result<Flow, TaleroomError> {
    let envelope: Envelope<ClientEvent> = match codec.decode(data) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(player = %caller.player, error = %e, "failed to decode envelope");
            outbox.error(None, ErrorKind::Validation, e.to_string()).await?;
            return Ok(Flow::Continue);
        }
    };
    let room = envelope.room;

    let result = match envelope.event {
        ClientEvent::Heartbeat { client_time } => {
            let ack = ServerEvent::HeartbeatAck {
                client_time,
                server_time: caller.engine.server_time(),
            };
            outbox.send(None, Channel::ReliableOrdered, ack).await?;
            return Ok(Flow::Continue);
        }
        ClientEvent::Goodbye { reason } => {
            tracing::info!(player = %caller.player, %reason, "client said goodbye");
            return Ok(Flow::Close);
        }
        ClientEvent::Hello { .. } => {
            outbox.error(None, ErrorKind::Validation, "already greeted").await?;
            return Ok(Flow::Continue);
        }
        // The room's `room-joined` event carries the snapshot; the
        // returned copy is not sent twice.
        ClientEvent::CreateRoom { mode, capacity } => caller
            .engine
            .create_room(
                mode,
                capacity,
                caller.player.clone(),
                caller.name.to_owned(),
                caller.connection,
                caller.sender.clone(),
            )
            .await
            .map(|_| ()),
        ClientEvent::JoinRoom { room_code, name } => {
            let name = name.unwrap_or_else(|| caller.name.to_owned());
            let result = caller
                .engine
                .join_room(
                    &room_code,
                    caller.player.clone(),
                    name,
                    caller.connection,
                    caller.sender.clone(),
                )
                .await
                .map(|_| ());
            return respond(outbox, Some(room_code), result).await;
        }
        event => {
            let Some(code) = room.clone() else {
                outbox
                    .error(None, ErrorKind::Validation, "room-scoped event without a room")
                    .await?;
                return Ok(Flow::Continue);
            };
            match room_request(event) {
                Some(request) => {
                    caller
                        .engine
                        .request(&code, caller.player, caller.connection, request)
                        .await
                }
                None => {
                    caller
                        .engine
                        .leave_room(&code, caller.player, caller.connection)
                        .await
                }
            }
        }
    };
    respond(outbox, room, result).await
}

/// Answers a refused request with an `error` event.
async fn respond<C: Codec>(
    outbox: &mut Outbox<'_, C>,
    room: Option<RoomCode>,
    result: Result<(), TaleroomError>,
) -> Result<Flow, TaleroomError> {
    let Err(e) = result else {
        return Ok(Flow::Continue);
    };
    let kind = e.kind();
    outbox.error(room, kind, e.to_string()).await?;
    // A replaced connection has nothing left to say.
    if kind == ErrorKind::SessionReplaced {
        return Ok(Flow::Close);
    }
    Ok(Flow::Continue)
}

/// Maps a room-scoped client event onto the room's request type.
/// `leave-room` maps to `None`; it is not a request but a membership
/// change.
fn room_request(event: ClientEvent) -> Option<RoomRequest> {
    Some(match event {
        ClientEvent::SelectCharacter { character } => RoomRequest::SelectCharacter(character),
        ClientEvent::ReleaseCharacter => RoomRequest::ReleaseCharacter,
        ClientEvent::StartGame => RoomRequest::StartGame,
        ClientEvent::SubmitChoice { item_id, selection } => {
            RoomRequest::SubmitChoice { item_id, selection }
        }
        ClientEvent::PressBuzzer => RoomRequest::PressBuzzer,
        ClientEvent::SubmitBuzzerAnswer { option } => RoomRequest::SubmitBuzzerAnswer(option),
        ClientEvent::NextQuestion => RoomRequest::NextQuestion,
        ClientEvent::ReturnToLobby => RoomRequest::ReturnToLobby,
        ClientEvent::PlayerMovement { x, y, facing, action } => {
            RoomRequest::Move { x, y, facing, action }
        }
        ClientEvent::RequestSnapshot => RoomRequest::RequestSnapshot,
        ClientEvent::LeaveRoom
        | ClientEvent::Hello { .. }
        | ClientEvent::CreateRoom { .. }
        | ClientEvent::JoinRoom { .. }
        | ClientEvent::Heartbeat { .. }
        | ClientEvent::Goodbye { .. } => return None,
    })
}

#[cfg(test)]
mod tests {
    use taleroom_protocol::{CharacterId, Facing, Selection};

    use super::*;

    #[test]
    fn test_room_scoped_events_map_to_requests() {
        let character = CharacterId::new("wizard_1").unwrap();
        assert_eq!(
            room_request(ClientEvent::SelectCharacter { character: character.clone() }),
            Some(RoomRequest::SelectCharacter(character))
        );
        assert_eq!(
            room_request(ClientEvent::SubmitChoice {
                item_id: Some("gate".into()),
                selection: Selection::Text("Sing".into()),
            }),
            Some(RoomRequest::SubmitChoice {
                item_id: Some("gate".into()),
                selection: Selection::Text("Sing".into()),
            })
        );
        assert_eq!(
            room_request(ClientEvent::PlayerMovement {
                x: 1.0,
                y: 2.0,
                facing: Facing::Left,
                action: "run".into(),
            }),
            Some(RoomRequest::Move { x: 1.0, y: 2.0, facing: Facing::Left, action: "run".into() })
        );
    }

    #[test]
    fn test_leave_and_connection_events_are_not_requests() {
        assert_eq!(room_request(ClientEvent::LeaveRoom), None);
        assert_eq!(room_request(ClientEvent::Heartbeat { client_time: 1 }), None);
    }

    #[test]
    fn test_every_room_scoped_event_but_leave_maps() {
        let events = [
            ClientEvent::ReleaseCharacter,
            ClientEvent::StartGame,
            ClientEvent::PressBuzzer,
            ClientEvent::SubmitBuzzerAnswer { option: 0 },
            ClientEvent::NextQuestion,
            ClientEvent::ReturnToLobby,
            ClientEvent::RequestSnapshot,
        ];
        for event in events {
            assert!(event.is_room_scoped());
            assert!(room_request(event.clone()).is_some(), "{event:?}");
        }
    }
}
