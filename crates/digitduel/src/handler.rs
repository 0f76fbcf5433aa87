//! Per-connection handler: handshake, auth, and request routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → validate version
//!   2. Authenticate token → get Identity
//!   3. Send HandshakeAck, attach the session, resync occupied rooms
//!   4. Loop: receive envelopes and forward room pushes until the
//!      connection closes or goes silent

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use digitduel_protocol::{
    Ack, AckData, Codec, Envelope, Identity, Payload, ProtocolError, Request, ServerEvent,
    SystemMessage, UserId,
};
use digitduel_room::{ConnectionHandle, RoomError, SessionRegistry};
use digitduel_session::Authenticator;
use digitduel_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use crate::DigitDuelError;
use crate::server::{PROTOCOL_VERSION, ServerState};

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Drop guard that detaches the identity when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async work.
struct ConnectionGuard<A: Authenticator, C: Codec> {
    user_id: UserId,
    connection: ConnectionId,
    state: Arc<ServerState<A, C>>,
}

impl<A: Authenticator, C: Codec> Drop for ConnectionGuard<A, C> {
    fn drop(&mut self) {
        let user_id = self.user_id.clone();
        let connection = self.connection;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let detached = state.sessions.lock().await.detach(&user_id, connection);
            let owned_seats = match detached {
                Ok(current) => current,
                Err(err) => {
                    tracing::warn!(
                        %user_id,
                        %connection,
                        %err,
                        "closing connection had no session"
                    );
                    true
                }
            };
            // A superseded connection no longer owns any seat.
            if owned_seats {
                state.registry.disconnect(&user_id, connection).await;
            }
            state.registry.unwatch(&user_id, Some(connection)).await;
        });
    }
}

/// Frames outbound envelopes with a per-connection sequence number.
struct Outbound<'a, C: Codec> {
    conn: &'a WebSocketConnection,
    codec: &'a C,
    seq: u64,
}

impl<'a, C: Codec> Outbound<'a, C> {
    fn new(conn: &'a WebSocketConnection, codec: &'a C) -> Self {
        Self { conn, codec, seq: 0 }
    }

    async fn send(&mut self, payload: Payload) -> Result<(), DigitDuelError> {
        let envelope = Envelope {
            seq: self.seq,
            timestamp: unix_millis(),
            payload,
        };
        self.seq += 1;
        let bytes = self.codec.encode(&envelope)?;
        self.conn.send(&bytes).await?;
        Ok(())
    }

    async fn error(&mut self, code: u16, message: impl Into<String>) -> Result<(), DigitDuelError> {
        self.send(Payload::System(SystemMessage::Error {
            code,
            message: message.into(),
        }))
        .await
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, C>>,
) -> Result<(), DigitDuelError>
where
    A: Authenticator,
    C: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    let mut out = Outbound::new(&conn, &state.codec);
    let identity = match perform_handshake(&conn, &state, &mut out).await {
        Ok(identity) => identity,
        Err(e) => {
            let _ = conn.close().await;
            return Err(e);
        }
    };
    let user_id = identity.user_id.clone();

    let attachment = state.sessions.lock().await.attach(identity.clone(), conn_id);
    let _guard = ConnectionGuard {
        user_id: user_id.clone(),
        connection: conn_id,
        state: Arc::clone(&state),
    };
    if let Some(previous) = attachment.replaced {
        tracing::info!(%user_id, %previous, "newer connection took over session");
    }

    let (tx, mut events) = mpsc::unbounded_channel();
    let link = ConnectionHandle::new(conn_id, tx);
    let resynced = state.registry.reconnect(&user_id, link.clone()).await;
    if !resynced.is_empty() {
        tracing::info!(%user_id, rooms = resynced.len(), "resynced occupied rooms");
    }

    let result = message_loop(&conn, &state, &identity, &link, &mut events, &mut out).await;
    let _ = conn.close().await;
    // _guard drops here → rooms and directory learn the connection is gone.
    result
}

async fn message_loop<A, C>(
    conn: &WebSocketConnection,
    state: &ServerState<A, C>,
    identity: &Identity,
    link: &ConnectionHandle,
    events: &mut mpsc::UnboundedReceiver<ServerEvent>,
    out: &mut Outbound<'_, C>,
) -> Result<(), DigitDuelError>
where
    A: Authenticator,
    C: Codec,
{
    let user_id = &identity.user_id;
    let recv_timeout = state.config.recv_timeout;
    let mut deadline = Instant::now() + recv_timeout;

    loop {
        tokio::select! {
            received = conn.recv() => {
                let data = match received {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%user_id, "connection closed cleanly");
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::debug!(%user_id, error = %e, "recv error");
                        return Ok(());
                    }
                };
                deadline = Instant::now() + recv_timeout;

                let envelope: Envelope = match state.codec.decode(&data) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        tracing::debug!(%user_id, error = %e, "failed to decode envelope");
                        out.error(400, "malformed envelope").await?;
                        continue;
                    }
                };

                match envelope.payload {
                    Payload::System(message) => {
                        if handle_system_message(user_id, message, out).await? {
                            return Ok(());
                        }
                    }
                    Payload::Request { id, request } => {
                        if let Some(ack) = dispatch(&state.registry, identity, link, request).await {
                            out.send(Payload::Ack { id, ack }).await?;
                        }
                    }
                    Payload::Ack { .. } | Payload::Event(_) => {
                        tracing::warn!(%user_id, "client sent a server-only payload");
                        out.error(400, "unexpected payload").await?;
                    }
                }
            }
            Some(event) = events.recv() => {
                out.send(Payload::Event(event)).await?;
            }
            _ = time::sleep_until(deadline) => {
                tracing::info!(%user_id, "connection timed out");
                return Ok(());
            }
        }
    }
}

/// Performs the initial handshake: receive Handshake, validate, auth, send Ack.
async fn perform_handshake<A, C>(
    conn: &WebSocketConnection,
    state: &ServerState<A, C>,
    out: &mut Outbound<'_, C>,
) -> Result<Identity, DigitDuelError>
where
    A: Authenticator,
    C: Codec,
{
    let data = match time::timeout(state.config.handshake_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage(
                "connection closed before handshake".into(),
            )
            .into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let (version, token) = match state.codec.decode::<Envelope>(&data) {
        Ok(Envelope {
            payload: Payload::System(SystemMessage::Handshake { version, token }),
            ..
        }) => (version, token),
        _ => {
            out.error(400, "expected handshake").await?;
            return Err(
                ProtocolError::InvalidMessage("first message must be a handshake".into()).into(),
            );
        }
    };

    if version != PROTOCOL_VERSION {
        out.error(
            400,
            format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
        )
        .await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    let identity = match state.auth.authenticate(token.as_deref().unwrap_or("")).await {
        Ok(identity) => identity,
        Err(e) => {
            out.error(401, "unauthorized").await?;
            return Err(e.into());
        }
    };

    out.send(Payload::System(SystemMessage::HandshakeAck {
        user_id: identity.user_id.clone(),
        display_name: identity.display_name.clone(),
        server_time: unix_millis(),
    }))
    .await?;

    tracing::info!(conn_id = %conn.id(), user_id = %identity.user_id, "client authenticated");
    Ok(identity)
}

/// Handles a system message. Returns `true` if the connection should close.
async fn handle_system_message<C: Codec>(
    user_id: &UserId,
    message: SystemMessage,
    out: &mut Outbound<'_, C>,
) -> Result<bool, DigitDuelError> {
    match message {
        SystemMessage::Heartbeat { client_time } => {
            out.send(Payload::System(SystemMessage::HeartbeatAck {
                client_time,
                server_time: unix_millis(),
            }))
            .await?;
        }
        SystemMessage::Disconnect { reason } => {
            tracing::info!(%user_id, %reason, "client disconnected");
            return Ok(true);
        }
        SystemMessage::Handshake { .. } => {
            out.error(400, "already authenticated").await?;
        }
        _ => {
            tracing::debug!(%user_id, "ignoring unexpected system message");
        }
    }
    Ok(false)
}

/// Routes one request to the registry. `None` means no acknowledgment.
async fn dispatch(
    registry: &SessionRegistry,
    identity: &Identity,
    link: &ConnectionHandle,
    request: Request,
) -> Option<Ack> {
    let user_id = &identity.user_id;
    let acked = request.expects_ack();
    let result: Result<Option<AckData>, RoomError> = match request {
        Request::CreateRoom { mode } => registry
            .create(identity.clone(), mode, link.clone())
            .await
            .map(|room_id| Some(AckData::RoomCreated { room_id })),
        Request::JoinRoom { room_id } => registry
            .join(&room_id, identity.clone(), link.clone())
            .await
            .map(|snapshot| {
                Some(AckData::RoomJoined {
                    room_id: snapshot.room_id,
                    host_name: snapshot.host_name.unwrap_or_default(),
                    players: snapshot.players.len(),
                    max_players: snapshot.max_players,
                })
            }),
        Request::SubmitSecret { room_id, value } => registry
            .submit_secret(&room_id, user_id, &value)
            .await
            .map(|()| None),
        Request::SubmitGuess { room_id, value } => registry
            .submit_guess(&room_id, user_id, &value)
            .await
            .map(|feedback| Some(AckData::GuessAccepted { feedback })),
        Request::LeaveRoom { room_id } => registry.leave(&room_id, user_id).await.map(|()| None),
        Request::CheckRoomStatus { room_id } => registry
            .check_status(&room_id)
            .await
            .map(|is_ready| Some(AckData::RoomStatus { is_ready })),
        Request::ListAvailableRooms => Ok(Some(AckData::RoomList {
            rooms: registry.list_available(user_id).await,
        })),
        Request::ListMyRooms => Ok(Some(AckData::MyRooms {
            listing: registry.list(user_id).await,
        })),
        Request::GetSnapshot { room_id } => registry
            .snapshot(&room_id, user_id)
            .await
            .map(|snapshot| Some(AckData::Snapshot { snapshot })),
        Request::WatchRooms { enabled } => {
            if enabled {
                registry.watch(user_id.clone(), link.clone()).await;
            } else {
                registry.unwatch(user_id, Some(link.id())).await;
            }
            Ok(None)
        }
        Request::Typing {
            room_id,
            is_typing,
            current_input,
        } => registry
            .typing(&room_id, user_id, is_typing, &current_input)
            .await
            .map(|()| None),
    };

    if !acked {
        if let Err(err) = result {
            tracing::debug!(%user_id, %err, "unacknowledged request dropped");
        }
        return None;
    }
    Some(match result {
        Ok(Some(data)) => Ack::with_data(data),
        Ok(None) => Ack::ok(),
        Err(err) => {
            tracing::debug!(%user_id, %err, "request rejected");
            Ack::error(err.kind(), err.to_string())
        }
    })
}
