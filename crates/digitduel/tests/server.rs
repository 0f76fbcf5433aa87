//! Integration tests for the Digit Duel server, handler, and full connection flow.

use std::collections::VecDeque;
use std::time::Duration;

use digitduel::prelude::*;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const RECV_WAIT: Duration = Duration::from_secs(2);

/// Starts a server on a random port and returns the address.
async fn start_server() -> String {
    start_server_with(RoomConfig::default()).await
}

async fn start_server_with(room_config: RoomConfig) -> String {
    let server = DigitDuelServerBuilder::new()
        .bind("127.0.0.1:0")
        .room_config(room_config)
        .build(TrustedTokenAuthenticator)
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

fn encode_envelope(payload: Payload) -> Message {
    let envelope = Envelope {
        seq: 0,
        timestamp: 0,
        payload,
    };
    Message::Binary(JsonCodec.encode(&envelope).unwrap().into())
}

fn decode_envelope(msg: Message) -> Envelope {
    JsonCodec.decode(&msg.into_data()).expect("should decode")
}

fn handshake(version: u32, token: &str) -> Payload {
    Payload::System(SystemMessage::Handshake {
        version,
        token: Some(token.to_string()),
    })
}

async fn next_envelope(ws: &mut ClientWs) -> Envelope {
    let msg = tokio::time::timeout(RECV_WAIT, ws.next())
        .await
        .expect("should receive in time")
        .expect("stream should not end")
        .expect("frame should be valid");
    decode_envelope(msg)
}

/// An authenticated client. Pushed events that arrive while waiting for an
/// acknowledgment are buffered so tests can assert on them afterwards.
struct Client {
    ws: ClientWs,
    next_id: u64,
    events: VecDeque<ServerEvent>,
}

impl Client {
    async fn connect(addr: &str, token: &str) -> Self {
        let mut ws = connect(addr).await;
        ws.send(encode_envelope(handshake(PROTOCOL_VERSION, token)))
            .await
            .unwrap();
        let ack = next_envelope(&mut ws).await;
        assert!(
            matches!(
                ack.payload,
                Payload::System(SystemMessage::HandshakeAck { .. })
            ),
            "expected HandshakeAck, got {:?}",
            ack.payload
        );
        Self {
            ws,
            next_id: 1,
            events: VecDeque::new(),
        }
    }

    async fn send(&mut self, payload: Payload) {
        self.ws.send(encode_envelope(payload)).await.unwrap();
    }

    /// Sends a request and waits for its acknowledgment.
    async fn request(&mut self, request: Request) -> Ack {
        let id = self.next_id;
        self.next_id += 1;
        self.send(Payload::Request { id, request }).await;
        loop {
            match next_envelope(&mut self.ws).await.payload {
                Payload::Ack { id: acked, ack } if acked == id => return ack,
                Payload::Event(event) => self.events.push_back(event),
                other => panic!("unexpected payload while awaiting ack: {other:?}"),
            }
        }
    }

    async fn request_ok(&mut self, request: Request) -> Option<AckData> {
        let ack = self.request(request).await;
        assert!(ack.success, "request failed: {:?}", ack.error);
        ack.data
    }

    async fn next_event(&mut self) -> ServerEvent {
        if let Some(event) = self.events.pop_front() {
            return event;
        }
        loop {
            match next_envelope(&mut self.ws).await.payload {
                Payload::Event(event) => return event,
                other => panic!("unexpected payload while awaiting event: {other:?}"),
            }
        }
    }

    /// Skips events until one matches.
    async fn expect_event(&mut self, mut pred: impl FnMut(&ServerEvent) -> bool) -> ServerEvent {
        loop {
            let event = self.next_event().await;
            if pred(&event) {
                return event;
            }
        }
    }

    async fn create_room(&mut self, mode: GameMode) -> RoomId {
        match self.request_ok(Request::CreateRoom { mode }).await {
            Some(AckData::RoomCreated { room_id }) => room_id,
            other => panic!("expected RoomCreated, got {other:?}"),
        }
    }
}

/// Two clients seated in the same room with secrets set; ada moves first.
async fn started_game(addr: &str) -> (Client, Client, RoomId) {
    let mut ada = Client::connect(addr, "ada:Ada").await;
    let mut bob = Client::connect(addr, "bob:Bob").await;
    let room_id = ada.create_room(GameMode::Standard).await;
    bob.request_ok(Request::JoinRoom {
        room_id: room_id.clone(),
    })
    .await;
    ada.request_ok(Request::SubmitSecret {
        room_id: room_id.clone(),
        value: "12345".into(),
    })
    .await;
    bob.request_ok(Request::SubmitSecret {
        room_id: room_id.clone(),
        value: "67890".into(),
    })
    .await;
    for client in [&mut ada, &mut bob] {
        client
            .expect_event(|e| matches!(e, ServerEvent::GameStarted { .. }))
            .await;
    }
    (ada, bob, room_id)
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_handshake_returns_identity() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(encode_envelope(handshake(PROTOCOL_VERSION, "u-42:Grace")))
        .await
        .unwrap();

    let env = next_envelope(&mut ws).await;
    match env.payload {
        Payload::System(SystemMessage::HandshakeAck {
            user_id,
            display_name,
            ..
        }) => {
            assert_eq!(user_id, UserId::new("u-42"));
            assert_eq!(display_name, "Grace");
        }
        other => panic!("expected HandshakeAck, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handshake_version_mismatch_returns_400() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(encode_envelope(handshake(999, "ada")))
        .await
        .unwrap();

    let env = next_envelope(&mut ws).await;
    assert!(matches!(
        env.payload,
        Payload::System(SystemMessage::Error { code: 400, .. })
    ));
}

#[tokio::test]
async fn test_handshake_bad_token_returns_401() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(encode_envelope(handshake(PROTOCOL_VERSION, "two words")))
        .await
        .unwrap();

    let env = next_envelope(&mut ws).await;
    assert!(matches!(
        env.payload,
        Payload::System(SystemMessage::Error { code: 401, .. })
    ));
}

#[tokio::test]
async fn test_first_frame_not_handshake_returns_400() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(encode_envelope(Payload::Request {
        id: 1,
        request: Request::ListMyRooms,
    }))
    .await
    .unwrap();

    let env = next_envelope(&mut ws).await;
    assert!(matches!(
        env.payload,
        Payload::System(SystemMessage::Error { code: 400, .. })
    ));
}

#[tokio::test]
async fn test_handshake_accepts_camel_case_json_text_frame() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let raw = serde_json::json!({
        "seq": 0,
        "timestamp": 0,
        "payload": {
            "type": "system",
            "data": { "type": "handshake", "version": PROTOCOL_VERSION, "token": "cy:Cy" }
        }
    });
    ws.send(Message::Text(raw.to_string().into())).await.unwrap();

    let env = next_envelope(&mut ws).await;
    assert!(matches!(
        env.payload,
        Payload::System(SystemMessage::HandshakeAck { .. })
    ));
}

// =========================================================================
// Connection plumbing
// =========================================================================

#[tokio::test]
async fn test_heartbeat_echoes_client_time() {
    let addr = start_server().await;
    let mut client = Client::connect(&addr, "ada").await;

    client
        .send(Payload::System(SystemMessage::Heartbeat { client_time: 1234 }))
        .await;

    let env = next_envelope(&mut client.ws).await;
    match env.payload {
        Payload::System(SystemMessage::HeartbeatAck { client_time, .. }) => {
            assert_eq!(client_time, 1234);
        }
        other => panic!("expected HeartbeatAck, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_envelope_returns_400_and_connection_survives() {
    let addr = start_server().await;
    let mut client = Client::connect(&addr, "ada").await;

    client
        .ws
        .send(Message::Binary(b"not json".to_vec().into()))
        .await
        .unwrap();
    let env = next_envelope(&mut client.ws).await;
    assert!(matches!(
        env.payload,
        Payload::System(SystemMessage::Error { code: 400, .. })
    ));

    let data = client.request_ok(Request::ListMyRooms).await;
    assert!(matches!(data, Some(AckData::MyRooms { .. })));
}

#[tokio::test]
async fn test_client_disconnect_closes_connection() {
    let addr = start_server().await;
    let mut client = Client::connect(&addr, "ada").await;

    client
        .send(Payload::System(SystemMessage::Disconnect {
            reason: "bye".into(),
        }))
        .await;

    let next = tokio::time::timeout(RECV_WAIT, client.ws.next())
        .await
        .expect("server should close promptly");
    assert!(
        matches!(next, None | Some(Ok(Message::Close(_))) | Some(Err(_))),
        "expected close, got {next:?}"
    );
}

#[tokio::test]
async fn test_server_sequence_numbers_increase() {
    let addr = start_server().await;
    let mut client = Client::connect(&addr, "ada").await;

    let mut seqs = Vec::new();
    for t in 0..3 {
        client
            .send(Payload::System(SystemMessage::Heartbeat { client_time: t }))
            .await;
        seqs.push(next_envelope(&mut client.ws).await.seq);
    }
    assert!(seqs.windows(2).all(|w| w[0] < w[1]), "seqs: {seqs:?}");
}

// =========================================================================
// Game flow
// =========================================================================

#[tokio::test]
async fn test_full_game_over_websocket() {
    let addr = start_server().await;
    let mut ada = Client::connect(&addr, "ada:Ada").await;
    let mut bob = Client::connect(&addr, "bob:Bob").await;

    let room_id = ada.create_room(GameMode::Standard).await;
    match bob
        .request_ok(Request::JoinRoom {
            room_id: room_id.clone(),
        })
        .await
    {
        Some(AckData::RoomJoined {
            host_name,
            players,
            max_players,
            ..
        }) => {
            assert_eq!(host_name, "Ada");
            assert_eq!((players, max_players), (2, 2));
        }
        other => panic!("expected RoomJoined, got {other:?}"),
    }

    assert_eq!(
        ada.next_event().await,
        ServerEvent::PlayerJoined {
            room_id: room_id.clone(),
            player_id: UserId::new("bob"),
        }
    );
    assert_eq!(
        ada.next_event().await,
        ServerEvent::RoomReady {
            room_id: room_id.clone()
        }
    );

    let status = ada
        .request_ok(Request::CheckRoomStatus {
            room_id: room_id.clone(),
        })
        .await;
    assert_eq!(status, Some(AckData::RoomStatus { is_ready: true }));

    ada.request_ok(Request::SubmitSecret {
        room_id: room_id.clone(),
        value: "12345".into(),
    })
    .await;
    bob.request_ok(Request::SubmitSecret {
        room_id: room_id.clone(),
        value: "67890".into(),
    })
    .await;
    let started = bob
        .expect_event(|e| matches!(e, ServerEvent::GameStarted { .. }))
        .await;
    assert_eq!(
        started,
        ServerEvent::GameStarted {
            room_id: room_id.clone(),
            current_turn: UserId::new("ada"),
        }
    );

    let feedback = ada
        .request_ok(Request::SubmitGuess {
            room_id: room_id.clone(),
            value: "61111".into(),
        })
        .await;
    assert_eq!(
        feedback,
        Some(AckData::GuessAccepted {
            feedback: Feedback::Standard {
                exact: 1,
                misplaced: 0,
                out_of_place: 4,
            }
        })
    );
    let submitted = bob
        .expect_event(|e| matches!(e, ServerEvent::GuessSubmitted { .. }))
        .await;
    let ServerEvent::GuessSubmitted { guess, .. } = submitted else {
        unreachable!();
    };
    assert_eq!(guess.guess, "61111");
    assert_eq!(guess.player_id, UserId::new("ada"));

    bob.request_ok(Request::SubmitGuess {
        room_id: room_id.clone(),
        value: "54321".into(),
    })
    .await;
    ada.request_ok(Request::SubmitGuess {
        room_id: room_id.clone(),
        value: "67890".into(),
    })
    .await;

    for client in [&mut ada, &mut bob] {
        let ended = client
            .expect_event(|e| matches!(e, ServerEvent::GameEnded { .. }))
            .await;
        assert_eq!(
            ended,
            ServerEvent::GameEnded {
                room_id: room_id.clone(),
                winner: UserId::new("ada"),
                reason: EndReason::Solved,
            }
        );
    }

    match bob
        .request_ok(Request::GetSnapshot {
            room_id: room_id.clone(),
        })
        .await
    {
        Some(AckData::Snapshot { snapshot }) => {
            assert_eq!(snapshot.phase, Phase::Finished);
            assert_eq!(snapshot.guesses.len(), 3);
        }
        other => panic!("expected Snapshot, got {other:?}"),
    }
}

#[tokio::test]
async fn test_hard_mode_guess_returns_total_correct() {
    let addr = start_server().await;
    let mut ada = Client::connect(&addr, "ada").await;
    let mut bob = Client::connect(&addr, "bob").await;
    let room_id = ada.create_room(GameMode::Hard).await;
    bob.request_ok(Request::JoinRoom {
        room_id: room_id.clone(),
    })
    .await;
    ada.request_ok(Request::SubmitSecret {
        room_id: room_id.clone(),
        value: "12345".into(),
    })
    .await;
    bob.request_ok(Request::SubmitSecret {
        room_id: room_id.clone(),
        value: "67890".into(),
    })
    .await;

    let feedback = ada
        .request_ok(Request::SubmitGuess {
            room_id,
            value: "09876".into(),
        })
        .await;
    assert_eq!(
        feedback,
        Some(AckData::GuessAccepted {
            feedback: Feedback::Hard { total_correct: 5 }
        })
    );
}

#[tokio::test]
async fn test_rejected_requests_carry_error_kind() {
    let addr = start_server().await;
    let (mut ada, mut bob, room_id) = started_game(&addr).await;

    let ack = ada
        .request(Request::JoinRoom {
            room_id: RoomId::new("NOPE00"),
        })
        .await;
    assert!(!ack.success);
    assert_eq!(ack.error.map(|e| e.kind), Some(ErrorKind::NotFound));

    let ack = bob
        .request(Request::SubmitGuess {
            room_id: room_id.clone(),
            value: "12345".into(),
        })
        .await;
    assert_eq!(ack.error.map(|e| e.kind), Some(ErrorKind::Turn));

    let ack = ada
        .request(Request::SubmitGuess {
            room_id: room_id.clone(),
            value: "12a45".into(),
        })
        .await;
    assert_eq!(ack.error.map(|e| e.kind), Some(ErrorKind::Validation));

    let mut cy = Client::connect(&addr, "cy").await;
    let ack = cy.request(Request::JoinRoom { room_id }).await;
    assert_eq!(ack.error.map(|e| e.kind), Some(ErrorKind::Capacity));
}

#[tokio::test]
async fn test_leave_during_play_forfeits() {
    let addr = start_server().await;
    let (mut ada, mut bob, room_id) = started_game(&addr).await;

    bob.request_ok(Request::LeaveRoom {
        room_id: room_id.clone(),
    })
    .await;

    let ended = ada
        .expect_event(|e| matches!(e, ServerEvent::GameEnded { .. }))
        .await;
    assert_eq!(
        ended,
        ServerEvent::GameEnded {
            room_id,
            winner: UserId::new("ada"),
            reason: EndReason::Forfeit,
        }
    );
}

// =========================================================================
// Presence and lobby
// =========================================================================

#[tokio::test]
async fn test_typing_is_relayed_without_ack() {
    let addr = start_server().await;
    let (mut ada, mut bob, room_id) = started_game(&addr).await;

    ada.send(Payload::Request {
        id: 77,
        request: Request::Typing {
            room_id: room_id.clone(),
            is_typing: true,
            current_input: "1234567".into(),
        },
    })
    .await;

    let update = bob
        .expect_event(|e| matches!(e, ServerEvent::TypingUpdate { .. }))
        .await;
    assert_eq!(
        update,
        ServerEvent::TypingUpdate {
            room_id,
            is_typing: true,
            current_input: "12345".into(),
        }
    );

    // The next frame ada sees is the heartbeat reply, not an ack for id 77.
    ada.send(Payload::System(SystemMessage::Heartbeat { client_time: 9 }))
        .await;
    let env = next_envelope(&mut ada.ws).await;
    assert!(
        matches!(
            env.payload,
            Payload::System(SystemMessage::HeartbeatAck { client_time: 9, .. })
        ),
        "got {:?}",
        env.payload
    );
}

#[tokio::test]
async fn test_watch_rooms_pushes_listing_updates() {
    let addr = start_server().await;
    let mut lobby = Client::connect(&addr, "viewer").await;
    let mut host = Client::connect(&addr, "ada:Ada").await;

    lobby
        .request_ok(Request::WatchRooms { enabled: true })
        .await;
    let ServerEvent::RoomListing { listing } = lobby.next_event().await else {
        panic!("expected initial listing");
    };
    assert!(listing.available.is_empty());

    let room_id = host.create_room(GameMode::Standard).await;
    let ServerEvent::RoomListing { listing } = lobby
        .expect_event(|e| matches!(e, ServerEvent::RoomListing { .. }))
        .await
    else {
        unreachable!();
    };
    assert_eq!(listing.available.len(), 1);
    assert_eq!(listing.available[0].room_id, room_id);
    assert_eq!(listing.available[0].host_name, "Ada");

    match lobby.request_ok(Request::ListAvailableRooms).await {
        Some(AckData::RoomList { rooms }) => assert_eq!(rooms.len(), 1),
        other => panic!("expected RoomList, got {other:?}"),
    }
}

#[tokio::test]
async fn test_list_my_rooms_partitions_hosted_and_joined() {
    let addr = start_server().await;
    let mut ada = Client::connect(&addr, "ada").await;
    let mut bob = Client::connect(&addr, "bob").await;
    let hosted = ada.create_room(GameMode::Standard).await;
    let other = bob.create_room(GameMode::Hard).await;
    ada.request_ok(Request::JoinRoom {
        room_id: other.clone(),
    })
    .await;

    match ada.request_ok(Request::ListMyRooms).await {
        Some(AckData::MyRooms { listing }) => {
            assert_eq!(listing.hosted.len(), 1);
            assert_eq!(listing.hosted[0].room_id, hosted);
            assert_eq!(listing.joined.len(), 1);
            assert_eq!(listing.joined[0].room_id, other);
        }
        other => panic!("expected MyRooms, got {other:?}"),
    }
}

// =========================================================================
// Reconnection
// =========================================================================

#[tokio::test]
async fn test_reconnect_notifies_opponent_and_pushes_snapshot() {
    let addr = start_server().await;
    let (ada, mut bob, room_id) = started_game(&addr).await;

    drop(ada);
    let lost = bob
        .expect_event(|e| matches!(e, ServerEvent::PlayerDisconnected { .. }))
        .await;
    assert_eq!(
        lost,
        ServerEvent::PlayerDisconnected {
            room_id: room_id.clone(),
            player_id: UserId::new("ada"),
        }
    );

    let mut ada = Client::connect(&addr, "ada:Ada").await;
    let ServerEvent::RoomSnapshot { snapshot } = ada.next_event().await else {
        panic!("expected a snapshot push after reconnecting");
    };
    assert_eq!(snapshot.room_id, room_id);
    assert_eq!(snapshot.phase, Phase::Playing);
    assert_eq!(snapshot.current_turn, Some(UserId::new("ada")));

    let back = bob
        .expect_event(|e| matches!(e, ServerEvent::PlayerReconnected { .. }))
        .await;
    assert_eq!(
        back,
        ServerEvent::PlayerReconnected {
            room_id: room_id.clone(),
            player_id: UserId::new("ada"),
        }
    );

    // Play continues on the new connection.
    ada.request_ok(Request::SubmitGuess {
        room_id,
        value: "11111".into(),
    })
    .await;
}

#[tokio::test]
async fn test_grace_expiry_forfeits_over_websocket() {
    let addr = start_server_with(RoomConfig {
        reconnect_grace: Duration::from_millis(200),
        ..RoomConfig::default()
    })
    .await;
    let (ada, mut bob, room_id) = started_game(&addr).await;

    drop(ada);

    let ended = bob
        .expect_event(|e| matches!(e, ServerEvent::GameEnded { .. }))
        .await;
    assert_eq!(
        ended,
        ServerEvent::GameEnded {
            room_id,
            winner: UserId::new("bob"),
            reason: EndReason::Forfeit,
        }
    );
}
