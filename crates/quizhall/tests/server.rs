//! Integration tests for the Quizhall server, handler, and full connection flow.
//!
//! Real listener, real WebSocket clients, short question and grace timings.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use quizhall::prelude::*;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const GRACE: Duration = Duration::from_millis(300);

fn fast_builder() -> QuizhallServerBuilder {
    QuizhallServerBuilder::new()
        .bind("127.0.0.1:0")
        .session_config(SessionConfig {
            reconnect_grace: GRACE,
        })
        .room_config(RoomConfig {
            clock: TickConfig::new(Duration::from_millis(50), 6),
            ..RoomConfig::default()
        })
}

/// Starts a server on a random port and returns the address.
async fn start_server() -> String {
    let server = fast_builder()
        .build(CallerIdentity)
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

fn encode_envelope(envelope: &Envelope) -> Message {
    let text = serde_json::to_string(envelope).expect("encode");
    Message::Text(text.into())
}

fn decode_envelope(msg: Message) -> Envelope {
    serde_json::from_slice(&msg.into_data()).expect("decode")
}

fn request(seq: u64, request: ClientRequest) -> Message {
    encode_envelope(&Envelope {
        seq,
        timestamp: 0,
        reply_to: None,
        payload: Payload::Request(request),
    })
}

fn code() -> RoomCode {
    RoomCode::from("Q1X9")
}

/// A connected, handshaken participant.
struct Client {
    ws: ClientWs,
    seq: u64,
}

impl Client {
    async fn connect(addr: &str, identity: &str) -> Self {
        let mut ws = connect(addr).await;
        ws.send(request(
            0,
            ClientRequest::Handshake {
                version: PROTOCOL_VERSION,
                identity: Some(identity.into()),
            },
        ))
        .await
        .expect("send handshake");
        let mut client = Self { ws, seq: 0 };
        match client.next().await.payload {
            Payload::Event(ServerEvent::HandshakeAck { .. }) => client,
            other => panic!("expected HandshakeAck, got {other:?}"),
        }
    }

    async fn next(&mut self) -> Envelope {
        let msg = tokio::time::timeout(Duration::from_secs(5), self.ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("recv");
        decode_envelope(msg)
    }

    /// Sends a request and returns its sequence number.
    async fn send(&mut self, req: ClientRequest) -> u64 {
        self.seq += 1;
        self.ws.send(request(self.seq, req)).await.expect("send");
        self.seq
    }

    /// Sends a request and waits for the reply to it, skipping broadcasts.
    async fn call(&mut self, req: ClientRequest) -> ServerEvent {
        let seq = self.send(req).await;
        loop {
            let env = self.next().await;
            if env.reply_to == Some(seq) {
                return event(env);
            }
        }
    }

    /// Reads until an event matches `pred`.
    async fn wait_for(&mut self, pred: impl Fn(&ServerEvent) -> bool) -> ServerEvent {
        loop {
            let ev = event(self.next().await);
            if pred(&ev) {
                return ev;
            }
        }
    }

    async fn create(&mut self, name: &str) -> ServerEvent {
        self.call(ClientRequest::CreateRoom {
            display_name: Some(name.into()),
            question_set_id: Some(QuestionSetId::from("General Knowledge")),
            code: Some(code()),
        })
        .await
    }

    async fn join(&mut self, name: &str) -> ServerEvent {
        self.call(ClientRequest::JoinRoom {
            display_name: Some(name.into()),
            code: Some(code()),
        })
        .await
    }
}

fn event(env: Envelope) -> ServerEvent {
    match env.payload {
        Payload::Event(ev) => ev,
        other => panic!("expected an event, got {other:?}"),
    }
}

fn error_kind(ev: &ServerEvent) -> Option<ErrorKind> {
    match ev {
        ServerEvent::Error { kind, .. } => Some(*kind),
        _ => None,
    }
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_handshake_success() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(request(
        7,
        ClientRequest::Handshake {
            version: PROTOCOL_VERSION,
            identity: Some("  ann ".into()),
        },
    ))
    .await
    .expect("send");

    let env = decode_envelope(ws.next().await.unwrap().expect("recv"));
    assert_eq!(env.reply_to, Some(7));
    match env.payload {
        Payload::Event(ServerEvent::HandshakeAck { identity, .. }) => {
            assert_eq!(identity, ParticipantId::from("ann"));
        }
        other => panic!("expected HandshakeAck, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handshake_version_mismatch() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(request(
        0,
        ClientRequest::Handshake {
            version: 999,
            identity: Some("ann".into()),
        },
    ))
    .await
    .expect("send");

    let env = decode_envelope(ws.next().await.unwrap().expect("recv"));
    assert_eq!(error_kind(&event(env)), Some(ErrorKind::Protocol));
}

#[tokio::test]
async fn test_handshake_without_identity_is_rejected() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(request(
        0,
        ClientRequest::Handshake {
            version: PROTOCOL_VERSION,
            identity: None,
        },
    ))
    .await
    .expect("send");

    let env = decode_envelope(ws.next().await.unwrap().expect("recv"));
    assert_eq!(error_kind(&event(env)), Some(ErrorKind::Validation));
}

#[tokio::test]
async fn test_handshake_non_handshake_first_message() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(request(0, ClientRequest::ListQuestionSets))
        .await
        .expect("send");

    let env = decode_envelope(ws.next().await.unwrap().expect("recv"));
    assert_eq!(error_kind(&event(env)), Some(ErrorKind::Protocol));
}

// =========================================================================
// Request handling
// =========================================================================

#[tokio::test]
async fn test_heartbeat_response() {
    let addr = start_server().await;
    let mut ann = Client::connect(&addr, "ann").await;

    match ann.call(ClientRequest::Heartbeat { client_time: 12345 }).await {
        ServerEvent::HeartbeatAck { client_time, .. } => {
            assert_eq!(client_time, 12345);
        }
        other => panic!("expected HeartbeatAck, got {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_envelope_reported_and_connection_kept() {
    let addr = start_server().await;
    let mut ann = Client::connect(&addr, "ann").await;

    ann.ws
        .send(Message::Text("not json".into()))
        .await
        .expect("send");
    let ev = event(ann.next().await);
    assert_eq!(error_kind(&ev), Some(ErrorKind::Protocol));

    // A valid request still works.
    let ev = ann.call(ClientRequest::Heartbeat { client_time: 1 }).await;
    assert!(matches!(ev, ServerEvent::HeartbeatAck { .. }));
}

#[tokio::test]
async fn test_list_question_sets() {
    let addr = start_server().await;
    let mut ann = Client::connect(&addr, "ann").await;

    match ann.call(ClientRequest::ListQuestionSets).await {
        ServerEvent::QuestionSets { sets } => {
            let categories: Vec<_> = sets.iter().map(|s| s.category.as_str()).collect();
            assert_eq!(categories, vec!["General Knowledge", "Science", "History", "Sports"]);
        }
        other => panic!("expected QuestionSets, got {other:?}"),
    }
}

#[tokio::test]
async fn test_room_errors_are_reported_to_requester() {
    let addr = start_server().await;
    let mut ann = Client::connect(&addr, "ann").await;
    let mut bo = Client::connect(&addr, "bo").await;

    let missing = ann.call(ClientRequest::GetRoom { code: code() }).await;
    assert_eq!(error_kind(&missing), Some(ErrorKind::NotFound));

    let invalid = ann
        .call(ClientRequest::CreateRoom {
            display_name: None,
            question_set_id: Some(QuestionSetId::from("Science")),
            code: Some(code()),
        })
        .await;
    assert_eq!(error_kind(&invalid), Some(ErrorKind::Validation));

    assert_eq!(ann.create("Ann").await, ServerEvent::RoomCreated { code: code() });
    let duplicate = bo
        .call(ClientRequest::CreateRoom {
            display_name: Some("Bo".into()),
            question_set_id: Some(QuestionSetId::from("Science")),
            code: Some(code()),
        })
        .await;
    assert_eq!(error_kind(&duplicate), Some(ErrorKind::Conflict));

    let answer = bo
        .call(ClientRequest::SubmitAnswer {
            code: code(),
            question_index: 0,
            response: "Paris".into(),
        })
        .await;
    assert_eq!(error_kind(&answer), Some(ErrorKind::State));

    assert_eq!(bo.join("Bo").await, ServerEvent::RoomJoined { code: code() });
    let start = bo.call(ClientRequest::StartSession { code: code() }).await;
    assert_eq!(error_kind(&start), Some(ErrorKind::Authorization));
}

#[tokio::test]
async fn test_get_room_snapshot() {
    let addr = start_server().await;
    let mut ann = Client::connect(&addr, "ann").await;
    ann.create("Ann").await;

    match ann.call(ClientRequest::GetRoom { code: code() }).await {
        ServerEvent::RoomInfo { room, question_set } => {
            assert_eq!(room.leader, ParticipantId::from("ann"));
            assert_eq!(room.session_state, SessionState::Idle);
            assert_eq!(room.members.len(), 1);
            assert_eq!(question_set.questions.len(), 3);
        }
        other => panic!("expected RoomInfo, got {other:?}"),
    }
}

#[tokio::test]
async fn test_full_quiz_over_websocket() {
    let addr = start_server().await;
    let mut ann = Client::connect(&addr, "ann").await;
    let mut bo = Client::connect(&addr, "bo").await;

    ann.create("Ann").await;
    bo.join("Bo").await;
    match ann.wait_for(|e| matches!(e, ServerEvent::RosterUpdated { .. })).await {
        ServerEvent::RosterUpdated { members, .. } => assert_eq!(members.len(), 2),
        other => panic!("expected roster, got {other:?}"),
    }

    let ack = ann.call(ClientRequest::StartSession { code: code() }).await;
    assert_eq!(ack, ServerEvent::Accepted { code: code() });

    bo.wait_for(|e| matches!(e, ServerEvent::SessionStarted { .. })).await;
    match bo.wait_for(|e| matches!(e, ServerEvent::Question { .. })).await {
        ServerEvent::Question {
            prompt,
            options,
            question_index,
            ..
        } => {
            assert_eq!(prompt, "What is the capital of France?");
            assert_eq!(options.len(), 4);
            assert_eq!(question_index, 0);
        }
        other => panic!("expected question, got {other:?}"),
    }

    let accepted = bo
        .call(ClientRequest::SubmitAnswer {
            code: code(),
            question_index: 0,
            response: "Paris".into(),
        })
        .await;
    assert_eq!(
        accepted,
        ServerEvent::AnswerAccepted {
            code: code(),
            question_index: 0
        }
    );

    let ended = ann
        .wait_for(|e| matches!(e, ServerEvent::SessionEnded { .. }))
        .await;
    match ended {
        ServerEvent::SessionEnded { results, .. } => {
            let scores: Vec<_> = results
                .iter()
                .map(|r| (r.display_name.as_str(), r.correct_count))
                .collect();
            assert_eq!(scores, vec![("Ann", 0), ("Bo", 1)]);
        }
        other => panic!("expected results, got {other:?}"),
    }
}

// =========================================================================
// Reconnect and grace
// =========================================================================

#[tokio::test]
async fn test_reconnect_within_grace_keeps_membership() {
    let addr = start_server().await;
    let mut ann = Client::connect(&addr, "ann").await;
    let mut bo = Client::connect(&addr, "bo").await;
    ann.create("Ann").await;
    bo.join("Bo").await;

    bo.ws.close(None).await.expect("close");
    drop(bo);
    let mut bo = Client::connect(&addr, "bo").await;

    tokio::time::sleep(GRACE * 2).await;
    match ann.call(ClientRequest::GetRoom { code: code() }).await {
        ServerEvent::RoomInfo { room, .. } => {
            let order: Vec<_> = room.members.iter().map(|m| m.identity.as_str()).collect();
            assert_eq!(order, vec!["ann", "bo"]);
        }
        other => panic!("expected RoomInfo, got {other:?}"),
    }

    // Broadcasts reach the new connection.
    ann.call(ClientRequest::RestartSession { code: code() }).await;
    let reset = bo
        .wait_for(|e| matches!(e, ServerEvent::SessionReset { .. }))
        .await;
    assert_eq!(reset, ServerEvent::SessionReset { code: code() });
}

#[tokio::test]
async fn test_grace_expiry_removes_participant() {
    let addr = start_server().await;
    let mut ann = Client::connect(&addr, "ann").await;
    let mut bo = Client::connect(&addr, "bo").await;
    ann.create("Ann").await;
    bo.join("Bo").await;

    bo.ws.close(None).await.expect("close");
    drop(bo);

    let left = ann
        .wait_for(|e| matches!(e, ServerEvent::ParticipantLeft { .. }))
        .await;
    assert_eq!(
        left,
        ServerEvent::ParticipantLeft {
            code: code(),
            message: "Bo has left".into()
        }
    );
    match ann.wait_for(|e| matches!(e, ServerEvent::RosterUpdated { .. })).await {
        ServerEvent::RosterUpdated { members, .. } => assert_eq!(members.len(), 1),
        other => panic!("expected roster, got {other:?}"),
    }
}

#[tokio::test]
async fn test_last_member_expiry_destroys_room() {
    let addr = start_server().await;
    let mut ann = Client::connect(&addr, "ann").await;
    ann.create("Ann").await;

    ann.ws.close(None).await.expect("close");
    drop(ann);
    tokio::time::sleep(GRACE * 3).await;

    let mut bo = Client::connect(&addr, "bo").await;
    let ev = bo.call(ClientRequest::GetRoom { code: code() }).await;
    assert_eq!(error_kind(&ev), Some(ErrorKind::NotFound));
}

#[tokio::test]
async fn test_replaced_connection_cannot_join_rooms() {
    let addr = start_server().await;
    let mut ann = Client::connect(&addr, "ann").await;
    ann.create("Ann").await;

    let mut bo_old = Client::connect(&addr, "bo").await;
    let mut bo = Client::connect(&addr, "bo").await;

    // The first connection is still open but no longer speaks for Bo.
    let join = bo_old.join("Bo").await;
    assert_eq!(error_kind(&join), Some(ErrorKind::State));
    let create = bo_old
        .call(ClientRequest::CreateRoom {
            display_name: Some("Bo".into()),
            question_set_id: Some(QuestionSetId::from("Science")),
            code: Some(RoomCode::from("ZZ99")),
        })
        .await;
    assert_eq!(error_kind(&create), Some(ErrorKind::State));
    let missing = ann.call(ClientRequest::GetRoom { code: RoomCode::from("ZZ99") }).await;
    assert_eq!(error_kind(&missing), Some(ErrorKind::NotFound));

    assert_eq!(bo.join("Bo").await, ServerEvent::RoomJoined { code: code() });

    // Closing the replaced connection starts no grace period; losing the
    // current one still removes Bo.
    bo_old.ws.close(None).await.expect("close");
    drop(bo_old);
    tokio::time::sleep(GRACE * 2).await;
    match ann.call(ClientRequest::GetRoom { code: code() }).await {
        ServerEvent::RoomInfo { room, .. } => assert_eq!(room.members.len(), 2),
        other => panic!("expected RoomInfo, got {other:?}"),
    }

    bo.ws.close(None).await.expect("close");
    drop(bo);
    let left = ann
        .wait_for(|e| matches!(e, ServerEvent::ParticipantLeft { .. }))
        .await;
    assert_eq!(
        left,
        ServerEvent::ParticipantLeft {
            code: code(),
            message: "Bo has left".into()
        }
    );
}

#[tokio::test]
async fn test_disconnect_closes_connection() {
    let addr = start_server().await;
    let mut ann = Client::connect(&addr, "ann").await;

    ann.send(ClientRequest::Disconnect {
        reason: "bye".into(),
    })
    .await;

    // Server should close the connection after Disconnect.
    let result = tokio::time::timeout(Duration::from_secs(2), ann.ws.next()).await;

    match result {
        Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {} // expected
        Ok(Some(Err(_))) => {}                           // also fine
        other => panic!("expected close, got {other:?}"),
    }
}
