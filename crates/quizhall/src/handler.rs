//! Per-connection handler: handshake, identity binding, and request routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → validate version and identity
//!   2. Bind the identity to this connection, rebinding its rooms on a
//!      reconnect, and send HandshakeAck
//!   3. Loop: receive envelopes → dispatch requests → reply
//!   4. On exit, start the identity's reconnect grace period
//!
//! Everything the server sends after the handshake goes through one
//! outbound queue per connection, drained by a writer task. Replies and
//! room broadcasts therefore share one ordered stream and one sequence
//! counter.

use std::sync::Arc;
use std::time::Duration;

use quizhall_protocol::{
    ClientRequest, Codec, Envelope, ErrorKind, ParticipantId, Payload,
    ProtocolError, QuestionSet, ServerEvent,
};
use quizhall_room::RoomError;
use quizhall_session::{Authenticator, Delivery, TransportHandle};
use quizhall_transport::{
    Connection, ConnectionId, TransportError, WebSocketConnection,
};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::QuizhallError;
use crate::server::{IDLE_TIMEOUT, PROTOCOL_VERSION, ServerState};

/// How long a new connection has to send its handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Drop guard that starts the grace period when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async lock.
struct SessionGuard<A: Authenticator, C: Codec> {
    identity: ParticipantId,
    conn_id: ConnectionId,
    writer: AbortHandle,
    state: Arc<ServerState<A, C>>,
}

impl<A: Authenticator, C: Codec> Drop for SessionGuard<A, C> {
    fn drop(&mut self) {
        self.writer.abort();

        let identity = self.identity.clone();
        let conn_id = self.conn_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let on_expiry = expire(identity.clone(), conn_id, Arc::clone(&state));
            let mut sessions = state.sessions.lock().await;
            if let Err(e) = sessions.disconnect(&identity, conn_id, on_expiry) {
                tracing::debug!(%identity, %conn_id, error = %e, "no grace period started");
            }
        });
    }
}

/// Runs when a grace period elapses: removes the participant from every
/// room still bound to the lost connection.
async fn expire<A: Authenticator, C: Codec>(
    identity: ParticipantId,
    conn_id: ConnectionId,
    state: Arc<ServerState<A, C>>,
) {
    // Holding the session lock across the room removal keeps a
    // reconnect from binding in between.
    let mut sessions = state.sessions.lock().await;
    if !sessions.expire(&identity, conn_id) {
        return;
    }
    let removed = state
        .rooms
        .lock()
        .await
        .remove_participant(&identity, conn_id)
        .await;
    drop(sessions);

    tracing::info!(%identity, %conn_id, rooms = removed.len(), "participant removed after grace period");
}

/// Whether the read loop should keep going after a request.
enum Flow {
    Continue,
    Close,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, C>>,
) -> Result<(), QuizhallError>
where
    A: Authenticator,
    C: Codec,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    // --- Step 1: Handshake ---
    let (identity, handshake_seq) = perform_handshake(&conn, &state).await?;

    // --- Step 2: Bind ---
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = TransportHandle::new(conn_id, tx);
    let writer = tokio::spawn(write_outbound(
        Arc::clone(&conn),
        Arc::clone(&state),
        rx,
    ));

    let outcome = state
        .sessions
        .lock()
        .await
        .bind(identity.clone(), handle.clone());
    let _guard = SessionGuard {
        identity: identity.clone(),
        conn_id,
        writer: writer.abort_handle(),
        state: Arc::clone(&state),
    };

    handle.reply(
        handshake_seq,
        ServerEvent::HandshakeAck {
            identity: identity.clone(),
            server_time: state.server_time(),
        },
    );
    if outcome.needs_rebind() {
        let rooms = state.rooms.lock().await.rebind(&identity, &handle).await;
        tracing::info!(%identity, %conn_id, rooms, "participant reconnected");
    } else {
        tracing::info!(%identity, %conn_id, "participant connected");
    }

    // --- Step 3: Request loop ---
    loop {
        let data = match tokio::time::timeout(IDLE_TIMEOUT, conn.recv()).await
        {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(%identity, %conn_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%identity, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%identity, %conn_id, "connection timed out");
                break;
            }
        };

        let envelope: Envelope = match state.codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(%identity, error = %e, "failed to decode envelope");
                handle.send(ServerEvent::error(
                    ErrorKind::Protocol,
                    format!("malformed envelope: {e}"),
                ));
                continue;
            }
        };

        let request = match envelope.payload {
            Payload::Request(request) => request,
            Payload::Event(_) => {
                handle.reply(
                    envelope.seq,
                    ServerEvent::error(
                        ErrorKind::Protocol,
                        "clients may only send requests",
                    ),
                );
                continue;
            }
        };

        if let Flow::Close =
            dispatch(&state, &identity, &handle, envelope.seq, request).await
        {
            let _ = conn.close().await;
            break;
        }
    }

    // _guard drops here → grace period starts.
    Ok(())
}

/// Performs the initial handshake: receive Handshake, validate version
/// and identity. Returns the identity and the handshake's sequence number.
async fn perform_handshake<A, C>(
    conn: &WebSocketConnection,
    state: &ServerState<A, C>,
) -> Result<(ParticipantId, u64), QuizhallError>
where
    A: Authenticator,
    C: Codec,
{
    let data = match tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv()).await
    {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(TransportError::ConnectionClosed(
                "closed before handshake".into(),
            )
            .into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage(
                "handshake timed out".into(),
            )
            .into());
        }
    };

    let envelope: Envelope = match state.codec.decode(&data) {
        Ok(env) => env,
        Err(e) => {
            send_direct(conn, state, None, ErrorKind::Protocol, "malformed handshake")
                .await?;
            return Err(e.into());
        }
    };

    let (version, identity) = match envelope.payload {
        Payload::Request(ClientRequest::Handshake { version, identity }) => {
            (version, identity)
        }
        _ => {
            send_direct(
                conn,
                state,
                Some(envelope.seq),
                ErrorKind::Protocol,
                "expected Handshake",
            )
            .await?;
            return Err(ProtocolError::InvalidMessage(
                "first message must be Handshake".into(),
            )
            .into());
        }
    };

    if version != PROTOCOL_VERSION {
        send_direct(
            conn,
            state,
            Some(envelope.seq),
            ErrorKind::Protocol,
            &format!(
                "version mismatch: expected {PROTOCOL_VERSION}, got {version}"
            ),
        )
        .await?;
        return Err(ProtocolError::InvalidMessage(
            "protocol version mismatch".into(),
        )
        .into());
    }

    let identity = match state.auth.authenticate(identity.as_deref()).await {
        Ok(identity) => identity,
        Err(e) => {
            send_direct(
                conn,
                state,
                Some(envelope.seq),
                ErrorKind::Validation,
                &e.to_string(),
            )
            .await?;
            return Err(e.into());
        }
    };

    Ok((identity, envelope.seq))
}

/// Handles one request and queues its reply.
async fn dispatch<A, C>(
    state: &ServerState<A, C>,
    identity: &ParticipantId,
    handle: &TransportHandle,
    seq: u64,
    request: ClientRequest,
) -> Flow
where
    A: Authenticator,
    C: Codec,
{
    let reply = match request {
        ClientRequest::Handshake { .. } => ServerEvent::error(
            ErrorKind::Protocol,
            "handshake already completed",
        ),

        ClientRequest::Heartbeat { client_time } => ServerEvent::HeartbeatAck {
            client_time,
            server_time: state.server_time(),
        },

        ClientRequest::ListQuestionSets => ServerEvent::QuestionSets {
            sets: state.rooms.lock().await.list_question_sets(),
        },

        ClientRequest::GetRoom { code } => {
            let result = state.rooms.lock().await.get_room(&code).await;
            result
                .map(|info| ServerEvent::RoomInfo {
                    room: info.room,
                    question_set: QuestionSet::clone(&info.question_set),
                })
                .unwrap_or_else(|e| room_error(identity, e))
        }

        // Creating or joining stores this connection in the room. The
        // session lock is held until the room has it, so a reconnect
        // cannot slip in between the check and the store.
        ClientRequest::CreateRoom {
            display_name,
            question_set_id,
            code,
        } => {
            let sessions = state.sessions.lock().await;
            if !sessions.is_current(identity, handle.conn_id()) {
                return reply_superseded(identity, handle, seq);
            }
            let result = state.rooms.lock().await.create_room(
                identity.clone(),
                display_name,
                question_set_id,
                code,
                handle.clone(),
            );
            drop(sessions);
            result
                .map(|code| ServerEvent::RoomCreated { code })
                .unwrap_or_else(|e| room_error(identity, e))
        }

        ClientRequest::JoinRoom { display_name, code } => {
            let sessions = state.sessions.lock().await;
            if !sessions.is_current(identity, handle.conn_id()) {
                return reply_superseded(identity, handle, seq);
            }
            let result = state
                .rooms
                .lock()
                .await
                .join_room(identity.clone(), display_name, code, handle.clone())
                .await;
            drop(sessions);
            result
                .map(|(code, _)| ServerEvent::RoomJoined { code })
                .unwrap_or_else(|e| room_error(identity, e))
        }

        ClientRequest::StartSession { code } => {
            let result = state
                .rooms
                .lock()
                .await
                .start_session(identity.clone(), &code)
                .await;
            result
                .map(|_| ServerEvent::Accepted { code })
                .unwrap_or_else(|e| room_error(identity, e))
        }

        ClientRequest::RestartSession { code } => {
            let result = state
                .rooms
                .lock()
                .await
                .restart_session(identity.clone(), &code)
                .await;
            result
                .map(|()| ServerEvent::Accepted { code })
                .unwrap_or_else(|e| room_error(identity, e))
        }

        ClientRequest::SubmitAnswer {
            code,
            question_index,
            response,
        } => {
            let result = state
                .rooms
                .lock()
                .await
                .submit_answer(identity.clone(), &code, question_index, response)
                .await;
            result
                .map(|()| ServerEvent::AnswerAccepted {
                    code,
                    question_index,
                })
                .unwrap_or_else(|e| room_error(identity, e))
        }

        ClientRequest::Disconnect { reason } => {
            tracing::info!(%identity, %reason, "client disconnected");
            return Flow::Close;
        }
    };

    handle.reply(seq, reply);
    Flow::Continue
}

/// Refuses a room request from a connection a newer one has replaced.
fn reply_superseded(
    identity: &ParticipantId,
    handle: &TransportHandle,
    seq: u64,
) -> Flow {
    tracing::debug!(%identity, conn_id = %handle.conn_id(), "request from superseded connection");
    handle.reply(
        seq,
        ServerEvent::error(
            ErrorKind::State,
            format!("{identity} has reconnected on another connection"),
        ),
    );
    Flow::Continue
}

fn room_error(identity: &ParticipantId, err: RoomError) -> ServerEvent {
    tracing::debug!(%identity, error = %err, "request rejected");
    ServerEvent::error(err.kind(), err.to_string())
}

/// Drains a connection's outbound queue onto the socket.
async fn write_outbound<A, C>(
    conn: Arc<WebSocketConnection>,
    state: Arc<ServerState<A, C>>,
    mut rx: mpsc::UnboundedReceiver<Delivery>,
) where
    A: Authenticator,
    C: Codec,
{
    let conn_id = conn.id();
    let mut seq: u64 = 1;

    while let Some(Delivery { reply_to, event }) = rx.recv().await {
        let envelope = Envelope {
            seq: next_seq(&mut seq),
            timestamp: state.server_time(),
            reply_to,
            payload: Payload::Event(event),
        };
        let bytes = match state.codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "failed to encode event");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(%conn_id, error = %e, "send failed, writer stopping");
            break;
        }
    }
}

/// Sends an error straight to the socket. Only used before the outbound
/// queue exists.
async fn send_direct<A, C>(
    conn: &WebSocketConnection,
    state: &ServerState<A, C>,
    reply_to: Option<u64>,
    kind: ErrorKind,
    message: &str,
) -> Result<(), QuizhallError>
where
    A: Authenticator,
    C: Codec,
{
    let envelope = Envelope {
        seq: 0,
        timestamp: state.server_time(),
        reply_to,
        payload: Payload::Event(ServerEvent::error(kind, message)),
    };
    let bytes = state.codec.encode(&envelope)?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}
