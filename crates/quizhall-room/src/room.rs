//! Room actor: an isolated Tokio task that owns one quiz room.
//!
//! Each room runs in its own task, communicating with the outside world
//! through an mpsc channel. The task also owns the room's
//! [`QuestionClock`], so commands and timer firings are handled one at a
//! time by the same loop and room state needs no lock.

use std::sync::Arc;

use quizhall_protocol::{
    Participant, ParticipantId, QuestionSet, RoomCode, RoomSnapshot,
    ScoreEntry, ServerEvent, SessionState,
};
use quizhall_session::TransportHandle;
use quizhall_tick::{ClockEvent, QuestionClock};
use quizhall_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};

use crate::roster::Roster;
use crate::scoring::AnswerSheet;
use crate::{RoomConfig, RoomError};

/// How a successful join was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A new member was appended to the roster.
    Joined,
    /// The identity was already a member; only its transport was updated.
    Rejoined,
}

/// How a successful start request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The session moved from Idle to Running.
    Started,
    /// A session was already underway; its state was replayed to the
    /// requester only.
    Replayed,
}

/// Result of a grace-period removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The identity was not a member, or is now bound to another
    /// connection. Nothing changed.
    NotBound,
    /// The member was removed.
    Removed { remaining: usize },
}

/// A snapshot of a room together with its question set.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub room: RoomSnapshot,
    pub question_set: Arc<QuestionSet>,
}

/// Commands sent to a room actor through its channel.
///
/// The `oneshot::Sender` in each variant is a reply channel: the caller
/// sends a command and waits for the response on it.
pub(crate) enum RoomCommand {
    Join {
        participant: Participant,
        handle: TransportHandle,
        reply: oneshot::Sender<Result<JoinOutcome, RoomError>>,
    },

    /// Point an existing member at a new transport.
    Rebind {
        identity: ParticipantId,
        handle: TransportHandle,
        reply: oneshot::Sender<bool>,
    },

    /// Remove a member, but only if still bound to `conn_id`.
    Remove {
        identity: ParticipantId,
        conn_id: ConnectionId,
        reply: oneshot::Sender<RemoveOutcome>,
    },

    Start {
        requester: ParticipantId,
        reply: oneshot::Sender<Result<StartOutcome, RoomError>>,
    },

    Restart {
        requester: ParticipantId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    Submit {
        identity: ParticipantId,
        question_index: usize,
        response: String,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    GetInfo {
        reply: oneshot::Sender<RoomInfo>,
    },

    Shutdown,
}

/// Handle to a running room actor. Used to send commands to it.
///
/// This is cheap to clone: it's just an `mpsc::Sender` wrapper.
/// The `RoomManager` holds one of these per room.
#[derive(Clone)]
pub struct RoomHandle {
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Returns the room's code.
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Adds a participant, or rebinds them if already a member.
    pub async fn join(
        &self,
        participant: Participant,
        handle: TransportHandle,
    ) -> Result<JoinOutcome, RoomError> {
        self.request(|reply| RoomCommand::Join {
            participant,
            handle,
            reply,
        })
        .await?
    }

    /// Replaces a member's transport. Returns `false` for non-members.
    pub async fn rebind(
        &self,
        identity: ParticipantId,
        handle: TransportHandle,
    ) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::Rebind {
            identity,
            handle,
            reply,
        })
        .await
    }

    /// Removes a member if it is still bound to `conn_id`.
    pub async fn remove(
        &self,
        identity: ParticipantId,
        conn_id: ConnectionId,
    ) -> Result<RemoveOutcome, RoomError> {
        self.request(|reply| RoomCommand::Remove {
            identity,
            conn_id,
            reply,
        })
        .await
    }

    /// Starts the session, or replays it to the requester.
    pub async fn start(
        &self,
        requester: ParticipantId,
    ) -> Result<StartOutcome, RoomError> {
        self.request(|reply| RoomCommand::Start { requester, reply })
            .await?
    }

    /// Resets the session to Idle.
    pub async fn restart(
        &self,
        requester: ParticipantId,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Restart { requester, reply })
            .await?
    }

    /// Records an answer.
    pub async fn submit(
        &self,
        identity: ParticipantId,
        question_index: usize,
        response: String,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Submit {
            identity,
            question_index,
            response,
            reply,
        })
        .await?
    }

    /// Requests the current room info.
    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::GetInfo { reply }).await
    }

    /// Tells the room to shut down.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    code: RoomCode,
    config: RoomConfig,
    question_set: Arc<QuestionSet>,
    roster: Roster,
    state: SessionState,
    /// Index of the next question to send. The question on screen is the
    /// one before it.
    current_question_index: usize,
    answers: AnswerSheet,
    /// Scoreboard of the last completed run, kept for replays.
    final_results: Option<Vec<ScoreEntry>>,
    clock: QuestionClock,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    /// Runs the actor loop until shutdown or until every handle is gone.
    async fn run(mut self) {
        tracing::info!(code = %self.code, "room actor started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(RoomCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                event = self.clock.wait() => self.handle_clock(event),
            }
        }

        self.clock.cancel();
        tracing::info!(code = %self.code, "room actor stopped");
    }

    fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join {
                participant,
                handle,
                reply,
            } => {
                let _ = reply.send(self.handle_join(participant, handle));
            }
            RoomCommand::Rebind {
                identity,
                handle,
                reply,
            } => {
                let conn_id = handle.conn_id();
                let rebound = self.roster.rebind(&identity, handle);
                if rebound {
                    tracing::debug!(code = %self.code, %identity, %conn_id, "member rebound");
                }
                let _ = reply.send(rebound);
            }
            RoomCommand::Remove {
                identity,
                conn_id,
                reply,
            } => {
                let _ = reply.send(self.handle_remove(&identity, conn_id));
            }
            RoomCommand::Start { requester, reply } => {
                let _ = reply.send(self.handle_start(&requester));
            }
            RoomCommand::Restart { requester, reply } => {
                let _ = reply.send(self.handle_restart(&requester));
            }
            RoomCommand::Submit {
                identity,
                question_index,
                response,
                reply,
            } => {
                let result =
                    self.handle_submit(&identity, question_index, &response);
                let _ = reply.send(result);
            }
            RoomCommand::GetInfo { reply } => {
                let _ = reply.send(self.info());
            }
            // Handled by the run loop.
            RoomCommand::Shutdown => {}
        }
    }

    fn handle_join(
        &mut self,
        participant: Participant,
        handle: TransportHandle,
    ) -> Result<JoinOutcome, RoomError> {
        let identity = participant.identity.clone();
        let message = format!("{} has joined", participant.display_name);

        // A member joining again keeps its seat and moves to the new connection.
        let outcome = if self.roster.contains(&identity) {
            self.roster.rebind(&identity, handle);
            tracing::info!(code = %self.code, %identity, "member rejoined");
            JoinOutcome::Rejoined
        } else {
            if self.roster.len() >= self.config.max_members {
                return Err(RoomError::RoomFull(self.code.clone()));
            }
            self.roster.push(participant, handle);
            tracing::info!(
                code = %self.code,
                %identity,
                members = self.roster.len(),
                "participant joined"
            );
            JoinOutcome::Joined
        };

        self.roster.broadcast(&ServerEvent::ParticipantJoined {
            code: self.code.clone(),
            message,
        });
        self.roster.broadcast(&self.roster_event());
        Ok(outcome)
    }

    fn handle_remove(
        &mut self,
        identity: &ParticipantId,
        conn_id: ConnectionId,
    ) -> RemoveOutcome {
        let Some(departure) = self.roster.remove_if_bound(identity, conn_id)
        else {
            tracing::debug!(code = %self.code, %identity, %conn_id, "removal skipped, not bound");
            return RemoveOutcome::NotBound;
        };
        self.answers.forget(identity);

        tracing::info!(
            code = %self.code,
            %identity,
            members = self.roster.len(),
            "participant left"
        );

        if self.roster.is_empty() {
            self.clock.cancel();
            return RemoveOutcome::Removed { remaining: 0 };
        }

        self.roster.broadcast(&ServerEvent::ParticipantLeft {
            code: self.code.clone(),
            message: format!("{} has left", departure.participant.display_name),
        });
        if let Some(leader) = departure.new_leader {
            tracing::info!(code = %self.code, %leader, "leadership transferred");
            self.roster.broadcast(&ServerEvent::LeaderChanged {
                code: self.code.clone(),
                leader,
            });
        }
        self.roster.broadcast(&self.roster_event());

        RemoveOutcome::Removed {
            remaining: self.roster.len(),
        }
    }

    fn handle_start(
        &mut self,
        requester: &ParticipantId,
    ) -> Result<StartOutcome, RoomError> {
        if !self.roster.is_leader(requester) {
            return Err(RoomError::NotLeader {
                action: "start the session",
            });
        }

        if self.state.has_started() {
            self.replay(requester);
            return Ok(StartOutcome::Replayed);
        }

        self.transition(SessionState::Running)?;
        self.current_question_index = 0;
        self.answers.clear();
        self.final_results = None;

        tracing::info!(
            code = %self.code,
            questions = self.question_set.len(),
            members = self.roster.len(),
            "session started"
        );
        self.roster.broadcast(&ServerEvent::SessionStarted {
            code: self.code.clone(),
        });
        self.next_question();
        Ok(StartOutcome::Started)
    }

    /// Sends the session's current state to `requester` only. Starts no
    /// timers.
    fn replay(&self, requester: &ParticipantId) {
        tracing::debug!(code = %self.code, %requester, state = %self.state, "replaying session");
        self.roster.send_to(
            requester,
            ServerEvent::SessionStarted {
                code: self.code.clone(),
            },
        );

        if self.state.is_running() {
            let on_screen = self.current_question_index.checked_sub(1);
            if let Some(event) = on_screen.and_then(|i| self.question_event(i)) {
                self.roster.send_to(requester, event);
            }
            if self.clock.is_armed() {
                self.roster.send_to(
                    requester,
                    ServerEvent::Timer {
                        code: self.code.clone(),
                        remaining: self.clock.remaining(),
                    },
                );
            }
        } else if let Some(results) = &self.final_results {
            self.roster.send_to(
                requester,
                ServerEvent::SessionEnded {
                    code: self.code.clone(),
                    results: results.clone(),
                },
            );
        }
    }

    fn handle_restart(
        &mut self,
        requester: &ParticipantId,
    ) -> Result<(), RoomError> {
        if !self.roster.is_leader(requester) {
            return Err(RoomError::NotLeader {
                action: "restart the session",
            });
        }

        self.transition(SessionState::Idle)?;
        self.clock.cancel();
        self.current_question_index = 0;
        self.answers.clear();
        self.final_results = None;

        tracing::info!(code = %self.code, "session reset");
        self.roster.broadcast(&ServerEvent::SessionReset {
            code: self.code.clone(),
        });
        Ok(())
    }

    fn transition(&mut self, target: SessionState) -> Result<(), RoomError> {
        if !self.state.can_transition_to(target) {
            return Err(RoomError::InvalidState(format!(
                "room {} cannot go from {} to {}",
                self.code, self.state, target
            )));
        }
        tracing::debug!(code = %self.code, from = %self.state, to = %target, "session state changed");
        self.state = target;
        Ok(())
    }

    fn handle_submit(
        &mut self,
        identity: &ParticipantId,
        question_index: usize,
        response: &str,
    ) -> Result<(), RoomError> {
        if !self.state.is_running() {
            return Err(RoomError::InvalidState(format!(
                "room {} has no session running",
                self.code
            )));
        }
        if !self.roster.contains(identity) {
            return Err(RoomError::NotMember {
                identity: identity.clone(),
                code: self.code.clone(),
            });
        }
        let question = self.question_set.question(question_index).ok_or_else(|| {
            RoomError::Validation(format!(
                "question index {question_index} is out of range, the set has {}",
                self.question_set.len()
            ))
        })?;

        let correct = question.is_correct(response);
        self.answers.record(identity, question_index, correct);
        tracing::debug!(code = %self.code, %identity, question_index, "answer recorded");
        Ok(())
    }

    fn handle_clock(&mut self, event: ClockEvent) {
        if event.run() != self.clock.run() || !self.state.is_running() {
            tracing::trace!(code = %self.code, run = event.run(), "stale clock event dropped");
            return;
        }

        match event {
            ClockEvent::Tick { remaining, .. } => {
                self.roster.broadcast(&ServerEvent::Timer {
                    code: self.code.clone(),
                    remaining,
                });
            }
            ClockEvent::Elapsed { .. } => self.next_question(),
        }
    }

    /// Broadcasts the question at the current index and arms its
    /// countdown, or ends the session when none are left.
    fn next_question(&mut self) {
        let index = self.current_question_index;
        let Some(event) = self.question_event(index) else {
            self.finish();
            return;
        };

        self.current_question_index += 1;
        self.roster.broadcast(&event);
        let run = self.clock.arm();
        tracing::debug!(code = %self.code, index, run, "question sent");
    }

    fn finish(&mut self) {
        self.clock.cancel();
        if let Err(e) = self.transition(SessionState::Ended) {
            tracing::warn!(code = %self.code, error = %e, "session not finished");
            return;
        }

        let results = self.answers.results(&self.roster.participants());
        tracing::info!(code = %self.code, "session ended");
        self.roster.broadcast(&ServerEvent::SessionEnded {
            code: self.code.clone(),
            results: results.clone(),
        });
        self.final_results = Some(results);
    }

    fn question_event(&self, index: usize) -> Option<ServerEvent> {
        self.question_set
            .question(index)
            .map(|question| ServerEvent::Question {
                code: self.code.clone(),
                prompt: question.prompt.clone(),
                options: question.options.clone(),
                question_index: index,
            })
    }

    fn roster_event(&self) -> ServerEvent {
        ServerEvent::RosterUpdated {
            code: self.code.clone(),
            leader: self.roster.leader().clone(),
            members: self.roster.participants(),
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room: RoomSnapshot {
                code: self.code.clone(),
                leader: self.roster.leader().clone(),
                members: self.roster.participants(),
                question_set_id: self.question_set.id.clone(),
                session_state: self.state,
                current_question_index: self.current_question_index,
                question_count: self.question_set.len(),
            },
            question_set: Arc::clone(&self.question_set),
        }
    }
}

/// Spawns a new room actor with `leader` as its only member and returns
/// a handle to communicate with it.
///
/// `config.channel_size` controls backpressure: if the channel fills up,
/// senders wait (bounded channel).
pub(crate) fn spawn_room(
    code: RoomCode,
    leader: Participant,
    handle: TransportHandle,
    question_set: Arc<QuestionSet>,
    config: RoomConfig,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(config.channel_size.max(1));

    let actor = RoomActor {
        code: code.clone(),
        clock: QuestionClock::new(config.clock.clone()),
        config,
        question_set,
        roster: Roster::new(leader, handle),
        state: SessionState::Idle,
        current_question_index: 0,
        answers: AnswerSheet::default(),
        final_results: None,
        receiver: rx,
    };

    tokio::spawn(actor.run());

    RoomHandle { code, sender: tx }
}
