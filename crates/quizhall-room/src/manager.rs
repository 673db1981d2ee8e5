//! Room manager: creates, tracks, and routes participants to rooms.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use quizhall_protocol::{
    Participant, ParticipantId, QuestionSet, QuestionSetId, RoomCode,
};
use quizhall_session::TransportHandle;
use quizhall_transport::ConnectionId;

use crate::room::spawn_room;
use crate::{
    JoinOutcome, QuestionCatalog, RemoveOutcome, RoomConfig, RoomError,
    RoomHandle, RoomInfo, StartOutcome,
};

/// Manages all active rooms and tracks which participant is in which.
///
/// This is the entry point for room operations from the server. A
/// participant may belong to several rooms at once; the membership index
/// lets rebinds and grace removals visit only the rooms that matter.
pub struct RoomManager {
    /// Active rooms, keyed by code.
    rooms: HashMap<RoomCode, RoomHandle>,

    /// identity → codes of the rooms it is a member of.
    memberships: HashMap<ParticipantId, HashSet<RoomCode>>,

    catalog: Arc<QuestionCatalog>,
    config: RoomConfig,
}

impl RoomManager {
    /// Creates an empty manager serving rooms from `catalog`.
    pub fn new(catalog: Arc<QuestionCatalog>, config: RoomConfig) -> Self {
        Self {
            rooms: HashMap::new(),
            memberships: HashMap::new(),
            catalog,
            config,
        }
    }

    /// Creates a room with `requester` as its leader and sole member.
    ///
    /// # Errors
    /// - [`RoomError::Validation`]: a field is missing or blank
    /// - [`RoomError::QuestionSetNotFound`]: the set is not in the catalog
    /// - [`RoomError::Conflict`]: the code is taken
    pub fn create_room(
        &mut self,
        requester: ParticipantId,
        display_name: Option<String>,
        question_set_id: Option<QuestionSetId>,
        code: Option<RoomCode>,
        handle: TransportHandle,
    ) -> Result<RoomCode, RoomError> {
        let display_name = required(display_name, "display_name")?;
        let set_id = QuestionSetId(required(
            question_set_id.map(|id| id.0),
            "question_set_id",
        )?);
        let code = RoomCode(required(code.map(|c| c.0), "code")?);

        let question_set = self
            .catalog
            .get(&set_id)
            .ok_or(RoomError::QuestionSetNotFound(set_id))?;
        if self.contains_room(&code) {
            return Err(RoomError::Conflict(code));
        }

        let leader = Participant {
            identity: requester.clone(),
            display_name,
            joined_at: unix_millis(),
        };
        let room = spawn_room(
            code.clone(),
            leader,
            handle,
            question_set,
            self.config.clone(),
        );
        self.rooms.insert(code.clone(), room);
        self.link(&requester, &code);

        tracing::info!(%code, leader = %requester, rooms = self.room_count(), "room created");
        Ok(code)
    }

    /// Adds `identity` to a room.
    ///
    /// An identity that is already a member keeps its seat, is rebound to
    /// `handle`, and is reported as [`JoinOutcome::Rejoined`]. Either way
    /// the room gets a join announcement and the roster. Returns the code
    /// of the room joined.
    pub async fn join_room(
        &mut self,
        identity: ParticipantId,
        display_name: Option<String>,
        code: Option<RoomCode>,
        handle: TransportHandle,
    ) -> Result<(RoomCode, JoinOutcome), RoomError> {
        let display_name = required(display_name, "display_name")?;
        let code = RoomCode(required(code.map(|c| c.0), "code")?);

        let room = self
            .rooms
            .get(&code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;

        let participant = Participant {
            identity: identity.clone(),
            display_name,
            joined_at: unix_millis(),
        };
        let outcome = room.join(participant, handle).await?;
        self.link(&identity, &code);
        Ok((code, outcome))
    }

    /// Returns a snapshot of the room and its question set.
    pub async fn get_room(&self, code: &RoomCode) -> Result<RoomInfo, RoomError> {
        self.handle(code)?.info().await
    }

    /// Starts the room's session, or replays it to the requester.
    pub async fn start_session(
        &self,
        requester: ParticipantId,
        code: &RoomCode,
    ) -> Result<StartOutcome, RoomError> {
        self.handle(code)?.start(requester).await
    }

    /// Resets the room's session to Idle.
    pub async fn restart_session(
        &self,
        requester: ParticipantId,
        code: &RoomCode,
    ) -> Result<(), RoomError> {
        self.handle(code)?.restart(requester).await
    }

    /// Records an answer. A missing room is a state error: there is no
    /// session to answer in.
    pub async fn submit_answer(
        &self,
        identity: ParticipantId,
        code: &RoomCode,
        question_index: usize,
        response: String,
    ) -> Result<(), RoomError> {
        let room = self.rooms.get(code).ok_or_else(|| {
            RoomError::InvalidState(format!("room {code} has no session running"))
        })?;
        room.submit(identity, question_index, response).await
    }

    /// Points every room `identity` belongs to at its new transport.
    /// Returns the number of rooms updated.
    pub async fn rebind(
        &self,
        identity: &ParticipantId,
        handle: &TransportHandle,
    ) -> usize {
        let mut updated = 0;
        for code in self.rooms_of(identity) {
            let Some(room) = self.rooms.get(&code) else {
                continue;
            };
            match room.rebind(identity.clone(), handle.clone()).await {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(%code, %identity, error = %err, "rebind failed");
                }
            }
        }
        tracing::debug!(%identity, rooms = updated, "rooms rebound");
        updated
    }

    /// Removes `identity` from every room where it is still bound to
    /// `conn_id`, destroying rooms that become empty. Returns the codes
    /// of the rooms it was removed from.
    pub async fn remove_participant(
        &mut self,
        identity: &ParticipantId,
        conn_id: ConnectionId,
    ) -> Vec<RoomCode> {
        let mut removed = Vec::new();

        for code in self.rooms_of(identity) {
            let Some(room) = self.rooms.get(&code).cloned() else {
                self.unlink(identity, &code);
                continue;
            };

            match room.remove(identity.clone(), conn_id).await {
                Ok(RemoveOutcome::Removed { remaining }) => {
                    self.unlink(identity, &code);
                    if remaining == 0 {
                        let _ = self.destroy_room(&code).await;
                    }
                    removed.push(code);
                }
                Ok(RemoveOutcome::NotBound) => {}
                Err(err) => {
                    tracing::warn!(%code, error = %err, "room stopped responding, dropping it");
                    let _ = self.destroy_room(&code).await;
                }
            }
        }

        removed
    }

    /// Shuts down a room and removes it from the membership index.
    pub async fn destroy_room(&mut self, code: &RoomCode) -> Result<(), RoomError> {
        let room = self
            .rooms
            .remove(code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;

        let _ = room.shutdown().await;

        self.memberships.retain(|_, codes| {
            codes.remove(code);
            !codes.is_empty()
        });

        tracing::info!(%code, rooms = self.room_count(), "room destroyed");
        Ok(())
    }

    /// Every question set in the catalog.
    pub fn list_question_sets(&self) -> Vec<QuestionSet> {
        self.catalog.list()
    }

    /// Codes of the rooms `identity` is a member of.
    pub fn rooms_of(&self, identity: &ParticipantId) -> Vec<RoomCode> {
        self.memberships
            .get(identity)
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns `true` if a room with `code` exists.
    pub fn contains_room(&self, code: &RoomCode) -> bool {
        self.rooms.contains_key(code)
    }

    /// Returns the number of active rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn handle(&self, code: &RoomCode) -> Result<&RoomHandle, RoomError> {
        self.rooms
            .get(code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))
    }

    fn link(&mut self, identity: &ParticipantId, code: &RoomCode) {
        self.memberships
            .entry(identity.clone())
            .or_default()
            .insert(code.clone());
    }

    fn unlink(&mut self, identity: &ParticipantId, code: &RoomCode) {
        if let Some(codes) = self.memberships.get_mut(identity) {
            codes.remove(code);
            if codes.is_empty() {
                self.memberships.remove(identity);
            }
        }
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new(Arc::new(QuestionCatalog::builtin()), RoomConfig::default())
    }
}

/// Trims a required text field, rejecting absent or blank values.
fn required(value: Option<String>, field: &str) -> Result<String, RoomError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(RoomError::Validation(format!("{field} is required"))),
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_trims_and_rejects_blank() {
        assert_eq!(required(Some("  Ann ".into()), "name").unwrap(), "Ann");
        assert!(matches!(
            required(Some("   ".into()), "name"),
            Err(RoomError::Validation(_))
        ));
        assert!(matches!(
            required(None, "name"),
            Err(RoomError::Validation(msg)) if msg == "name is required"
        ));
    }
}
