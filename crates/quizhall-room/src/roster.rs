//! A room's members, their current transports, and the leader.
//!
//! The roster is also the room's fan-out: every broadcast walks the
//! member list and queues the event on each member's current handle.
//! Handles whose writer has gone away are skipped silently; the grace
//! supervisor removes the member later if they don't come back.

use quizhall_protocol::{Participant, ParticipantId, ServerEvent};
use quizhall_session::TransportHandle;
use quizhall_transport::ConnectionId;

#[derive(Debug)]
struct Member {
    participant: Participant,
    handle: TransportHandle,
}

/// What happened to the roster when a member was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Departure {
    pub participant: Participant,
    /// Set when the departing member was the leader and someone else
    /// took over.
    pub new_leader: Option<ParticipantId>,
}

/// Ordered, identity-unique member list. Order is join order.
#[derive(Debug)]
pub(crate) struct Roster {
    members: Vec<Member>,
    leader: ParticipantId,
}

impl Roster {
    /// A roster whose only member is the leader.
    pub fn new(leader: Participant, handle: TransportHandle) -> Self {
        Self {
            leader: leader.identity.clone(),
            members: vec![Member {
                participant: leader,
                handle,
            }],
        }
    }

    pub fn leader(&self) -> &ParticipantId {
        &self.leader
    }

    pub fn is_leader(&self, identity: &ParticipantId) -> bool {
        &self.leader == identity
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, identity: &ParticipantId) -> bool {
        self.position(identity).is_some()
    }

    /// Appends a new member. The caller checks capacity and uniqueness.
    pub fn push(&mut self, participant: Participant, handle: TransportHandle) {
        self.members.push(Member {
            participant,
            handle,
        });
    }

    /// Points `identity` at a new transport. Returns `false` if the
    /// identity is not a member.
    pub fn rebind(&mut self, identity: &ParticipantId, handle: TransportHandle) -> bool {
        match self.position(identity) {
            Some(i) => {
                self.members[i].handle = handle;
                true
            }
            None => false,
        }
    }

    /// Removes `identity` only if it is still bound to `conn_id`.
    ///
    /// If the leader leaves and members remain, leadership passes to the
    /// earliest-joined remaining member.
    pub fn remove_if_bound(
        &mut self,
        identity: &ParticipantId,
        conn_id: ConnectionId,
    ) -> Option<Departure> {
        let i = self.position(identity)?;
        if self.members[i].handle.conn_id() != conn_id {
            return None;
        }
        let member = self.members.remove(i);

        let new_leader = match self.members.first() {
            Some(first) if self.leader == member.participant.identity => {
                self.leader = first.participant.identity.clone();
                Some(self.leader.clone())
            }
            _ => None,
        };

        Some(Departure {
            participant: member.participant,
            new_leader,
        })
    }

    /// Members in join order.
    pub fn participants(&self) -> Vec<Participant> {
        self.members.iter().map(|m| m.participant.clone()).collect()
    }

    /// Queues `event` for every member.
    pub fn broadcast(&self, event: &ServerEvent) {
        for member in &self.members {
            if !member.handle.send(event.clone()) {
                tracing::trace!(
                    identity = %member.participant.identity,
                    conn_id = %member.handle.conn_id(),
                    "dropping event for closed transport"
                );
            }
        }
    }

    /// Queues `event` for one member. Silently drops it for non-members.
    pub fn send_to(&self, identity: &ParticipantId, event: ServerEvent) {
        if let Some(i) = self.position(identity) {
            let _ = self.members[i].handle.send(event);
        }
    }

    fn position(&self, identity: &ParticipantId) -> Option<usize> {
        self.members
            .iter()
            .position(|m| &m.participant.identity == identity)
    }
}
