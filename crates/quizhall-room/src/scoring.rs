//! Answer collection and the final scoreboard.

use std::collections::HashMap;

use quizhall_protocol::{Participant, ParticipantId, ScoreEntry};

/// Every member's latest answer per question index.
///
/// Only correctness is kept; the response text is checked against the
/// question when it arrives.
#[derive(Debug, Default)]
pub(crate) struct AnswerSheet {
    slots: HashMap<ParticipantId, Vec<Option<bool>>>,
}

impl AnswerSheet {
    /// Stores an answer, replacing any earlier one for the same question.
    pub fn record(&mut self, identity: &ParticipantId, question_index: usize, correct: bool) {
        let slots = self.slots.entry(identity.clone()).or_default();
        if slots.len() <= question_index {
            slots.resize(question_index + 1, None);
        }
        slots[question_index] = Some(correct);
    }

    /// Number of questions `identity` currently has right.
    pub fn correct_count(&self, identity: &ParticipantId) -> usize {
        self.slots.get(identity).map_or(0, |slots| {
            slots.iter().flatten().filter(|&&correct| correct).count()
        })
    }

    /// Drops a departed member's answers.
    pub fn forget(&mut self, identity: &ParticipantId) {
        self.slots.remove(identity);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// One scoreboard line per member, in member order.
    pub fn results(&self, members: &[Participant]) -> Vec<ScoreEntry> {
        members
            .iter()
            .map(|p| ScoreEntry {
                identity: p.identity.clone(),
                display_name: p.display_name.clone(),
                correct_count: self.correct_count(&p.identity),
            })
            .collect()
    }
}
