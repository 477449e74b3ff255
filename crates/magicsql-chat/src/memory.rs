//! Conversation memory.
//!
//! Ordered, session-scoped log of turns. Insertion order is chronological
//! order; consecutive turns with the same role are allowed.

use std::collections::VecDeque;

use magicsql_core::Turn;
use tracing::debug;

// =============================================================================
// ConversationMemory
// =============================================================================

/// In-memory conversation log with an optional turn capacity.
#[derive(Clone, Debug, Default)]
pub struct ConversationMemory {
    turns: VecDeque<Turn>,
    /// Maximum number of turns kept; `None` means unbounded.
    max_turns: Option<usize>,
}

impl ConversationMemory {
    /// Create an unbounded memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory that evicts the oldest turns beyond `max_turns`.
    ///
    /// A capacity of 0 is treated as unbounded.
    pub fn bounded(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_turns: (max_turns > 0).then_some(max_turns),
        }
    }

    pub fn max_turns(&self) -> Option<usize> {
        self.max_turns
    }

    /// Append a turn at the end.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        self.trim();
    }

    /// Clear everything and seed with exactly one turn.
    pub fn reset(&mut self, initial: Turn) {
        self.turns.clear();
        self.turns.push_back(initial);
    }

    /// Snapshot of all turns, oldest first.
    pub fn as_sequence(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.back()
    }

    fn trim(&mut self) {
        let Some(max) = self.max_turns else {
            return;
        };
        let mut evicted = 0usize;
        while self.turns.len() > max {
            self.turns.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            debug!(evicted, kept = self.turns.len(), "Evicted oldest turns");
        }
    }
}
