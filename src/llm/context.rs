//! Bounded conversation context
//!
//! A fixed-capacity ring buffer of (role, text) turns used as LLM context.
//! Oldest turns are evicted first; capacity never grows.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatContext {
    turns: VecDeque<(TurnRole, String)>,
    capacity: usize,
}

impl ChatContext {
    pub fn new(capacity: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a turn, evicting the oldest when at capacity.
    pub fn push(&mut self, role: TurnRole, text: impl Into<String>) {
        if self.turns.len() == self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back((role, text.into()));
    }

    /// Oldest-first iteration, the order the model expects.
    pub fn turns(&self) -> impl Iterator<Item = &(TurnRole, String)> {
        self.turns.iter()
    }

    pub fn last(&self) -> Option<&(TurnRole, String)> {
        self.turns.back()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
