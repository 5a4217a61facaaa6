//! Conversation Memory
//!
//! Append-only record of the turns in one session. Only the most recent `window` turns
//! are rendered into prompts; older turns stay stored but are invisible to generation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transcript sentinel for an empty history.
pub const NO_HISTORY: &str = "No previous chat history.";

pub const DEFAULT_HISTORY_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Assistant => write!(f, "Assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ConversationMemory {
    turns: Vec<Turn>,
    window: usize,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

impl ConversationMemory {
    pub fn new(window: usize) -> Self {
        Self {
            turns: Vec::new(),
            window,
        }
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(Turn {
            role,
            content: content.into(),
        });
    }

    /// Record one question and the stringified answer given for it.
    pub fn push_exchange(&mut self, question: &str, answer: &str) {
        self.push(Role::User, question);
        self.push(Role::Assistant, answer);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The last `window` turns.
    pub fn recent(&self) -> &[Turn] {
        let start = self.turns.len().saturating_sub(self.window);
        &self.turns[start..]
    }

    pub fn transcript(&self) -> String {
        let recent = self.recent();
        if recent.is_empty() {
            return NO_HISTORY.to_string();
        }
        recent
            .iter()
            .map(|t| format!("{}: {}", t.role, t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_transcript_sentinel() {
        let memory = ConversationMemory::default();
        assert_eq!(memory.transcript(), NO_HISTORY);
    }

    #[test]
    fn test_window_hides_old_turns_but_keeps_them() {
        let mut memory = ConversationMemory::new(4);
        for i in 0..3 {
            memory.push_exchange(&format!("q{}", i), &format!("a{}", i));
        }
        assert_eq!(memory.len(), 6);
        assert_eq!(memory.recent().len(), 4);
        let transcript = memory.transcript();
        assert!(!transcript.contains("q0"));
        assert!(transcript.starts_with("User: q1\nAssistant: a1"));
    }
}
