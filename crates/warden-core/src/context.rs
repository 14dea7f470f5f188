//! Conversation Context Manager
//!
//! Renders the most recent completed turns of a conversation as a preamble
//! for the current question.

use crate::types::{truncate_chars, ConversationTurn};

/// Number of past turns included in a follow-up prompt.
pub const DEFAULT_LOOKBACK_TURNS: usize = 3;

/// Maximum characters of each past answer included in a follow-up prompt.
pub const DEFAULT_EXCERPT_CHARS: usize = 200;

/// Lookback window over a conversation's turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationWindow {
    max_turns: usize,
    excerpt_chars: usize,
}

impl Default for ConversationWindow {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKBACK_TURNS, DEFAULT_EXCERPT_CHARS)
    }
}

impl ConversationWindow {
    pub fn new(max_turns: usize, excerpt_chars: usize) -> Self {
        Self {
            max_turns,
            excerpt_chars,
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn excerpt_chars(&self) -> usize {
        self.excerpt_chars
    }

    /// Completed turns inside the window, oldest first.
    ///
    /// Turns are ordered by timestamp; equal timestamps keep their input order.
    pub fn select<'a>(&self, turns: &'a [ConversationTurn]) -> Vec<&'a ConversationTurn> {
        let mut eligible: Vec<&ConversationTurn> =
            turns.iter().filter(|turn| turn.is_complete()).collect();
        eligible.sort_by_key(|turn| turn.timestamp);

        let skip = eligible.len().saturating_sub(self.max_turns);
        eligible.split_off(skip)
    }

    /// Render the preamble placed before the current question.
    ///
    /// Returns an empty string when no turn is eligible.
    pub fn preamble(&self, turns: &[ConversationTurn]) -> String {
        let selected = self.select(turns);
        if selected.is_empty() {
            return String::new();
        }

        let mut preamble = String::from("Previous conversation:\n");
        for turn in selected {
            let excerpt = truncate_chars(&turn.response, self.excerpt_chars);
            let ellipsis = if excerpt.len() < turn.response.len() { "..." } else { "" };
            preamble.push_str(&format!("Q: {}\nA: {}{}\n\n", turn.query, excerpt, ellipsis));
        }
        preamble.push_str("Current question:\n");
        preamble
    }
}
