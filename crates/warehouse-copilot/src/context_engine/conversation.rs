//! Bounded conversation memory.
//!
//! The last few exchanges are kept in a FIFO ring and rendered as a delimited
//! transcript. The rephrase and generation stages never see this buffer
//! directly; the query processor prepends the rendered text to their context.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// One completed (or abandoned) exchange.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub user_query: String,
    pub sql_query: String,
    pub feedback: String,
    pub succeeded: bool,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(user_query: &str, sql_query: &str, feedback: &str, succeeded: bool) -> Self {
        Self {
            user_query: user_query.to_string(),
            sql_query: sql_query.to_string(),
            feedback: feedback.to_string(),
            succeeded,
            timestamp: Utc::now(),
        }
    }
}

/// FIFO buffer of the last `capacity` turns; the oldest turn is evicted on
/// overflow.
pub struct ConversationMemory {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
}

impl ConversationMemory {
    pub fn new(capacity: usize) -> Self {
        Self { turns: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn record(&mut self, turn: ConversationTurn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    /// Deterministic transcript of the retained turns, oldest first, with
    /// explicit begin/end delimiters. Empty string when there is no history.
    pub fn render(&self) -> String {
        if self.turns.is_empty() {
            return String::new();
        }

        let mut context = String::from("\n--- Previous Conversation History ---\n");
        for (i, turn) in self.turns.iter().enumerate() {
            context.push_str(&format!("\nConversation {}:\n", i + 1));
            context.push_str(&format!("User Query: {}\n", turn.user_query));
            context.push_str(&format!("Generated SQL: {}\n", turn.sql_query));
            if !turn.feedback.is_empty() {
                context.push_str(&format!("User Feedback: {}\n", turn.feedback));
            }
            context.push_str(&format!(
                "Status: {}\n",
                if turn.succeeded { "Successful" } else { "Not completed" }
            ));
            context.push_str(&format!(
                "Time: {}\n",
                turn.timestamp.format("%Y-%m-%d %H:%M:%S")
            ));
        }
        context.push_str("\n--- End of Previous Conversations ---\n\n");
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(n: usize) -> ConversationTurn {
        ConversationTurn::new(&format!("query {n}"), &format!("SELECT {n}"), "", true)
    }

    #[test]
    fn test_capacity_evicts_oldest_first() {
        let mut memory = ConversationMemory::new(5);
        for n in 1..=6 {
            memory.record(turn(n));
        }

        assert_eq!(memory.len(), 5);
        let queries: Vec<&str> = memory.turns().map(|t| t.user_query.as_str()).collect();
        assert_eq!(queries, vec!["query 2", "query 3", "query 4", "query 5", "query 6"]);
    }

    #[test]
    fn test_render_empty_when_no_history() {
        let memory = ConversationMemory::new(5);
        assert_eq!(memory.render(), "");
    }

    #[test]
    fn test_render_is_chronological_and_delimited() {
        let mut memory = ConversationMemory::new(5);
        memory.record(ConversationTurn::new("first", "SELECT 1", "", true));
        memory.record(ConversationTurn::new("second", "SELECT 2", "needs a filter", false));

        let rendered = memory.render();
        assert!(rendered.starts_with("\n--- Previous Conversation History ---"));
        assert!(rendered.contains("--- End of Previous Conversations ---"));
        let first_pos = rendered.find("first").unwrap();
        let second_pos = rendered.find("second").unwrap();
        assert!(first_pos < second_pos);
        assert!(rendered.contains("User Feedback: needs a filter"));
        assert!(rendered.contains("Status: Not completed"));
    }

    #[test]
    fn test_clear() {
        let mut memory = ConversationMemory::new(5);
        memory.record(turn(1));
        memory.clear();
        assert!(memory.is_empty());
        assert_eq!(memory.render(), "");
    }
}
