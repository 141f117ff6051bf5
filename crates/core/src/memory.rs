use crate::models::ConversationTurn;
use tracing::info;

/// Append-only buffer of conversation turns, owned by exactly one
/// chatbot instance (one session). Not persisted across restarts.
#[derive(Debug, Default, Clone)]
pub struct ConversationMemory {
    turns: Vec<ConversationTurn>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Wholesale reset of the session history.
    pub fn clear(&mut self) {
        self.turns.clear();
        info!("conversation memory cleared");
    }
}
