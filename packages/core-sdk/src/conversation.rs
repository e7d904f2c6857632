use time::OffsetDateTime;

use crate::models::{Message, Role};

/** \brief Greeting every new conversation starts with. */
pub const SEED_GREETING: &str =
    "Hello! I'm your FinAI Assistant. How can I help you with your financial questions today?";

/**
 * \brief Append-only message log of one chat view.
 * \details Ids start at 1 for the seed and grow by one per append. There is no
 * eviction; the log lives as long as the view that owns it.
 */
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    next_id: u64,
}

impl Conversation {
    /**
     * \brief New conversation seeded with the default greeting.
     */
    pub fn new() -> Self {
        Self::with_greeting(SEED_GREETING)
    }

    /**
     * \brief New conversation seeded with a custom assistant greeting.
     */
    pub fn with_greeting(greeting: &str) -> Self {
        let mut conversation = Self {
            messages: Vec::new(),
            next_id: 1,
        };
        conversation.append(Role::Assistant, greeting);
        conversation
    }

    /**
     * \brief Append a message at the end and assign it the next id.
     */
    pub fn append(&mut self, role: Role, text: &str) -> &Message {
        let message = Message {
            id: self.next_id,
            role,
            text: text.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.next_id += 1;
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /**
     * \brief Read-only view of the whole log, oldest first.
     */
    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
