use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/**
 * \brief Author of a chat message.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/**
 * \brief Chat message as shown to the user.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /** \brief Ordinal id, unique within one conversation. */
    pub id: u64,
    /** \brief Author of the message. */
    pub role: Role,
    /** \brief Message body. */
    pub text: String,
    /** \brief Creation time (RFC 3339 on the wire). */
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/**
 * \brief Request state of a chat view.
 * \details `AwaitingCredential` gates submission until an API key is saved.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Idle,
    Pending,
    AwaitingCredential,
}
