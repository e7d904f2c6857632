pub mod config;
pub mod controller;
pub mod conversation;
pub mod credential;
pub mod dashboard;
pub mod db;
pub mod llm;
pub mod models;
pub mod server;
pub mod telemetry;

/**
 * \brief Common imports for SDK users.
 */
pub mod prelude {
    pub use crate::config::Settings;
    pub use crate::controller::{ChatController, SubmitOutcome, SubmitRejected};
    pub use crate::credential::{CredentialStore, SqliteCredentialStore};
    pub use crate::llm::{CannedAdvisor, CompletionClient, GeminiClient};
    pub use crate::models::{Message, RequestState, Role};
    pub use crate::{dashboard, server, telemetry};
}
