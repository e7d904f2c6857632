use std::{fmt, sync::Arc};

use anyhow::Result;
use serde::Serialize;
use thiserror::Error;

use crate::{
    conversation::Conversation,
    credential::CredentialStore,
    llm::{CompletionClient, CompletionFailure},
    models::{Message, RequestState, Role},
    telemetry,
};

/**
 * \brief Assistant text appended whenever a completion fails.
 */
pub const APOLOGY_TEXT: &str = "I'm sorry, I couldn't generate a response right now. \
Please check your Gemini API key and try again.";

/**
 * \brief Why a submit was refused. A refused submit changes nothing.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitRejected {
    #[error("message is empty")]
    EmptyInput,
    #[error("a reply is still pending")]
    Pending,
    #[error("an API key is required")]
    AwaitingCredential,
}

/**
 * \brief Failure to save an API key.
 */
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("API key must not be empty")]
    Empty,
    #[error("failed to store API key: {0:#}")]
    Storage(anyhow::Error),
}

/**
 * \brief How a settled completion ended.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    /** \brief The model's reply was appended. */
    Replied,
    /** \brief The apology was appended and an API key is requested again. */
    Failed,
}

/**
 * \brief A completion request taken out of the controller so it can run unlocked.
 */
pub struct Dispatch<C> {
    client: Arc<C>,
    text: String,
    secret: String,
}

impl<C: CompletionClient> Dispatch<C> {
    /**
     * \brief Perform the call. The result goes back through `ChatController::settle`.
     */
    pub async fn run(self) -> Result<String, CompletionFailure> {
        self.client.complete(&self.text, &self.secret).await
    }
}

impl<C> fmt::Debug for Dispatch<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("text", &self.text)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/**
 * \brief Drives one chat view: user input, completion calls, the message log and
 * the API key gate.
 * \details At most one completion is in flight; submits during `Pending` are
 * refused, not queued. Any completion failure sends the view back to
 * `AwaitingCredential`, so an invalid key and a network outage look the same to
 * the user.
 */
pub struct ChatController<S, C> {
    store: S,
    client: Arc<C>,
    conversation: Conversation,
    state: RequestState,
}

impl<S: CredentialStore, C: CompletionClient> ChatController<S, C> {
    pub fn new(store: S, client: C) -> Self {
        Self::with_client(store, Arc::new(client))
    }

    /**
     * \brief Build a controller sharing `client`; the initial state depends on
     * whether `store` already holds a key.
     */
    pub fn with_client(store: S, client: Arc<C>) -> Self {
        let state = if load_credential(&store).is_some() {
            RequestState::Idle
        } else {
            RequestState::AwaitingCredential
        };
        Self {
            store,
            client,
            conversation: Conversation::new(),
            state,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn snapshot(&self) -> &[Message] {
        self.conversation.snapshot()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /**
     * \brief First half of a submit: validate, append the user message, go `Pending`.
     */
    pub fn begin_submit(&mut self, text: &str) -> Result<Dispatch<C>, SubmitRejected> {
        if text.trim().is_empty() {
            return Err(SubmitRejected::EmptyInput);
        }
        match self.state {
            RequestState::Pending => return Err(SubmitRejected::Pending),
            RequestState::AwaitingCredential => return Err(SubmitRejected::AwaitingCredential),
            RequestState::Idle => {}
        }
        let Some(secret) = load_credential(&self.store) else {
            self.state = RequestState::AwaitingCredential;
            telemetry::log_event("chat.submit", "credential missing, awaiting key");
            return Err(SubmitRejected::AwaitingCredential);
        };

        let id = self.conversation.append(Role::User, text).id;
        self.state = RequestState::Pending;
        telemetry::log_event(
            "chat.submit",
            &format!("message_id={} prompt_len={}", id, text.len()),
        );
        Ok(Dispatch {
            client: Arc::clone(&self.client),
            text: text.to_string(),
            secret,
        })
    }

    /**
     * \brief Second half of a submit: append the reply (or the apology) and leave `Pending`.
     */
    pub fn settle(&mut self, outcome: Result<String, CompletionFailure>) -> SubmitOutcome {
        match outcome {
            Ok(reply) => {
                let id = self.conversation.append(Role::Assistant, &reply).id;
                if self.state == RequestState::Pending {
                    self.state = RequestState::Idle;
                }
                telemetry::log_event(
                    "chat.completion",
                    &format!("message_id={} reply_len={}", id, reply.len()),
                );
                SubmitOutcome::Replied
            }
            Err(failure) => {
                telemetry::log_error("chat.completion", &failure.to_string());
                self.conversation.append(Role::Assistant, APOLOGY_TEXT);
                self.state = RequestState::AwaitingCredential;
                SubmitOutcome::Failed
            }
        }
    }

    /**
     * \brief Submit and wait for the reply.
     */
    pub async fn submit(&mut self, text: &str) -> Result<SubmitOutcome, SubmitRejected> {
        let dispatch = self.begin_submit(text)?;
        let outcome = dispatch.run().await;
        Ok(self.settle(outcome))
    }

    /**
     * \brief Store a new API key. Leaves `AwaitingCredential` for `Idle`; other
     * states are kept.
     */
    pub fn save_credential(&mut self, text: &str) -> Result<(), CredentialError> {
        let key = text.trim();
        if key.is_empty() {
            return Err(CredentialError::Empty);
        }
        self.store.save(key).map_err(CredentialError::Storage)?;
        if self.state == RequestState::AwaitingCredential {
            self.state = RequestState::Idle;
        }
        telemetry::log_event("chat.credential", &format!("saved key_len={}", key.len()));
        Ok(())
    }

    /**
     * \brief Remove the API key and require a new one. The state changes even if
     * the store reports an error.
     */
    pub fn clear_credential(&mut self) -> Result<()> {
        self.state = RequestState::AwaitingCredential;
        telemetry::log_event("chat.credential", "cleared");
        self.store.clear()
    }
}

fn load_credential<S: CredentialStore>(store: &S) -> Option<String> {
    match store.load() {
        Ok(Some(secret)) if !secret.trim().is_empty() => Some(secret),
        Ok(_) => None,
        Err(err) => {
            telemetry::log_error("chat.credential", &format!("load failed: {:#}", err));
            None
        }
    }
}
