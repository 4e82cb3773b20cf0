use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::llm::models::{ChatOptions, Message, Role};
use crate::llm::LlmProvider;
use crate::reading::error::{ReadingError, ReadingResult};
use crate::reading::session::ReadingSession;
use crate::reading::store::{Lookup, SessionStore};

/// How much of the stored transcript goes into each prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextWindow {
    Full,
    /// Only the most recent N history entries.
    Recent(usize),
}

impl ContextWindow {
    pub fn from_limit(limit: Option<usize>) -> Self {
        match limit {
            Some(n) => ContextWindow::Recent(n),
            None => ContextWindow::Full,
        }
    }

    pub fn apply<'a>(&self, history: &'a [Message]) -> &'a [Message] {
        match *self {
            ContextWindow::Full => history,
            ContextWindow::Recent(n) => &history[history.len().saturating_sub(n)..],
        }
    }
}

/// Turns a session transcript into a provider call and records the reply.
pub struct Interpreter {
    llm: Arc<dyn LlmProvider>,
    system_prompt: String,
    window: ContextWindow,
    timeout: Duration,
    options: ChatOptions,
}

impl Interpreter {
    pub fn new(llm: Arc<dyn LlmProvider>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            window: ContextWindow::Full,
            timeout: Duration::from_secs(60),
            options: ChatOptions::default(),
        }
    }

    pub fn with_window(mut self, window: ContextWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    /// Appends the card list and card details to a ready session. These
    /// entries stay in the transcript, so each later interpretation adds
    /// another pair.
    pub fn append_card_summary(session: &mut ReadingSession) -> bool {
        match session.card_summary() {
            Some((list, details)) => {
                session.add_message(Role::System, list);
                session.add_message(Role::System, details);
                true
            }
            None => false,
        }
    }

    /// System instruction followed by the (windowed) transcript.
    pub fn build_prompt(&self, history: &[Message]) -> Vec<Message> {
        let window = self.window.apply(history);
        let mut prompt = Vec::with_capacity(window.len() + 1);
        prompt.push(Message::system(self.system_prompt.clone()));
        prompt.extend_from_slice(window);
        prompt
    }

    /// Single bounded provider call. No retry.
    pub async fn generate(&self, prompt: &[Message]) -> ReadingResult<String> {
        let call = self.llm.chat(prompt, self.options.clone());
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(response)) => {
                if let Some(usage) = &response.usage {
                    info!(
                        "{} replied ({} in / {} out tokens)",
                        response.model, usage.input_tokens, usage.output_tokens
                    );
                }
                Ok(response.content)
            }
            Ok(Err(e)) => {
                warn!("Provider {} failed: {}", self.llm.name(), e);
                Err(ReadingError::Provider(e))
            }
            Err(_) => {
                warn!("Provider {} timed out after {:?}", self.llm.name(), self.timeout);
                Err(ReadingError::ProviderTimeout(self.timeout))
            }
        }
    }

    /// Produces the next assistant turn for a session.
    ///
    /// The session lock is held while the prompt is assembled and again
    /// while the reply is recorded, but not across the provider call. If the
    /// call fails, whatever was saved before it (including the card summary)
    /// remains and the interpretation can be requested again.
    pub async fn interpret(
        &self,
        store: &SessionStore,
        session_id: &str,
        lookup: Lookup,
    ) -> ReadingResult<String> {
        let (_, prompt) = store
            .update(session_id, lookup, |session| {
                Self::append_card_summary(session);
                Ok(self.build_prompt(&session.history))
            })
            .await?;

        let reply = self.generate(&prompt).await?;

        store
            .update(session_id, Lookup::Strict, |session| {
                session.add_message(Role::Assistant, reply.clone());
                Ok(())
            })
            .await?;

        Ok(reply)
    }
}
