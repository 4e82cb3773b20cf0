use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::UserId;
use crate::catalog::CardCatalog;
use crate::config::{AppConfig, ReadingConfig};
use crate::db::{DbPool, ReadingRecord, SavedLayout};
use crate::llm::models::{ChatOptions, Message};
use crate::llm::LlmProvider;
use crate::reading::archive::{ReadingArchive, ReadingPage};
use crate::reading::error::{ReadingError, ReadingResult};
use crate::reading::interpreter::{ContextWindow, Interpreter};
use crate::reading::session::ReadingSession;
use crate::reading::store::{Lookup, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawPolicy {
    /// Unknown card names are dropped without comment.
    Lenient,
    /// Unknown card names are returned to the caller as warnings.
    Strict,
}

#[derive(Debug, Clone)]
pub struct ReadingPolicy {
    pub lookup: Lookup,
    pub draw: DrawPolicy,
    pub default_detail: String,
    pub default_reading_name: String,
    /// Card count for a random subset when the caller gives none.
    pub random_subset_default: usize,
}

impl ReadingPolicy {
    pub fn from_config(config: &ReadingConfig) -> Self {
        Self {
            lookup: if config.strict_session_lookup {
                Lookup::Strict
            } else {
                Lookup::CreateMissing
            },
            draw: if config.strict_card_draw {
                DrawPolicy::Strict
            } else {
                DrawPolicy::Lenient
            },
            default_detail: config.default_detail.clone(),
            default_reading_name: config.default_reading_name.clone(),
            random_subset_default: config.random_subset_default,
        }
    }
}

impl Default for ReadingPolicy {
    fn default() -> Self {
        Self::from_config(&ReadingConfig::default())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewSession {
    pub session_id: String,
    pub greeting: String,
    pub is_authenticated: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DrawRequest {
    pub session_id: String,
    pub cards: Vec<String>,
    pub detail: Option<String>,
    pub save_to_account: bool,
    pub reading_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DrawResult {
    pub interpretation: String,
    pub reading_id: Option<i64>,
    /// Card names that could not be resolved; only filled under `DrawPolicy::Strict`.
    pub warnings: Vec<String>,
}

/// Entry point for every reading operation. Routes and the CLI both go
/// through here.
pub struct ReadingService {
    store: Arc<SessionStore>,
    catalog: Arc<CardCatalog>,
    interpreter: Interpreter,
    archive: ReadingArchive,
    policy: ReadingPolicy,
}

fn require_session_id(session_id: &str) -> ReadingResult<()> {
    if session_id.trim().is_empty() {
        return Err(ReadingError::validation("Field session_id is required"));
    }
    Ok(())
}

impl ReadingService {
    pub fn new(
        store: Arc<SessionStore>,
        catalog: Arc<CardCatalog>,
        interpreter: Interpreter,
        archive: ReadingArchive,
        policy: ReadingPolicy,
    ) -> Self {
        Self {
            store,
            catalog,
            interpreter,
            archive,
            policy,
        }
    }

    /// Wires the service from application config.
    pub fn from_config(
        config: &AppConfig,
        pool: DbPool,
        catalog: CardCatalog,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        let interpreter = Interpreter::new(llm, config.reading.system_prompt.clone())
            .with_window(ContextWindow::from_limit(config.reading.max_history_messages))
            .with_timeout(Duration::from_secs(config.llm.timeout_secs))
            .with_options(ChatOptions {
                model: None,
                temperature: config.llm.temperature,
                max_tokens: config.llm.max_tokens,
            });

        Self::new(
            Arc::new(SessionStore::new(pool.clone())),
            Arc::new(catalog),
            interpreter,
            ReadingArchive::new(pool),
            ReadingPolicy::from_config(&config.reading),
        )
    }

    pub fn catalog(&self) -> &CardCatalog {
        &self.catalog
    }

    pub fn policy(&self) -> &ReadingPolicy {
        &self.policy
    }

    /// Allocates a session and asks the provider for the opening greeting.
    #[instrument(skip(self))]
    pub async fn new_session(&self, user_id: Option<UserId>) -> ReadingResult<NewSession> {
        let session_id = Uuid::new_v4().to_string();
        self.store.create(&session_id, user_id)?;

        let greeting = self
            .interpreter
            .interpret(&self.store, &session_id, Lookup::Strict)
            .await?;

        Ok(NewSession {
            session_id,
            greeting,
            is_authenticated: user_id.is_some(),
        })
    }

    #[instrument(skip(self, responses), fields(count = responses.len()))]
    pub async fn submit_questions(
        &self,
        session_id: &str,
        responses: Vec<String>,
        user_id: Option<UserId>,
    ) -> ReadingResult<()> {
        require_session_id(session_id)?;

        if responses.is_empty() {
            let session = self.store.peek(session_id, self.policy.lookup)?;
            let needs_binding = user_id.is_some_and(|u| session.user_id != Some(u));
            if !needs_binding {
                return Ok(());
            }
        }

        self.store
            .update(session_id, self.policy.lookup, |session| {
                if let Some(user) = user_id {
                    session.bind_user(user)?;
                }
                session.submit_questions(&responses);
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Draws the requested cards, interprets them, and optionally saves the
    /// reading to the caller's account.
    #[instrument(skip(self, request), fields(session_id = %request.session_id))]
    pub async fn draw_cards(&self, request: DrawRequest, user_id: Option<UserId>) -> ReadingResult<DrawResult> {
        require_session_id(&request.session_id)?;

        let names: Vec<String> = request
            .cards
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if names.is_empty() {
            return Err(ReadingError::validation("Field cards is required"));
        }
        let detail = request
            .detail
            .clone()
            .unwrap_or_else(|| self.policy.default_detail.clone());

        let (_, outcome) = self
            .store
            .update(&request.session_id, self.policy.lookup, |session| {
                if let Some(user) = user_id {
                    session.bind_user(user)?;
                }
                session.draw_cards(&self.catalog, &names, &detail)
            })
            .await?;

        if !outcome.unresolved.is_empty() {
            warn!("Dropped unknown cards: {}", outcome.unresolved.join(", "));
        }

        let interpretation = self
            .interpreter
            .interpret(&self.store, &request.session_id, Lookup::Strict)
            .await?;

        let reading_id = if request.save_to_account {
            let session = self.store.load(&request.session_id)?;
            let name = request
                .reading_name
                .as_deref()
                .unwrap_or(&self.policy.default_reading_name);
            self.archive.persist(&session, name, None)?
        } else {
            None
        };

        let warnings = match self.policy.draw {
            DrawPolicy::Strict => outcome.unresolved,
            DrawPolicy::Lenient => Vec::new(),
        };

        Ok(DrawResult {
            interpretation,
            reading_id,
            warnings,
        })
    }

    /// Records a free-form message and returns the reader's reply.
    #[instrument(skip(self, text))]
    pub async fn send_message(&self, session_id: &str, text: &str) -> ReadingResult<String> {
        require_session_id(session_id)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ReadingError::validation("Field message is required"));
        }

        self.store
            .update(session_id, self.policy.lookup, |session| {
                session.record_user_response(text);
                Ok(())
            })
            .await?;

        self.interpreter
            .interpret(&self.store, session_id, Lookup::Strict)
            .await
    }

    /// Asks the reader to continue without a new message.
    #[instrument(skip(self))]
    pub async fn continue_reading(&self, session_id: &str) -> ReadingResult<String> {
        require_session_id(session_id)?;
        self.interpreter
            .interpret(&self.store, session_id, self.policy.lookup)
            .await
    }

    /// Read-only view; an unknown id under `CreateMissing` is not persisted.
    pub fn session(&self, session_id: &str) -> ReadingResult<ReadingSession> {
        require_session_id(session_id)?;
        self.store.peek(session_id, self.policy.lookup)
    }

    pub fn history(&self, session_id: &str) -> ReadingResult<Vec<Message>> {
        Ok(self.session(session_id)?.history)
    }

    /// Saves the session as a reading owned by `user_id`, binding the
    /// session to that user first.
    #[instrument(skip(self, description))]
    pub async fn save_reading(
        &self,
        session_id: &str,
        name: Option<&str>,
        description: Option<&str>,
        user_id: UserId,
    ) -> ReadingResult<i64> {
        require_session_id(session_id)?;
        let (session, _) = self
            .store
            .update(session_id, self.policy.lookup, |session| session.bind_user(user_id))
            .await?;

        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.policy.default_reading_name);

        let reading_id = self
            .archive
            .persist(&session, name, description)?
            .ok_or_else(|| ReadingError::validation("Reading could not be saved"))?;
        info!("Reading {} saved", reading_id);
        Ok(reading_id)
    }

    pub fn readings(&self, user_id: UserId, limit: usize, offset: usize) -> ReadingResult<ReadingPage> {
        self.archive.readings_for_user(user_id, limit, offset)
    }

    pub fn reading(&self, user_id: UserId, reading_id: i64) -> ReadingResult<ReadingRecord> {
        self.archive.reading_for_user(user_id, reading_id)
    }

    pub fn reading_count(&self, user_id: UserId) -> ReadingResult<i64> {
        self.archive.count_for_user(user_id)
    }

    pub fn save_layout(
        &self,
        user_id: UserId,
        name: &str,
        description: Option<&str>,
        cards: &[String],
    ) -> ReadingResult<i64> {
        self.archive.save_layout(user_id, name, description, cards)
    }

    pub fn layouts(&self, user_id: UserId) -> ReadingResult<Vec<SavedLayout>> {
        self.archive.layouts_for_user(user_id)
    }

    pub fn delete_layout(&self, user_id: UserId, layout_id: i64) -> ReadingResult<()> {
        self.archive.delete_layout(user_id, layout_id)
    }
}
