//! Per-session reading state and its legal transitions.
//!
//! Everything here is in-memory; persistence is the job of
//! [`SessionStore`](crate::reading::store::SessionStore), which wraps every
//! mutation in a load / apply / save cycle.

use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, UserId};
use crate::catalog::{CardCatalog, CardDefinition};
use crate::llm::models::{Message, Role};
use crate::reading::error::{ReadingError, ReadingResult};

/// Where a session stands, derived from its two flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Fresh,
    Questioned,
    /// Cards were drawn before any question was asked.
    CardsOnly,
    Ready,
}

/// Field order is the snapshot layout and must stay stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingSession {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub questions_asked: bool,
    #[serde(default)]
    pub cards_drawn: bool,
    #[serde(default)]
    pub user_responses: Vec<String>,
    #[serde(default)]
    pub cards: Vec<CardDefinition>,
    #[serde(default)]
    pub history: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawOutcome {
    pub drawn: Vec<CardDefinition>,
    /// Requested names the catalog does not know.
    pub unresolved: Vec<String>,
}

impl ReadingSession {
    pub fn new(session_id: impl Into<String>, user_id: Option<UserId>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id,
            questions_asked: false,
            cards_drawn: false,
            user_responses: Vec::new(),
            cards: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        match (self.questions_asked, self.cards_drawn) {
            (false, false) => Phase::Fresh,
            (true, false) => Phase::Questioned,
            (false, true) => Phase::CardsOnly,
            (true, true) => Phase::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.phase() == Phase::Ready
    }

    /// Parses a persisted snapshot. Missing fields fall back to empty values;
    /// anything unparseable, or a snapshot filed under the wrong id, is corrupt.
    pub fn from_snapshot(session_id: &str, raw: &str) -> ReadingResult<Self> {
        let corrupt = |reason: String| ReadingError::CorruptSession {
            session_id: session_id.to_string(),
            reason,
        };

        let mut session: ReadingSession =
            serde_json::from_str(raw).map_err(|e| corrupt(e.to_string()))?;

        if session.session_id.is_empty() {
            session.session_id = session_id.to_string();
        } else if session.session_id != session_id {
            return Err(corrupt(format!(
                "snapshot is stored under {} but names {}",
                session_id, session.session_id
            )));
        }

        if session.cards_drawn && session.cards.is_empty() {
            return Err(corrupt("cards_drawn is set but no cards are recorded".to_string()));
        }

        Ok(session)
    }

    pub fn to_snapshot(&self) -> ReadingResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn add_message(&mut self, role: Role, content: impl Into<String>) {
        self.history.push(Message::new(role, content));
    }

    /// Appends each response to `user_responses` and to the transcript, in
    /// order. Returns false, changing nothing, for an empty list.
    pub fn submit_questions(&mut self, responses: &[String]) -> bool {
        if responses.is_empty() {
            return false;
        }
        for response in responses {
            self.record_user_response(response);
        }
        self.questions_asked = true;
        true
    }

    /// A free-form message from the querent.
    pub fn record_user_response(&mut self, response: &str) {
        self.user_responses.push(response.to_string());
        self.add_message(Role::User, response);
    }

    /// Resolves `names` against the catalog and replaces the drawn cards.
    /// Unknown names are left out of the draw and listed in the outcome. A
    /// draw in which nothing resolves is rejected and leaves the session as it was.
    pub fn draw(&mut self, catalog: &CardCatalog, names: &[String]) -> ReadingResult<DrawOutcome> {
        let mut drawn = Vec::with_capacity(names.len());
        let mut unresolved = Vec::new();
        for name in names {
            match catalog.lookup(name) {
                Some(card) => drawn.push(card.clone()),
                None => unresolved.push(name.clone()),
            }
        }

        if drawn.is_empty() {
            return Err(ReadingError::validation(format!(
                "None of the requested cards are known: {}",
                names.join(", ")
            )));
        }

        self.cards = drawn.clone();
        self.cards_drawn = true;
        Ok(DrawOutcome { drawn, unresolved })
    }

    /// Notes in the transcript which cards the querent picked and how much
    /// detail they want.
    pub fn record_draw_request(&mut self, requested: &[String], detail: &str) {
        self.add_message(
            Role::User,
            format!("I chose the cards: {}", requested.join(", ")),
        );
        self.add_message(
            Role::System,
            format!("The querent prefers a {} reading.", detail),
        );
    }

    /// Full draw request: resolve the cards, then record the choice.
    pub fn draw_cards(
        &mut self,
        catalog: &CardCatalog,
        names: &[String],
        detail: &str,
    ) -> ReadingResult<DrawOutcome> {
        let outcome = self.draw(catalog, names)?;
        self.record_draw_request(names, detail);
        Ok(outcome)
    }

    /// Binds an identity to the session. Anonymous sessions can be claimed
    /// once; a bound session only accepts its own user.
    /// Returns true when the binding changed.
    pub fn bind_user(&mut self, user_id: UserId) -> ReadingResult<bool> {
        match self.user_id {
            None => {
                self.user_id = Some(user_id);
                Ok(true)
            }
            Some(existing) if existing == user_id => Ok(false),
            Some(_) => Err(AuthError::SessionOwnedByAnotherUser.into()),
        }
    }

    /// The two card entries added before an interpretation: the comma-joined
    /// names and the semicolon-joined "name: type" details. `None` until the
    /// session is ready.
    pub fn card_summary(&self) -> Option<(String, String)> {
        if !self.is_ready() {
            return None;
        }
        let names = self
            .cards
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let details = self
            .cards
            .iter()
            .map(|c| format!("Card: {}, type: {}", c.name, c.card_type))
            .collect::<Vec<_>>()
            .join("; ");
        Some((
            format!("Selected cards: {}", names),
            format!("Card details: {}", details),
        ))
    }

    pub fn first_response(&self) -> Option<&str> {
        self.user_responses.first().map(String::as_str)
    }
}
