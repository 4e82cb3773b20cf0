use serde::{Deserialize, Serialize};

use crate::catalog::CardDefinition;

#[derive(Debug, Deserialize)]
pub struct SubmitQuestionsRequest {
    pub session_id: String,
    #[serde(default)]
    pub responses: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DrawCardsRequest {
    pub session_id: String,
    #[serde(default)]
    pub cards: Vec<String>,
    pub reading_detail: Option<String>,
    #[serde(default)]
    pub save_to_account: bool,
    pub reading_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveReadingRequest {
    pub session_id: String,
    pub reading_name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SaveLayoutRequest {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub cards: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubsetQuery {
    pub count: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_offset")]
    pub offset: usize,
}

fn default_limit() -> usize {
    10
}

fn default_offset() -> usize {
    0
}

#[derive(Debug, Serialize)]
pub struct NewSessionResponse {
    pub session_id: String,
    pub message: String,
    pub is_authenticated: bool,
}

#[derive(Debug, Serialize)]
pub struct DrawCardsResponse {
    pub success: bool,
    pub message: String,
    pub reading_id: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved_cards: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CardSummary<'a> {
    pub name: &'a str,
    pub image: &'a str,
}

impl<'a> From<&'a CardDefinition> for CardSummary<'a> {
    fn from(card: &'a CardDefinition) -> Self {
        Self {
            name: &card.name,
            image: &card.image,
        }
    }
}
