use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub card_type: String,
    pub image: String,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read card catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse card catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("card '{0}' appears more than once in the catalog")]
    DuplicateCard(String),
    #[error("card catalog is empty")]
    Empty,
}

/// Read-only deck of drawable cards, loaded once at startup.
#[derive(Debug, Clone)]
pub struct CardCatalog {
    cards: Vec<CardDefinition>,
}

const MAJOR_ARCANA: [&str; 22] = [
    "The Fool",
    "The Magician",
    "The High Priestess",
    "The Empress",
    "The Emperor",
    "The Hierophant",
    "The Lovers",
    "The Chariot",
    "Strength",
    "The Hermit",
    "Wheel of Fortune",
    "Justice",
    "The Hanged Man",
    "Death",
    "Temperance",
    "The Devil",
    "The Tower",
    "The Star",
    "The Moon",
    "The Sun",
    "Judgement",
    "The World",
];

const SUITS: [&str; 4] = ["Wands", "Cups", "Swords", "Pentacles"];

const RANKS: [&str; 14] = [
    "Ace", "Two", "Three", "Four", "Five", "Six", "Seven", "Eight", "Nine", "Ten", "Page",
    "Knight", "Queen", "King",
];

impl CardCatalog {
    pub fn new(cards: Vec<CardDefinition>) -> Result<Self, CatalogError> {
        if cards.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut seen = HashSet::new();
        for card in &cards {
            if !seen.insert(card.name.as_str()) {
                return Err(CatalogError::DuplicateCard(card.name.clone()));
            }
        }
        Ok(Self { cards })
    }

    /// The standard 78-card Rider-Waite deck.
    pub fn builtin() -> Self {
        let mut cards = Vec::with_capacity(78);
        for (number, name) in MAJOR_ARCANA.iter().enumerate() {
            cards.push(CardDefinition {
                name: name.to_string(),
                card_type: "Major Arcana".to_string(),
                image: format!("major_{:02}.jpg", number),
            });
        }
        for suit in SUITS {
            for (number, rank) in RANKS.iter().enumerate() {
                cards.push(CardDefinition {
                    name: format!("{} of {}", rank, suit),
                    card_type: format!("Minor Arcana - {}", suit),
                    image: format!("{}_{:02}.jpg", suit.to_lowercase(), number + 1),
                });
            }
        }
        Self { cards }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let cards: Vec<CardDefinition> = serde_json::from_str(&raw)?;
        info!("Loaded {} cards from {}", cards.len(), path.as_ref().display());
        Self::new(cards)
    }

    /// Loads the JSON deck at `path`, or the built-in deck when no path is configured.
    pub fn load(path: Option<&str>) -> Result<Self, CatalogError> {
        match path {
            Some(p) => Self::from_path(p),
            None => Ok(Self::builtin()),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&CardDefinition> {
        self.cards.iter().find(|c| c.name == name)
    }

    pub fn list(&self) -> &[CardDefinition] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Unique random subset; `count` is clamped to the deck size.
    pub fn sample(&self, count: usize) -> Vec<CardDefinition> {
        let count = count.min(self.cards.len());
        self.cards
            .choose_multiple(&mut rand::thread_rng(), count)
            .cloned()
            .collect()
    }
}
