use serde::{Deserialize, Serialize};

use crate::deck::Deck;

/// A user's deck as held in the server-side sync table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncedDeck {
    pub owner_id: String,
    pub deck: Deck,
    pub content_hash: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckListing {
    pub deck_id: String,
    pub title: String,
    pub card_count: i64,
    pub content_hash: String,
    pub updated_at: String,
}

/// Public snapshot of a deck. Editing the source deck does not change it
/// until the owner publishes again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedDeck {
    pub id: String,
    pub deck_id: String,
    pub owner_id: String,
    pub slug: String,
    pub title: String,
    pub deck: Deck,
    pub like_count: i64,
    pub published_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedSummary {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub owner_id: String,
    pub card_count: i64,
    pub like_count: i64,
    pub published_at: String,
}

/// Fields for a new gallery row.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub url: String,
    pub style: Option<String>,
    pub source_image_id: Option<String>,
    pub card_title: String,
    pub prompt: String,
    pub cost_tokens: i64,
    pub owner_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenTransaction {
    pub id: i64,
    pub user_id: String,
    pub delta: i64,
    pub reason: String,
    pub reference: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeReceipt {
    pub published_id: String,
    pub like_count: i64,
    pub balance: i64,
}
