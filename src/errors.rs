//! Typed error hierarchy for deckforge.
//!
//! Each subsystem owns one enum:
//! - `DeckError`: deck validation failures
//! - `MergeError`: three-layer merge and conflict resolution
//! - `ShareError`: URL-hash encoding and decoding
//! - `LedgerError`: token balances, likes, and publishing
//! - `GenerationError`: image generation, embeddings, and media storage
//!
//! HTTP mapping lives in `api::ApiError`.

use thiserror::Error;

use crate::merge::Layer;

/// Errors from deck validation.
#[derive(Debug, Error)]
pub enum DeckError {
    #[error("Deck title must not be empty")]
    EmptyTitle,

    #[error("Card id {card_id} appears more than once")]
    DuplicateCardId { card_id: String },

    #[error("Card {card_id} has a {kind} with an empty title")]
    UntitledEntry { card_id: String, kind: &'static str },
}

/// Errors from the three-layer merge resolver.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("At least one deck layer is required to merge")]
    NoLayers,

    #[error("No {layer} version of card {card_id} is available")]
    NoSuchVersion { card_id: String, layer: Layer },

    #[error("Card {card_id} is not flagged as missing from any layer")]
    NotMissing { card_id: String },
}

/// Errors from the share-hash codec.
#[derive(Debug, Error)]
pub enum ShareError {
    #[error("Share hash is empty")]
    Empty,

    #[error("Share hash is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Share hash payload could not be compressed or inflated: {0}")]
    Codec(#[source] std::io::Error),

    #[error("Share hash payload exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Share hash payload is not a deck: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the token ledger and the published-deck table.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("User {user_id} needs {required} tokens but has {available}")]
    InsufficientTokens {
        user_id: String,
        required: i64,
        available: i64,
    },

    #[error("Token amount must be positive, got {amount}")]
    InvalidAmount { amount: i64 },

    #[error("Published deck {id} not found")]
    PublishedDeckNotFound { id: String },

    #[error("Users cannot like their own deck")]
    SelfLike,

    #[error("Deck {published_id} already liked by {user_id}")]
    AlreadyLiked {
        user_id: String,
        published_id: String,
    },

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),
}

/// Errors from the AI generation pipeline.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Image generation is not configured (missing API key)")]
    NotConfigured,

    #[error("Generation API error: {0}")]
    Api(String),

    #[error("Generation API returned no image data")]
    EmptyResponse,

    #[error("Failed to store generated image: {0}")]
    Storage(#[source] anyhow::Error),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
