use axum::{Json, extract::State, response::IntoResponse};
use serde::{Deserialize, Serialize};

use super::{ApiError, SharedState};
use crate::deck::Deck;
use crate::merge::{Layer, merge_layers, resolve_card, resolve_missing};
use crate::share::{decode_share_hash, encode_share_hash};

/// A user decision applied on top of the automatic merge.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Resolution {
    UseLayer { card_id: String, layer: Layer },
    KeepMissing { card_id: String },
    DropMissing { card_id: String },
}

#[derive(Debug, Default, Deserialize)]
pub struct MergeRequest {
    #[serde(default)]
    pub curated: Option<Deck>,
    /// Load the curated layer from the published table instead.
    #[serde(default)]
    pub curated_slug: Option<String>,
    #[serde(default)]
    pub hash: Option<Deck>,
    /// Raw URL fragment; decoded into the hash layer.
    #[serde(default)]
    pub share_hash: Option<String>,
    #[serde(default)]
    pub local: Option<Deck>,
    #[serde(default)]
    pub resolutions: Vec<Resolution>,
}

pub(super) async fn merge_decks(
    State(state): State<SharedState>,
    Json(req): Json<MergeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let curated = match (req.curated, req.curated_slug) {
        (Some(deck), _) => Some(deck),
        (None, Some(slug)) => {
            let lookup = slug.clone();
            let published = state
                .db
                .call(move |db| db.get_published_by_slug(&lookup))
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("Published deck {} not found", slug)))?;
            Some(published.deck)
        }
        (None, None) => None,
    };
    let hash = match (req.hash, req.share_hash) {
        (Some(deck), _) => Some(deck),
        (None, Some(fragment)) => Some(decode_share_hash(&fragment)?),
        (None, None) => None,
    };

    let mut outcome = merge_layers(curated, hash, req.local)?;
    for resolution in req.resolutions {
        match resolution {
            Resolution::UseLayer { card_id, layer } => resolve_card(&mut outcome, &card_id, layer)?,
            Resolution::KeepMissing { card_id } => resolve_missing(&mut outcome, &card_id, true)?,
            Resolution::DropMissing { card_id } => resolve_missing(&mut outcome, &card_id, false)?,
        }
    }
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct DecodeRequest {
    pub hash: String,
}

#[derive(Debug, Serialize)]
pub struct EncodeResponse {
    pub hash: String,
    pub content_hash: String,
}

pub(super) async fn encode_share(Json(deck): Json<Deck>) -> Result<impl IntoResponse, ApiError> {
    let hash = encode_share_hash(&deck)?;
    Ok(Json(EncodeResponse {
        hash,
        content_hash: deck.content_hash(),
    }))
}

pub(super) async fn decode_share(Json(req): Json<DecodeRequest>) -> Result<impl IntoResponse, ApiError> {
    let deck = decode_share_hash(&req.hash)?;
    Ok(Json(deck))
}
