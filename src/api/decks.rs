use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use super::{ApiError, SharedState, UserId};
use crate::deck::Deck;
use crate::gallery::{Page, PageRequest, SearchResults};

#[derive(Deserialize)]
pub struct CreateDeckRequest {
    pub title: String,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

pub(super) async fn list_decks(
    State(state): State<SharedState>,
    UserId(user): UserId,
) -> Result<impl IntoResponse, ApiError> {
    let decks = state.db.call(move |db| db.list_decks(&user)).await?;
    Ok(Json(decks))
}

pub(super) async fn create_deck(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Json(req): Json<CreateDeckRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut deck = Deck::new(req.title.trim());
    if let Some(theme) = req.theme {
        deck.meta.theme = theme;
    }
    if let Some(description) = req.description {
        deck.meta.description = description;
    }
    deck.validate()?;

    let synced = state.db.call(move |db| db.upsert_deck(&user, &deck)).await?;
    Ok((StatusCode::CREATED, Json(synced)))
}

pub(super) async fn get_deck(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lookup = id.clone();
    let deck = state.db.call(move |db| db.get_deck(&user, &lookup)).await?;
    match deck {
        Some(deck) => Ok(Json(deck)),
        None => Err(ApiError::NotFound(format!("Deck {} not found", id))),
    }
}

/// Sync upload: replace the caller's copy of the deck.
pub(super) async fn put_deck(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
    Json(deck): Json<Deck>,
) -> Result<impl IntoResponse, ApiError> {
    if deck.id != id {
        return Err(ApiError::BadRequest(format!(
            "Deck id {} does not match path id {}",
            deck.id, id
        )));
    }
    deck.validate()?;
    let synced = state.db.call(move |db| db.upsert_deck(&user, &deck)).await?;
    tracing::debug!(deck_id = %id, hash = %synced.content_hash, "Deck synced");
    Ok(Json(synced))
}

pub(super) async fn delete_deck(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lookup = id.clone();
    let deleted = state.db.call(move |db| db.delete_deck(&user, &lookup)).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Deck {} not found", id)))
    }
}

pub(super) async fn publish_deck(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lookup = id.clone();
    let published = state.db.call(move |db| db.publish_deck(&user, &lookup)).await?;
    match published {
        Some(published) => Ok(Json(published)),
        None => Err(ApiError::NotFound(format!(
            "Deck {} has not been synced and cannot be published",
            id
        ))),
    }
}

pub(super) async fn list_published(
    State(state): State<SharedState>,
    Query(req): Query<PageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let page = Page::from(&req);
    let (items, total) = state.db.call(move |db| db.list_published(page)).await?;
    Ok(Json(SearchResults {
        items,
        page: page.number,
        page_size: page.size,
        total,
        total_pages: page.total_pages(total),
    }))
}

/// Fetch a published deck by slug, or by id as a fallback.
pub(super) async fn get_published(
    State(state): State<SharedState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lookup = key.clone();
    let published = state
        .db
        .call(move |db| match db.get_published_by_slug(&lookup)? {
            Some(found) => Ok(Some(found)),
            None => db.get_published(&lookup),
        })
        .await?;
    match published {
        Some(published) => Ok(Json(published)),
        None => Err(ApiError::NotFound(format!("Published deck {} not found", key))),
    }
}
