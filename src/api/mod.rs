//! JSON HTTP API.
//!
//! Callers identify themselves with an opaque `x-user-id` header; routes that
//! act on a user's data reject requests without one.

mod decks;
mod gallery;
mod merge;
mod tokens;


use std::sync::Arc;

use axum::{
    Json, Router,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::errors::{DeckError, GenerationError, LedgerError, MergeError, ShareError};
use crate::generation::ImageService;
use crate::store::DbHandle;
use crate::sync::USER_HEADER;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub images: ImageService,
}

pub type SharedState = Arc<AppState>;

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    PaymentRequired(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::PaymentRequired(msg) => (StatusCode::PAYMENT_REQUIRED, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", e))
    }
}

impl From<DeckError> for ApiError {
    fn from(e: DeckError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<ShareError> for ApiError {
    fn from(e: ShareError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<MergeError> for ApiError {
    fn from(e: MergeError) -> Self {
        match e {
            MergeError::NoLayers => ApiError::BadRequest(e.to_string()),
            MergeError::NoSuchVersion { .. } => ApiError::NotFound(e.to_string()),
            MergeError::NotMissing { .. } => ApiError::Conflict(e.to_string()),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientTokens { .. } => ApiError::PaymentRequired(e.to_string()),
            LedgerError::InvalidAmount { .. } | LedgerError::SelfLike => {
                ApiError::BadRequest(e.to_string())
            }
            LedgerError::PublishedDeckNotFound { .. } => ApiError::NotFound(e.to_string()),
            LedgerError::AlreadyLiked { .. } => ApiError::Conflict(e.to_string()),
            LedgerError::Database(inner) => inner.into(),
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::Ledger(inner) => inner.into(),
            GenerationError::Other(inner) => inner.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

// ── Caller identity ───────────────────────────────────────────────────

/// The caller's id from the `x-user-id` header.
#[derive(Debug, Clone)]
pub struct UserId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::BadRequest(format!("Missing {} header", USER_HEADER)))?;
        Ok(UserId(value.to_string()))
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/decks", get(decks::list_decks).post(decks::create_deck))
        .route(
            "/api/decks/{id}",
            get(decks::get_deck)
                .put(decks::put_deck)
                .delete(decks::delete_deck),
        )
        .route("/api/decks/{id}/publish", post(decks::publish_deck))
        .route("/api/published", get(decks::list_published))
        .route("/api/published/{id}", get(decks::get_published))
        .route("/api/published/{id}/like", post(tokens::like_deck))
        .route("/api/merge", post(merge::merge_decks))
        .route("/api/share/encode", post(merge::encode_share))
        .route("/api/share/decode", post(merge::decode_share))
        .route("/api/gallery/search", get(gallery::search))
        .route("/api/gallery/{id}/family", get(gallery::family))
        .route("/api/images/generate", post(gallery::generate_image))
        .route("/api/tokens/balance", get(tokens::balance))
        .route("/api/tokens/transactions", get(tokens::transactions))
        .route("/health", get(health_check))
}

async fn health_check() -> &'static str {
    "ok"
}
