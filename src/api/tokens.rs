use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use super::{ApiError, SharedState, UserId};

const DEFAULT_TRANSACTION_LIMIT: usize = 50;
const MAX_TRANSACTION_LIMIT: usize = 500;

#[derive(Debug, Default, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

pub(super) async fn balance(
    State(state): State<SharedState>,
    UserId(user): UserId,
) -> Result<impl IntoResponse, ApiError> {
    let lookup = user.clone();
    let balance = state.db.call(move |db| db.balance(&lookup)).await?;
    Ok(Json(serde_json::json!({"user_id": user, "balance": balance})))
}

pub(super) async fn transactions(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Query(query): Query<TransactionsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TRANSACTION_LIMIT)
        .clamp(1, MAX_TRANSACTION_LIMIT);
    let transactions = state
        .db
        .call(move |db| db.list_transactions(&user, limit))
        .await?;
    Ok(Json(transactions))
}

pub(super) async fn like_deck(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state
        .db
        .call(move |db| Ok(db.like_deck(&user, &id)))
        .await??;
    Ok(Json(receipt))
}
