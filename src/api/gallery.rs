use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use super::{ApiError, SharedState, UserId};
use crate::gallery::{Page, PageRequest, family_of};
use crate::generation::GenerateRequest;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
}

pub(super) async fn search(
    State(state): State<SharedState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = Page::from(&PageRequest {
        page: query.page,
        page_size: query.page_size,
    });
    let results = state.images.search(&query.q, query.style, page).await?;
    Ok(Json(results))
}

pub(super) async fn family(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lookup = id.clone();
    let family = state.db.call(move |db| family_of(db, &lookup)).await?;
    match family {
        Some(family) => Ok(Json(family)),
        None => Err(ApiError::NotFound(format!("Image {} not found", id))),
    }
}

pub(super) async fn generate_image(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Json(mut req): Json<GenerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.style.trim().is_empty() {
        return Err(ApiError::BadRequest("style must not be empty".to_string()));
    }
    if req.prompt.trim().is_empty() && req.current_image.is_none() {
        return Err(ApiError::BadRequest(
            "prompt must not be empty when no current image is given".to_string(),
        ));
    }
    req.user_id = user;
    let outcome = state.images.generate(req).await?;
    Ok(Json(outcome))
}
