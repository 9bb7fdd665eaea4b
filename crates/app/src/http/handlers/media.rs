use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
};

use crate::http::error::ApiError;
use crate::state::AppState;

pub async fn get_media(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let blob = state
        .media
        .get(&key)
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Media not found".to_string()))?;
    Ok(([(header::CONTENT_TYPE, blob.content_type)], blob.bytes))
}
