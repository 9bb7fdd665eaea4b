use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use domain::thread::{SortMode, ThreadEntry};
use domain::{Comment, EdgeKind};
use engine::{fetch_thread, CommentsScreen, CommentsView, ToggleOutcome};
use serde::{Deserialize, Serialize};
use storage::MemoryStore;

use crate::http::error::{reject, ApiError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ThreadParams {
    #[serde(default)]
    pub sort: SortMode,
}

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub text: String,
    pub reply_to: Option<String>,
}

#[derive(Serialize)]
pub struct DeleteCommentResponse {
    pub removed: usize,
}

async fn open_screen(
    state: &AppState,
    headers: &HeaderMap,
    post_id: &str,
) -> Result<CommentsScreen<MemoryStore>, ApiError> {
    let screen = CommentsScreen::open(state.services_for(headers)?, post_id);
    screen.ready().await;
    Ok(screen)
}

pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Query(params): Query<ThreadParams>,
) -> Result<Json<Vec<ThreadEntry>>, ApiError> {
    let entries = fetch_thread(&*state.store, &post_id, params.sort)
        .await
        .map_err(reject)?;
    Ok(Json(entries))
}

pub async fn post_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<Json<Comment>, ApiError> {
    let screen = open_screen(&state, &headers, &post_id).await?;
    let comment = screen
        .submit(&payload.text, payload.reply_to.as_deref())
        .await
        .map_err(reject)?;
    Ok(Json(comment))
}

pub async fn like_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((post_id, comment_id)): Path<(String, String)>,
) -> Result<Json<ToggleOutcome>, ApiError> {
    let actor = state
        .services_for(&headers)?
        .require_actor()
        .map_err(reject)?;
    let guard = state.pending_for(&actor);
    let Some(_claim) = guard.claim(EdgeKind::CommentLike, &comment_id) else {
        return Ok(Json(ToggleOutcome::Busy));
    };
    let screen = open_screen(&state, &headers, &post_id).await?;
    let result = screen
        .toggle_comment_like(&comment_id)
        .await
        .map_err(reject)?;
    Ok(Json(result))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((post_id, comment_id)): Path<(String, String)>,
) -> Result<Json<DeleteCommentResponse>, ApiError> {
    let screen = open_screen(&state, &headers, &post_id).await?;
    let removed = screen.delete_comment(&comment_id).await.map_err(reject)?;
    Ok(Json(DeleteCommentResponse { removed }))
}

/// Snapshot of the live screen, the same state the SSE stream pushes.
pub async fn comments_view(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
    Query(params): Query<ThreadParams>,
) -> Result<Json<CommentsView>, ApiError> {
    let screen = open_screen(&state, &headers, &post_id).await?;
    screen.set_sort(params.sort);
    Ok(Json(screen.view()))
}
