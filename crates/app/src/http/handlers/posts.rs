use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use domain::{EdgeKind, MediaBlob, Post, PostAction};
use engine::{
    dispatch_post_action, ActionOutcome, Composer, PendingEdges, PostCard, PostCardView,
    ToggleOutcome,
};
use std::sync::Arc;
use serde::{Deserialize, Serialize};

use crate::http::error::{bad_request, reject, ApiError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ImageUpload {
    pub content_type: String,
    /// Hex-encoded bytes.
    pub data: String,
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub text: String,
    pub image: Option<ImageUpload>,
}

#[derive(Deserialize)]
pub struct EditPostRequest {
    pub text: String,
}

#[derive(Deserialize)]
pub struct PostActionRequest {
    pub action: PostAction,
}

#[derive(Serialize)]
pub struct ToggleResponse {
    pub result: ToggleOutcome,
    pub card: PostCardView,
}

pub async fn get_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> Result<Json<PostCardView>, ApiError> {
    let services = state.services_for(&headers)?;
    let card = PostCard::load(services, &post_id).await.map_err(reject)?;
    Ok(Json(card.view()))
}

pub async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePostRequest>,
) -> Result<Json<Post>, ApiError> {
    let composer = Composer::new(state.services_for(&headers)?);
    composer.set_text(payload.text);
    if let Some(image) = payload.image {
        let bytes = hex::decode(&image.data)
            .map_err(|e| bad_request(format!("Invalid image data: {}", e)))?;
        composer.attach_image(MediaBlob {
            content_type: image.content_type,
            bytes,
        });
    }
    let post = composer.submit().await.map_err(reject)?;
    Ok(Json(post))
}

pub async fn edit_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
    Json(payload): Json<EditPostRequest>,
) -> Result<Json<Post>, ApiError> {
    let services = state.services_for(&headers)?;
    let post = engine::edit_post(&services, &post_id, &payload.text)
        .await
        .map_err(reject)?;
    Ok(Json(post))
}

pub async fn toggle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((post_id, kind)): Path<(String, String)>,
) -> Result<Json<ToggleResponse>, ApiError> {
    let kind: EdgeKind = kind.parse().map_err(bad_request)?;
    let services = state.services_for(&headers)?;
    let actor = services.require_actor().map_err(reject)?;
    let guard = state.pending_for(&actor);
    let card = PostCard::load(services, &post_id).await.map_err(reject)?;
    let result = card.toggle_guarded(kind, &guard).await.map_err(reject)?;
    Ok(Json(ToggleResponse {
        result,
        card: card.view(),
    }))
}

pub async fn run_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
    Json(payload): Json<PostActionRequest>,
) -> Result<Json<ActionOutcome>, ApiError> {
    let services = state.services_for(&headers)?;
    let guard = match services.actor() {
        Some(actor) => state.pending_for(&actor),
        None => Arc::new(PendingEdges::default()),
    };
    let _claim = match payload.action {
        PostAction::Bookmark | PostAction::RemoveBookmark => {
            match guard.claim(EdgeKind::Bookmark, &post_id) {
                Some(claim) => Some(claim),
                None => {
                    return Ok(Json(ActionOutcome::Toggled {
                        kind: EdgeKind::Bookmark,
                        result: ToggleOutcome::Busy,
                    }))
                }
            }
        }
        _ => None,
    };
    let card = PostCard::load(services, &post_id).await.map_err(reject)?;
    let outcome = dispatch_post_action(&card, &guard, payload.action)
        .await
        .map_err(reject)?;
    Ok(Json(outcome))
}
