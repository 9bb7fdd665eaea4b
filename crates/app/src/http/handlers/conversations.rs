use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use domain::{ActorId, Conversation, Message};
use engine::{mark_read, start_conversation, ConversationScreen, ConversationView};
use serde::Deserialize;
use tracing::warn;

use crate::http::error::{bad_request, reject, ApiError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct StartConversationRequest {
    pub with: String,
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

pub async fn start(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<StartConversationRequest>,
) -> Result<Json<Conversation>, ApiError> {
    let other = ActorId::new(payload.with).map_err(bad_request)?;
    let services = state.services_for(&headers)?;
    let conversation = start_conversation(&services, &other)
        .await
        .map_err(reject)?;
    Ok(Json(conversation))
}

/// Opening a conversation also clears the reader's unread badge.
pub async fn open(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
) -> Result<Json<ConversationView>, ApiError> {
    let services = state.services_for(&headers)?;
    let screen = ConversationScreen::open(services.clone(), &conversation_id)
        .await
        .map_err(reject)?;
    if let Err(e) = mark_read(&services, &conversation_id).await {
        warn!(%conversation_id, "Read receipt failed: {}", e);
    }
    screen.ready().await;
    Ok(Json(screen.view()))
}

pub async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<Message>, ApiError> {
    let services = state.services_for(&headers)?;
    let screen = ConversationScreen::open(services, &conversation_id)
        .await
        .map_err(reject)?;
    let message = screen.send_message(&payload.text).await.map_err(reject)?;
    Ok(Json(message))
}
