use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use domain::{ActorId, EdgeKind, ProfileAction};
use engine::{dispatch_profile_action, ActionOutcome, ProfileScreen, ProfileView, ToggleOutcome};
use serde::Deserialize;
use storage::MemoryStore;

use crate::http::error::{bad_request, reject, ApiError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ProfileActionRequest {
    pub action: ProfileAction,
}

async fn load_screen(
    state: &AppState,
    headers: &HeaderMap,
    profile_id: String,
) -> Result<ProfileScreen<MemoryStore>, ApiError> {
    let profile_id = ActorId::new(profile_id).map_err(bad_request)?;
    let services = state.services_for(headers)?;
    let screen = ProfileScreen::load(services, &profile_id)
        .await
        .map_err(reject)?;
    screen.ready().await;
    Ok(screen)
}

pub async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(profile_id): Path<String>,
) -> Result<Json<ProfileView>, ApiError> {
    let screen = load_screen(&state, &headers, profile_id).await?;
    Ok(Json(screen.view()))
}

pub async fn run_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(profile_id): Path<String>,
    Json(payload): Json<ProfileActionRequest>,
) -> Result<Json<ActionOutcome>, ApiError> {
    let edge = match payload.action {
        ProfileAction::Follow | ProfileAction::Unfollow => Some(EdgeKind::Follow),
        ProfileAction::Block | ProfileAction::Unblock => Some(EdgeKind::Block),
        ProfileAction::Message | ProfileAction::Report => None,
    };
    let guard = state.services_for(&headers)?.actor().map(|a| state.pending_for(&a));
    let _claim = match (edge, &guard) {
        (Some(kind), Some(guard)) => match guard.claim(kind, &profile_id) {
            Some(claim) => Some(claim),
            None => {
                return Ok(Json(ActionOutcome::Toggled {
                    kind,
                    result: ToggleOutcome::Busy,
                }))
            }
        },
        _ => None,
    };
    let screen = load_screen(&state, &headers, profile_id).await?;
    let outcome = dispatch_profile_action(&screen, payload.action)
        .await
        .map_err(reject)?;
    Ok(Json(outcome))
}
