use axum::{extract::State, http::HeaderMap, Json};
use domain::{Error, PushPayload};

use crate::http::error::{reject, ApiError};
use crate::state::AppState;

/// Pushes delivered to the caller, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<PushPayload>>, ApiError> {
    let actor = state
        .actor_for(&headers)?
        .ok_or_else(|| reject(Error::NotLoggedIn))?;
    Ok(Json(state.push.for_recipient(&actor)))
}
