use axum::{extract::State, http::HeaderMap, Json};
use engine::{InboxScreen, InboxView};

use crate::http::error::{reject, ApiError};
use crate::state::AppState;

pub async fn get_inbox(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<InboxView>, ApiError> {
    let services = state.services_for(&headers)?;
    let screen = InboxScreen::subscribe(services, state.inbox_page_size).map_err(reject)?;
    screen.ready().await;
    Ok(Json(screen.view()))
}
