use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde::Serialize;
use std::time::Duration;
use tokio_stream::{wrappers::WatchStream, StreamExt};

use crate::http::error::{reject, ApiError};
use crate::state::AppState;
use engine::{CommentsScreen, InboxScreen, RenderSignal};

/// One event per render version. Versions that arrive faster than the
/// client reads are coalesced by the watch channel.
fn view_events<V, F>(
    render: &RenderSignal,
    event: &'static str,
    mut view: F,
) -> impl Stream<Item = Result<Event, axum::Error>>
where
    V: Serialize,
    F: FnMut() -> V + Send + 'static,
{
    WatchStream::new(render.subscribe()).map(move |_| {
        Event::default()
            .event(event)
            .json_data(view())
            .map_err(|e| {
                tracing::error!("SSE serialization error: {}", e);
                axum::Error::new(e)
            })
    })
}

pub async fn comments_sse(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let screen = CommentsScreen::open(state.services_for(&headers)?, &post_id);
    tracing::info!("SSE Connected: comments post={}", post_id);
    let render = screen.render().clone();
    // the stream owns the screen; the client disconnecting drops both
    let stream = view_events(&render, "comments", move || screen.view());
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

pub async fn inbox_sse(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let services = state.services_for(&headers)?;
    let screen = InboxScreen::subscribe(services, state.inbox_page_size).map_err(reject)?;
    tracing::info!("SSE Connected: inbox");
    let render = screen.render().clone();
    let stream = view_events(&render, "inbox", move || screen.view());
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
