use super::handlers::{comments, conversations, inbox, media, notifications, posts, profiles, sse};
use crate::state::AppState;
use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const METHODS: [Method; 4] = [Method::GET, Method::POST, Method::PUT, Method::DELETE];

pub fn build_router(state: AppState, allowed_origins: &str) -> Router {
    let cors = if allowed_origins == "*" {
        CorsLayer::new()
            .allow_methods(METHODS)
            .allow_origin(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse::<HeaderValue>().ok())
            .collect();

        if origins.is_empty() {
            tracing::warn!("CORS config is invalid or empty, falling back to allow ANY.");
            CorsLayer::new()
                .allow_methods(METHODS)
                .allow_origin(Any)
                .allow_headers(Any)
        } else {
            tracing::info!("CORS enabled for origins: {:?}", origins);
            CorsLayer::new()
                .allow_methods(METHODS)
                .allow_origin(origins)
                .allow_headers(Any)
        }
    };

    Router::new()
        .route("/api/posts", post(posts::create_post))
        .route("/api/posts/:post_id", get(posts::get_post).put(posts::edit_post))
        .route("/api/posts/:post_id/toggle/:kind", post(posts::toggle))
        .route("/api/posts/:post_id/actions", post(posts::run_action))
        .route(
            "/api/posts/:post_id/comments",
            get(comments::list_comments).post(comments::post_comment),
        )
        .route("/api/posts/:post_id/comments/view", get(comments::comments_view))
        .route("/api/posts/:post_id/comments/sse", get(sse::comments_sse))
        .route(
            "/api/posts/:post_id/comments/:comment_id",
            axum::routing::delete(comments::delete_comment),
        )
        .route(
            "/api/posts/:post_id/comments/:comment_id/like",
            post(comments::like_comment),
        )
        .route("/api/profiles/:profile_id", get(profiles::get_profile))
        .route("/api/profiles/:profile_id/actions", post(profiles::run_action))
        .route("/api/inbox", get(inbox::get_inbox))
        .route("/api/inbox/sse", get(sse::inbox_sse))
        .route("/api/conversations", post(conversations::start))
        .route("/api/conversations/:conversation_id", get(conversations::open))
        .route(
            "/api/conversations/:conversation_id/messages",
            post(conversations::send_message),
        )
        .route("/api/notifications", get(notifications::list_notifications))
        .route("/media/:key", get(media::get_media))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
