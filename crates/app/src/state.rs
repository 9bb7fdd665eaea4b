use axum::http::{HeaderMap, StatusCode};
use domain::ActorId;
use engine::{Notifier, PendingEdges, RetryPolicy, Services, StaticSession};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storage::MemoryStore;

use crate::config::Settings;
use crate::feedback::LogFeedback;
use crate::media::MemoryMedia;
use crate::push::OutboxPush;

pub const ACTOR_HEADER: &str = "x-actor-id";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub default_actor: Option<ActorId>,
    pub media: Arc<MemoryMedia>,
    pub push: Arc<OutboxPush>,
    pub notifier: Notifier,
    pub inbox_page_size: usize,
    // in-flight edges per actor, shared by every request of that actor
    pub pending: Arc<Mutex<HashMap<ActorId, Arc<PendingEdges>>>>,
}

impl AppState {
    pub fn new(store: Arc<MemoryStore>, settings: &Settings) -> anyhow::Result<Self> {
        let default_actor = settings
            .session
            .actor_id
            .as_deref()
            .map(ActorId::new)
            .transpose()
            .map_err(|e| anyhow::anyhow!("Invalid session.actor_id: {}", e))?;
        let push = Arc::new(OutboxPush::default());
        let notifier = Notifier::new(
            push.clone(),
            RetryPolicy {
                max_attempts: settings.notifications.max_attempts.max(1),
                backoff: Duration::from_millis(settings.notifications.backoff_ms),
            },
        );
        Ok(Self {
            store,
            default_actor,
            media: Arc::new(MemoryMedia::new(
                settings.media.max_bytes,
                &settings.media.public_base_url,
            )),
            push,
            notifier,
            inbox_page_size: settings.inbox.page_size.max(1),
            pending: Arc::default(),
        })
    }

    pub fn pending_for(&self, actor: &ActorId) -> Arc<PendingEdges> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(actor.clone())
            .or_default()
            .clone()
    }

    /// Resolves the request's actor: the header wins, the configured session is the fallback.
    pub fn actor_for(&self, headers: &HeaderMap) -> Result<Option<ActorId>, (StatusCode, String)> {
        match headers.get(ACTOR_HEADER) {
            Some(raw) => {
                let raw = raw.to_str().map_err(|_| {
                    (StatusCode::BAD_REQUEST, format!("{} is not valid text", ACTOR_HEADER))
                })?;
                ActorId::new(raw)
                    .map(Some)
                    .map_err(|e| (StatusCode::BAD_REQUEST, e))
            }
            None => Ok(self.default_actor.clone()),
        }
    }

    pub fn services_for(
        &self,
        headers: &HeaderMap,
    ) -> Result<Services<MemoryStore>, (StatusCode, String)> {
        let actor = self.actor_for(headers)?;
        Ok(Services {
            store: self.store.clone(),
            auth: Arc::new(StaticSession::new(actor)),
            media: self.media.clone(),
            feedback: Arc::new(LogFeedback),
            notifier: self.notifier.clone(),
        })
    }
}

#[cfg(test)]
pub(crate) fn test_state(default_actor: Option<&str>) -> AppState {
    let push = Arc::new(OutboxPush::default());
    AppState {
        store: Arc::new(MemoryStore::new()),
        default_actor: default_actor.map(ActorId::new_unchecked),
        media: Arc::new(MemoryMedia::new(1024, "http://cdn.test")),
        notifier: Notifier::new(push.clone(), RetryPolicy::default()),
        push,
        inbox_page_size: engine::DEFAULT_PAGE_SIZE,
        pending: Arc::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_overrides_the_configured_session() {
        let state = test_state(Some("alice"));
        let mut headers = HeaderMap::new();
        assert_eq!(
            state.actor_for(&headers).unwrap(),
            Some(ActorId::new_unchecked("alice"))
        );

        headers.insert(ACTOR_HEADER, HeaderValue::from_static("bob"));
        let services = state.services_for(&headers).unwrap();
        assert_eq!(services.actor(), Some(ActorId::new_unchecked("bob")));
    }

    #[test]
    fn pending_edges_are_shared_per_actor() {
        let state = test_state(None);
        let alice = ActorId::new_unchecked("alice");
        let first = state.pending_for(&alice);
        assert!(Arc::ptr_eq(&first, &state.clone().pending_for(&alice)));
        assert!(!Arc::ptr_eq(&first, &state.pending_for(&ActorId::new_unchecked("bob"))));
    }

    #[test]
    fn no_header_and_no_session_is_signed_out() {
        let state = test_state(None);
        assert_eq!(state.actor_for(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn malformed_actor_header_is_rejected() {
        let state = test_state(None);
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_HEADER, HeaderValue::from_static(""));
        let (status, _) = state.actor_for(&headers).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
