//! Recording fakes and a store-backed harness shared by the engine tests.

use anyhow::bail;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use domain::{
    ActorId, Comment, Conversation, Edge, EdgeKind, MediaBlob, ParticipantInfo, Post, Profile,
    PushPayload,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storage::collections::{COMMENTS, CONVERSATIONS, POSTS, PROFILES};
use storage::{DocumentStore, MemoryStore, Write};

use crate::notify::{Notifier, RetryPolicy};
use crate::services::Services;
use crate::session::StaticSession;
use crate::traits::{HapticCue, MediaUploader, PushDispatcher, UiFeedback};

#[derive(Default)]
pub struct RecordingPush {
    sent: Mutex<Vec<(ActorId, PushPayload)>>,
    attempts: AtomicUsize,
    fail: bool,
}

impl RecordingPush {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(ActorId, PushPayload)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushDispatcher for RecordingPush {
    async fn dispatch(&self, recipient: &ActorId, payload: &PushPayload) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("push gateway unreachable");
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.clone(), payload.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingFeedback {
    haptics: Mutex<Vec<HapticCue>>,
    alerts: Mutex<Vec<(String, String)>>,
}

impl RecordingFeedback {
    pub fn haptics(&self) -> Vec<HapticCue> {
        self.haptics.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> Vec<(String, String)> {
        self.alerts.lock().unwrap().clone()
    }
}

impl UiFeedback for RecordingFeedback {
    fn haptic(&self, cue: HapticCue) {
        self.haptics.lock().unwrap().push(cue);
    }

    fn alert(&self, title: &str, message: &str) {
        self.alerts
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }
}

#[derive(Default)]
pub struct FakeMedia {
    fail: AtomicBool,
    uploads: AtomicUsize,
}

impl FakeMedia {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaUploader for FakeMedia {
    async fn upload(&self, blob: &MediaBlob) -> anyhow::Result<String> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            bail!("bucket rejected {} bytes", blob.bytes.len());
        }
        Ok(format!("https://media.test/{}", n))
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub session: Arc<StaticSession>,
    pub push: Arc<RecordingPush>,
    pub feedback: Arc<RecordingFeedback>,
    pub media: Arc<FakeMedia>,
    pub services: Services<MemoryStore>,
}

impl Harness {
    fn build(actor: Option<&str>, latency: Duration, push: RecordingPush) -> Self {
        let store = Arc::new(MemoryStore::with_latency(latency));
        let session = Arc::new(StaticSession::new(actor.map(ActorId::new_unchecked)));
        let push = Arc::new(push);
        let feedback = Arc::new(RecordingFeedback::default());
        let media = Arc::new(FakeMedia::default());
        let policy = RetryPolicy {
            max_attempts: 2,
            backoff: Duration::from_millis(1),
        };
        let services = Services {
            store: store.clone(),
            auth: session.clone(),
            media: media.clone(),
            feedback: feedback.clone(),
            notifier: Notifier::new(push.clone(), policy),
        };
        Self {
            store,
            session,
            push,
            feedback,
            media,
            services,
        }
    }

    async fn with_profile(self, actor: &str) -> Self {
        self.seed_profile(actor).await;
        self
    }

    pub async fn signed_in(actor: &str) -> Self {
        Self::build(Some(actor), Duration::ZERO, RecordingPush::default())
            .with_profile(actor)
            .await
    }

    pub async fn signed_out() -> Self {
        Self::build(None, Duration::ZERO, RecordingPush::default())
    }

    pub async fn with_latency(actor: &str, latency: Duration) -> Self {
        Self::build(Some(actor), latency, RecordingPush::default())
            .with_profile(actor)
            .await
    }

    pub async fn signed_in_with_failing_push(actor: &str) -> Self {
        Self::build(Some(actor), Duration::ZERO, RecordingPush::failing())
            .with_profile(actor)
            .await
    }

    pub fn sign_in_as(&self, actor: &str) {
        self.session.sign_in(ActorId::new_unchecked(actor));
    }

    async fn put<T: serde::Serialize>(&self, collection: &str, id: &str, doc: &T) {
        self.store
            .batch(vec![Write::set(collection, id, doc).unwrap()])
            .await
            .unwrap();
    }

    pub async fn seed_profile(&self, id: &str) -> Profile {
        let profile = Profile::new(ActorId::new_unchecked(id), id);
        self.put(PROFILES, id, &profile).await;
        profile
    }

    pub async fn seed_post(&self, id: &str, author: &str, likes: u64) -> Post {
        let mut post = Post::new(id, ActorId::new_unchecked(author), format!("post {}", id));
        post.like_count = likes;
        post.engagement_count = Some(likes);
        self.put(POSTS, id, &post).await;
        post
    }

    /// Post written before the engagement aggregate existed: two likes, one repost.
    pub async fn seed_legacy_post(&self, id: &str, author: &str) {
        let doc = json!({
            "id": id,
            "author_id": author,
            "text": "old post",
            "like_count": 2,
            "repost_count": 1,
            "created_at": 1_600_000_000_000i64,
        });
        self.put(POSTS, id, &doc).await;
    }

    pub async fn seed_comment(&self, comment: &Comment) {
        self.put(COMMENTS, &comment.id, comment).await;
    }

    pub async fn seed_edge(&self, kind: EdgeKind, actor: &str, target: &str) {
        let edge = Edge::new(ActorId::new_unchecked(actor), target);
        let id = domain::edge_doc_id(&edge.actor, target);
        self.put(kind.collection(), &id, &edge).await;
    }

    pub async fn seed_conversation(&self, a: &str, b: &str) -> Conversation {
        let (a, b) = (ActorId::new_unchecked(a), ActorId::new_unchecked(b));
        let info = |id: &ActorId| ParticipantInfo {
            username: id.to_string(),
            avatar_url: None,
        };
        let conversation = Conversation {
            id: Conversation::id_for(&a, &b),
            participant_info: HashMap::from([(a.clone(), info(&a)), (b.clone(), info(&b))]),
            unread: HashMap::from([(a.clone(), 0), (b.clone(), 0)]),
            participants: vec![a, b],
            last_message: Some("hey".to_string()),
            last_activity_at: Utc::now(),
        };
        self.put(CONVERSATIONS, &conversation.id, &conversation).await;
        conversation
    }

    pub async fn post(&self, id: &str) -> Post {
        self.store.get_as(POSTS, id).await.unwrap().unwrap()
    }

    pub async fn profile(&self, id: &str) -> Profile {
        self.store.get_as(PROFILES, id).await.unwrap().unwrap()
    }

    pub async fn conversation(&self, id: &str) -> Conversation {
        self.store.get_as(CONVERSATIONS, id).await.unwrap().unwrap()
    }

    pub async fn stored_comment(&self, id: &str) -> Option<Comment> {
        self.store.get_as(COMMENTS, id).await.unwrap()
    }

    pub async fn edge_exists(&self, kind: EdgeKind, actor: &str, target: &str) -> bool {
        let id = domain::edge_doc_id(&ActorId::new_unchecked(actor), target);
        self.store.exists(kind.collection(), &id).await.unwrap()
    }
}

/// Root or reply written a minute ago.
pub fn comment(id: &str, post_id: &str, author: &str, parent: Option<&str>) -> Comment {
    Comment {
        id: id.to_string(),
        post_id: post_id.to_string(),
        author_id: ActorId::new_unchecked(author),
        author_name: author.to_string(),
        text: format!("comment {}", id),
        parent_id: parent.map(str::to_string),
        replying_to: None,
        like_count: 0,
        created_at: Utc::now() - ChronoDuration::seconds(60),
        client_token: None,
    }
}

/// Polls `cond` until it holds, failing the test after two seconds.
pub async fn wait_until(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
