//! Post detail comments: live thread, optimistic submit, comment likes.

use chrono::Utc;
use domain::thread::{display_root, SortMode, ThreadAssembler, ThreadEntry};
use domain::{
    apply_delta, Comment, Counter, Edge, EdgeKind, Error, NotificationKind, Profile, PushPayload,
    ReplyTarget, Result,
};
use futures::future;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use storage::collections::{COMMENTS, POSTS, PROFILES};
use storage::{decode_all, Direction, DocumentStore, Query, Snapshot, Subscription, TxnExt};
use tracing::{error, info, warn};

use crate::live::{spawn_listener, Listener, LiveList, RenderSignal};
use crate::optimistic::{load_post, run_toggle, OptimisticTarget, ToggleOutcome, ToggleReceipt};
use crate::services::Services;

const PREVIEW_CHARS: usize = 80;

pub(crate) fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

pub fn comments_query(post_id: &str) -> Query {
    Query::collection(COMMENTS)
        .where_eq("post_id", post_id)
        .order_by("created_at", Direction::Asc)
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentsView {
    pub post_id: String,
    pub sort: SortMode,
    pub entries: Vec<ThreadEntry>,
    /// Comment ids the viewer likes.
    pub liked: Vec<String>,
    pub pending: usize,
    pub loading: bool,
    pub error: Option<String>,
}

struct CommentsState {
    comments: LiveList<Comment>,
    liked: HashSet<String>,
    assembler: ThreadAssembler,
    in_flight: HashSet<String>,
}

impl CommentsState {
    /// Store order (oldest first), then placeholders in submission order.
    fn visible(&self) -> Vec<Comment> {
        self.comments.merged()
    }

    fn set_like_count(&mut self, comment_id: &str, value: u64) -> Option<u64> {
        let comment = self.comments.items_mut().find(|c| c.id == comment_id)?;
        Some(std::mem::replace(&mut comment.like_count, value))
    }
}

pub struct CommentsShared {
    state: Mutex<CommentsState>,
    render: RenderSignal,
}

impl CommentsShared {
    fn lock(&self) -> MutexGuard<'_, CommentsState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply_comments(&self, snapshot: Snapshot) {
        self.lock().comments.apply_snapshot(snapshot, "comments");
        self.render.bump();
    }

    fn apply_likes(&self, snapshot: Snapshot) {
        let edges = match snapshot.and_then(decode_all::<Edge>) {
            Ok(edges) => edges,
            Err(e) => {
                error!("Listener for comment likes failed: {}", e);
                return;
            }
        };
        let mut state = self.lock();
        let mut liked: HashSet<String> = edges.into_iter().map(|e| e.target).collect();
        // pending toggles keep their optimistic value
        for id in &state.in_flight {
            if state.liked.contains(id) {
                liked.insert(id.clone());
            } else {
                liked.remove(id);
            }
        }
        state.liked = liked;
        drop(state);
        self.render.bump();
    }
}

pub struct LikeCheckpoint {
    liked: bool,
    like_count: Option<u64>,
}

impl OptimisticTarget for CommentsShared {
    type Checkpoint = LikeCheckpoint;

    fn begin(&self, _: EdgeKind, target: &str) -> Option<LikeCheckpoint> {
        let mut state = self.lock();
        if !state.in_flight.insert(target.to_string()) {
            return None;
        }
        let liked = state.liked.contains(target);
        if liked {
            state.liked.remove(target);
        } else {
            state.liked.insert(target.to_string());
        }
        let current = state
            .comments
            .items_mut()
            .find(|c| c.id == target)
            .map(|c| c.like_count);
        let like_count = current.and_then(|count| {
            let delta = if liked { -1 } else { 1 };
            state.set_like_count(target, apply_delta(count, delta))
        });
        drop(state);
        self.render.bump();
        Some(LikeCheckpoint { liked, like_count })
    }

    fn settle(&self, _: EdgeKind, target: &str, receipt: &ToggleReceipt) {
        let mut state = self.lock();
        state.in_flight.remove(target);
        if receipt.active {
            state.liked.insert(target.to_string());
        } else {
            state.liked.remove(target);
        }
        if let Some(count) = receipt.counter {
            state.set_like_count(target, count);
        }
        drop(state);
        self.render.bump();
    }

    fn rollback(&self, _: EdgeKind, target: &str, checkpoint: LikeCheckpoint) {
        let mut state = self.lock();
        state.in_flight.remove(target);
        if checkpoint.liked {
            state.liked.insert(target.to_string());
        } else {
            state.liked.remove(target);
        }
        if let Some(count) = checkpoint.like_count {
            state.set_like_count(target, count);
        }
        drop(state);
        self.render.bump();
    }
}

pub struct CommentsScreen<S> {
    services: Services<S>,
    post_id: String,
    shared: Arc<CommentsShared>,
    _listeners: Vec<Listener>,
}

impl<S: DocumentStore> CommentsScreen<S> {
    /// Subscribes to the post's comments and, when signed in, to the viewer's comment likes.
    pub fn open(services: Services<S>, post_id: &str) -> Self {
        let comments = services.store.subscribe(comments_query(post_id));
        let likes = services.actor().map(|actor| {
            services.store.subscribe(
                Query::collection(EdgeKind::CommentLike.collection())
                    .where_eq("actor", actor.as_str()),
            )
        });
        Self::attach(services, post_id, comments, likes)
    }

    pub fn attach(
        services: Services<S>,
        post_id: &str,
        comments: Subscription,
        likes: Option<Subscription>,
    ) -> Self {
        let shared = Arc::new(CommentsShared {
            state: Mutex::new(CommentsState {
                comments: LiveList::new(),
                liked: HashSet::new(),
                assembler: ThreadAssembler::new(SortMode::Newest),
                in_flight: HashSet::new(),
            }),
            render: RenderSignal::default(),
        });

        let mut listeners = Vec::with_capacity(2);
        let target = shared.clone();
        listeners.push(spawn_listener(comments, move |snapshot| {
            target.apply_comments(snapshot);
            future::ready(())
        }));
        if let Some(likes) = likes {
            let target = shared.clone();
            listeners.push(spawn_listener(likes, move |snapshot| {
                target.apply_likes(snapshot);
                future::ready(())
            }));
        }

        Self {
            services,
            post_id: post_id.to_string(),
            shared,
            _listeners: listeners,
        }
    }

    pub fn render(&self) -> &RenderSignal {
        &self.shared.render
    }

    pub fn view(&self) -> CommentsView {
        let mut state = self.shared.lock();
        let visible = state.visible();
        let entries = if state.comments.is_loading() {
            state.assembler.preview(&visible)
        } else {
            state.assembler.assemble(&visible)
        };
        let mut liked: Vec<String> = state.liked.iter().cloned().collect();
        liked.sort();
        CommentsView {
            post_id: self.post_id.clone(),
            sort: state.assembler.mode(),
            entries,
            liked,
            pending: state.comments.pending().len(),
            loading: state.comments.is_loading(),
            error: state.comments.error().map(|e| e.user_message()),
        }
    }

    /// Waits for the first comments snapshot.
    pub async fn ready(&self) {
        let shared = &self.shared;
        shared
            .render
            .wait_for(|| !shared.lock().comments.is_loading())
            .await;
    }

    pub fn set_sort(&self, mode: SortMode) {
        self.shared.lock().assembler.set_mode(mode);
        self.shared.render.bump();
    }

    pub fn refresh_ranking(&self) {
        self.shared.lock().assembler.refresh_ranking();
        self.shared.render.bump();
    }

    /// Returns whether the replies are now shown.
    pub fn toggle_replies(&self, root_id: &str) -> bool {
        let expanded = self.shared.lock().assembler.toggle_expanded(root_id);
        self.shared.render.bump();
        expanded
    }

    /// Posts a comment, or a reply when `reply_to` names a visible comment.
    /// Replies attach to the root the target displays under.
    pub async fn submit(&self, text: &str, reply_to: Option<&str>) -> Result<Comment> {
        let actor = self.services.require_actor()?;
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(Error::InvalidInput("Comment cannot be empty.".to_string()));
        }
        let (parent_id, replying_to) = match reply_to {
            Some(id) => {
                let visible = self.shared.lock().visible();
                let target = visible
                    .iter()
                    .find(|c| c.id == id)
                    .ok_or_else(|| Error::NotFound("comment".to_string()))?;
                let root = display_root(&visible, id).unwrap_or(id).to_string();
                let replying_to = ReplyTarget {
                    author_id: target.author_id.clone(),
                    author_name: target.author_name.clone(),
                    comment_id: target.id.clone(),
                };
                (Some(root), Some(replying_to))
            }
            None => (None, None),
        };

        let token = format!("local-{}", self.services.store.generate_id());
        let placeholder = Comment {
            id: token.clone(),
            post_id: self.post_id.clone(),
            author_id: actor.clone(),
            author_name: actor.to_string(),
            text,
            parent_id: parent_id.clone(),
            replying_to,
            like_count: 0,
            created_at: Utc::now(),
            client_token: Some(token.clone()),
        };
        {
            let mut state = self.shared.lock();
            state.comments.push_pending(placeholder.clone());
            if let Some(root) = &parent_id {
                state.assembler.expand(root);
            }
        }
        self.shared.render.bump();

        let draft = placeholder;
        let result = self
            .services
            .store
            .transaction(move |txn| {
                let mut post = load_post(txn, &draft.post_id)?;
                let author_name = txn
                    .get_as::<Profile>(PROFILES, draft.author_id.as_str())?
                    .map(|p| p.name().to_string())
                    .unwrap_or_else(|| draft.author_id.to_string());
                let mut comment = draft.clone();
                comment.id = txn.generate_id();
                comment.author_name = author_name;
                txn.set_as(COMMENTS, &comment.id, &comment)?;
                post.adjust(Counter::Comments, 1);
                txn.set_as(POSTS, &post.id, &post)?;
                Ok((comment, post.author_id))
            })
            .await;

        match result {
            Ok((comment, post_author)) => {
                self.shared
                    .lock()
                    .comments
                    .confirm_pending(&token, comment.clone());
                self.shared.render.bump();
                info!(post_id = %self.post_id, comment_id = %comment.id, "Comment posted");
                let (recipient, kind) = match &comment.replying_to {
                    Some(target) => (target.author_id.clone(), NotificationKind::Reply),
                    None => (post_author, NotificationKind::Comment),
                };
                let payload = PushPayload::new(kind, actor, Some(self.post_id.clone()))
                    .with_preview(preview(&comment.text));
                self.services.notifier.notify(&recipient, payload);
                Ok(comment)
            }
            Err(e) => {
                self.shared.lock().comments.discard_pending(&token);
                self.shared.render.bump();
                warn!(post_id = %self.post_id, "Comment failed, placeholder removed: {}", e);
                self.services.surface("Couldn't post comment", &e);
                Err(e)
            }
        }
    }

    pub async fn toggle_comment_like(&self, comment_id: &str) -> Result<ToggleOutcome> {
        run_toggle(&self.services, &*self.shared, EdgeKind::CommentLike, comment_id).await
    }

    /// Author only. Replies go with their root.
    pub async fn delete_comment(&self, comment_id: &str) -> Result<usize> {
        let actor = self.services.require_actor()?;
        match remove_comment(&self.services, &actor, comment_id).await {
            Ok(removed) => {
                info!(post_id = %self.post_id, comment_id, removed, "Comment deleted");
                Ok(removed)
            }
            Err(e) => {
                warn!(comment_id, "Comment delete failed: {}", e);
                self.services.surface("Couldn't delete comment", &e);
                Err(e)
            }
        }
    }
}

async fn remove_comment<S: DocumentStore>(
    services: &Services<S>,
    actor: &domain::ActorId,
    comment_id: &str,
) -> Result<usize> {
    let replies: Vec<Comment> = services
        .store
        .query_as(&Query::collection(COMMENTS).where_eq("parent_id", comment_id))
        .await?;
    let actor = actor.clone();
    let comment_id = comment_id.to_string();
    let reply_ids: Vec<String> = replies.into_iter().map(|c| c.id).collect();

    services
        .store
        .transaction(move |txn| {
            let comment: Comment = txn
                .get_as(COMMENTS, &comment_id)?
                .ok_or_else(|| Error::NotFound("comment".to_string()))?;
            if comment.author_id != actor {
                return Err(Error::PermissionDenied(
                    "only the author can delete a comment".to_string(),
                ));
            }
            let mut removed = 0;
            for id in std::iter::once(&comment_id).chain(&reply_ids) {
                if txn.exists(COMMENTS, id) {
                    txn.delete(COMMENTS, id);
                    removed += 1;
                }
            }
            if let Some(mut post) = txn.get_as::<domain::Post>(POSTS, &comment.post_id)? {
                post.adjust(Counter::Comments, -(removed as i64));
                txn.set_as(POSTS, &post.id, &post)?;
            }
            Ok(removed)
        })
        .await
}

/// One-shot thread read, all replies collapsed.
pub async fn fetch_thread<S: DocumentStore>(
    store: &S,
    post_id: &str,
    mode: SortMode,
) -> Result<Vec<ThreadEntry>> {
    let comments: Vec<Comment> = store.query_as(&comments_query(post_id)).await?;
    Ok(ThreadAssembler::new(mode).assemble(&comments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{comment, wait_until, Harness};
    use chrono::Duration;
    use serde_json::to_value;

    fn ids(view: &CommentsView) -> Vec<String> {
        view.entries
            .iter()
            .filter_map(|e| match e {
                ThreadEntry::Comment { comment, .. } => Some(comment.id.clone()),
                ThreadEntry::Toggle { .. } => None,
            })
            .collect()
    }

    async fn opened(h: &Harness, post_id: &str) -> CommentsScreen<storage::MemoryStore> {
        let screen = CommentsScreen::open(h.services.clone(), post_id);
        wait_until(|| !screen.view().loading).await;
        screen
    }

    #[tokio::test]
    async fn placeholder_is_replaced_by_the_confirmed_comment() {
        let h = Harness::signed_in("bob").await;
        h.seed_post("p1", "alice", 0).await;
        let screen = opened(&h, "p1").await;

        let confirmed = screen.submit("  hello  ", None).await.unwrap();
        assert_eq!(confirmed.text, "hello");
        wait_until(|| ids(&screen.view()) == vec![confirmed.id.clone()]).await;
        assert_eq!(screen.view().pending, 0);

        let post = h.post("p1").await;
        assert_eq!(post.comment_count, 1);
        assert_eq!(post.engagement(), 1);

        wait_until(|| !h.push.sent().is_empty()).await;
        let (recipient, payload) = h.push.sent().remove(0);
        assert_eq!(recipient.as_str(), "alice");
        assert_eq!(payload.kind, NotificationKind::Comment);
        assert_eq!(payload.preview.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn failed_submit_drops_the_placeholder() {
        let h = Harness::signed_in("bob").await;
        h.seed_post("p1", "alice", 0).await;
        let screen = opened(&h, "p1").await;

        h.store.set_offline(true);
        assert!(screen.submit("hello", None).await.is_err());
        let view = screen.view();
        assert_eq!(view.pending, 0);
        assert!(view.entries.is_empty());
        assert_eq!(h.feedback.alerts().len(), 1);
    }

    #[tokio::test]
    async fn reply_to_a_reply_attaches_to_the_root() {
        let h = Harness::signed_in("bob").await;
        h.seed_post("p1", "alice", 0).await;
        h.seed_comment(&comment("c1", "p1", "alice", None)).await;
        h.seed_comment(&comment("c2", "p1", "carol", Some("c1"))).await;
        let screen = opened(&h, "p1").await;
        wait_until(|| screen.view().entries.len() == 2).await;

        let reply = screen.submit("agreed", Some("c2")).await.unwrap();
        assert_eq!(reply.parent_id.as_deref(), Some("c1"));
        assert_eq!(reply.replying_to.as_ref().unwrap().author_id.as_str(), "carol");

        // the root was expanded for the new reply
        wait_until(|| ids(&screen.view()).len() == 3).await;
        assert_eq!(ids(&screen.view())[0], "c1");

        wait_until(|| !h.push.sent().is_empty()).await;
        let (recipient, payload) = h.push.sent().remove(0);
        assert_eq!(recipient.as_str(), "carol");
        assert_eq!(payload.kind, NotificationKind::Reply);
    }

    #[tokio::test]
    async fn top_order_stays_frozen_across_snapshots() {
        let h = Harness::signed_in("bob").await;
        let (feed, subscription) = Subscription::channel(4);
        let screen = CommentsScreen::attach(h.services.clone(), "p1", subscription, None);
        screen.set_sort(SortMode::Top);

        let base = Utc::now();
        let mut a = comment("a", "p1", "alice", None);
        a.like_count = 5;
        a.created_at = base - Duration::minutes(10);
        let mut b = comment("b", "p1", "alice", None);
        b.like_count = 1;
        b.created_at = base - Duration::minutes(8);
        let mut c = comment("c", "p1", "alice", None);
        c.like_count = 5;
        c.created_at = base - Duration::minutes(5);
        let r1 = comment("r1", "p1", "carol", Some("a"));
        let r2 = comment("r2", "p1", "carol", Some("a"));
        let docs = |list: &[&Comment]| -> Snapshot {
            Ok(list.iter().map(|c| to_value(c).unwrap()).collect())
        };

        feed.emit(docs(&[&a, &b, &c, &r1, &r2])).await;
        wait_until(|| ids(&screen.view()) == vec!["a", "c", "b"]).await;

        let mut d = comment("d", "p1", "alice", None);
        d.like_count = 50;
        feed.emit(docs(&[&a, &b, &c, &r1, &r2, &d])).await;
        wait_until(|| ids(&screen.view()) == vec!["a", "c", "b", "d"]).await;

        screen.refresh_ranking();
        assert_eq!(ids(&screen.view()), vec!["d", "a", "c", "b"]);

        assert!(screen.toggle_replies("a"));
        assert_eq!(ids(&screen.view()), vec!["d", "a", "r1", "r2", "c", "b"]);
    }

    #[tokio::test]
    async fn top_ranking_waits_for_the_first_snapshot() {
        let h = Harness::signed_in("bob").await;
        let (feed, subscription) = Subscription::channel(4);
        let screen = CommentsScreen::attach(h.services.clone(), "p1", subscription, None);
        screen.set_sort(SortMode::Top);
        let early = screen.view();
        assert!(early.loading);
        assert!(early.entries.is_empty());

        let mut quiet = comment("quiet", "p1", "alice", None);
        quiet.like_count = 1;
        quiet.created_at = Utc::now() - Duration::minutes(10);
        let mut liked = comment("liked", "p1", "alice", None);
        liked.like_count = 5;
        liked.created_at = Utc::now() - Duration::minutes(5);
        let docs: Snapshot = Ok(vec![to_value(&quiet).unwrap(), to_value(&liked).unwrap()]);
        feed.emit(docs).await;

        wait_until(|| !screen.view().loading).await;
        assert_eq!(ids(&screen.view()), vec!["liked", "quiet"]);
    }

    #[tokio::test]
    async fn newest_lists_oldest_first_with_placeholders_last() {
        let h = Harness::with_latency("bob", std::time::Duration::from_millis(50)).await;
        h.seed_post("p1", "alice", 0).await;
        let mut old = comment("old", "p1", "alice", None);
        old.created_at = Utc::now() - Duration::minutes(10);
        let mut new = comment("new", "p1", "carol", None);
        new.created_at = Utc::now() - Duration::minutes(1);
        h.seed_comment(&new).await;
        h.seed_comment(&old).await;
        let screen = opened(&h, "p1").await;
        wait_until(|| ids(&screen.view()) == vec!["old", "new"]).await;

        let submit = screen.submit("latest", None);
        let check = async {
            wait_until(|| screen.view().pending == 1).await;
            let order = ids(&screen.view());
            assert_eq!(&order[..2], &["old".to_string(), "new".to_string()]);
            assert!(order[2].starts_with("local-"));
        };
        let (posted, ()) = tokio::join!(submit, check);
        let posted = posted.unwrap();
        assert_eq!(ids(&screen.view()), vec!["old".to_string(), "new".to_string(), posted.id]);

        let entries = fetch_thread(&*h.store, "p1", SortMode::Newest).await.unwrap();
        let fetched: Vec<String> = entries
            .iter()
            .filter_map(|e| match e {
                ThreadEntry::Comment { comment, .. } => Some(comment.id.clone()),
                ThreadEntry::Toggle { .. } => None,
            })
            .collect();
        assert_eq!(&fetched[..2], &["old".to_string(), "new".to_string()]);
    }

    #[tokio::test]
    async fn reply_to_a_promoted_orphan_nests_under_it() {
        let h = Harness::signed_in("bob").await;
        h.seed_post("p1", "alice", 0).await;
        h.seed_comment(&comment("orphan", "p1", "alice", Some("gone"))).await;
        let screen = opened(&h, "p1").await;
        wait_until(|| ids(&screen.view()) == vec!["orphan"]).await;

        let reply = screen.submit("still here", Some("orphan")).await.unwrap();
        assert_eq!(reply.parent_id.as_deref(), Some("orphan"));
        let view = screen.view();
        assert_eq!(ids(&view), vec!["orphan".to_string(), reply.id.clone()]);
        assert!(matches!(
            &view.entries[1],
            ThreadEntry::Toggle { reply_count: 1, expanded: true, .. }
        ));
    }

    #[tokio::test]
    async fn comment_like_round_trip() {
        let h = Harness::signed_in("bob").await;
        h.seed_post("p1", "alice", 0).await;
        h.seed_comment(&comment("c1", "p1", "alice", None)).await;
        let screen = opened(&h, "p1").await;
        wait_until(|| screen.view().entries.len() == 1).await;

        screen.toggle_comment_like("c1").await.unwrap();
        let view = screen.view();
        assert_eq!(view.liked, vec!["c1".to_string()]);
        assert_eq!(h.stored_comment("c1").await.unwrap().like_count, 1);

        wait_until(|| !h.push.sent().is_empty()).await;
        assert_eq!(h.push.sent()[0].1.kind, NotificationKind::CommentLike);
    }

    #[tokio::test]
    async fn deleting_a_root_takes_its_replies() {
        let h = Harness::signed_in("bob").await;
        h.seed_post("p1", "alice", 0).await;
        let screen = opened(&h, "p1").await;
        let root = screen.submit("first", None).await.unwrap();
        wait_until(|| ids(&screen.view()) == vec![root.id.clone()]).await;

        h.sign_in_as("alice");
        let reply = screen.submit("second", Some(&root.id)).await.unwrap();
        assert_eq!(h.post("p1").await.comment_count, 2);

        let err = screen.delete_comment(&root.id).await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));

        h.sign_in_as("bob");
        assert_eq!(screen.delete_comment(&root.id).await.unwrap(), 2);
        assert!(h.stored_comment(&reply.id).await.is_none());
        let post = h.post("p1").await;
        assert_eq!(post.comment_count, 0);
        assert_eq!(post.engagement(), 0);
        wait_until(|| screen.view().entries.is_empty()).await;
    }

    #[tokio::test]
    async fn fetch_thread_reads_once() {
        let h = Harness::signed_out().await;
        h.seed_comment(&comment("c1", "p1", "alice", None)).await;
        h.seed_comment(&comment("c2", "p1", "alice", Some("c1"))).await;
        let entries = fetch_thread(&*h.store, "p1", SortMode::Newest).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(
            &entries[1],
            ThreadEntry::Toggle { reply_count: 1, expanded: false, .. }
        ));
    }
}
