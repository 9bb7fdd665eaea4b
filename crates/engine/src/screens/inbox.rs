//! Message inbox. Conversations are only published after the block check,
//! so a blocked pair never reaches the rendered list. Block edges touching
//! the actor are watched too: a new block hides the pair at once and every
//! block change re-runs the check on the last received list.

use chrono::{DateTime, Utc};
use domain::{ActorId, Conversation, Edge, EdgeKind, Error, Result};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use storage::collections::CONVERSATIONS;
use storage::{decode_all, Direction, DocumentStore, Query, Snapshot, Subscription};
use tracing::{debug, error, warn};

use crate::live::{spawn_listener, Listener, RenderSignal};
use crate::relations::is_blocked_between;
use crate::screens::conversation::{mark_read, ConversationScreen};
use crate::services::Services;

pub const DEFAULT_PAGE_SIZE: usize = 50;

pub fn inbox_query(actor: &ActorId, page_size: usize) -> Query {
    Query::collection(CONVERSATIONS)
        .where_array_contains("participants", actor.as_str())
        .order_by("last_activity_at", Direction::Desc)
        .limit(page_size)
}

/// Live block edges touching the actor, one feed per direction.
pub struct BlockFeeds {
    /// Edges where the actor is the blocker.
    pub blocking: Subscription,
    /// Edges where the actor is the one blocked.
    pub blocked_by: Subscription,
}

impl BlockFeeds {
    pub fn subscribe<S: DocumentStore>(store: &S, actor: &ActorId) -> Self {
        let blocks = EdgeKind::Block.collection();
        Self {
            blocking: store.subscribe(Query::collection(blocks).where_eq("actor", actor.as_str())),
            blocked_by: store.subscribe(Query::collection(blocks).where_eq("target", actor.as_str())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockSide {
    Blocking,
    BlockedBy,
}

#[derive(Debug, Clone, Serialize)]
pub struct InboxRow {
    pub conversation_id: String,
    pub other: ActorId,
    pub username: String,
    pub avatar_url: Option<String>,
    pub last_message: Option<String>,
    pub unread: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InboxView {
    pub rows: Vec<InboxRow>,
    pub total_unread: u32,
    pub loading: bool,
    pub error: Option<String>,
}

struct InboxState {
    /// Published rows, already filtered.
    conversations: Vec<Conversation>,
    /// Last list received from the store, before filtering.
    received: Option<Vec<Conversation>>,
    blocking: HashSet<ActorId>,
    blocked_by: HashSet<ActorId>,
    /// Bumped by every filter pass; only the latest pass publishes.
    generation: u64,
    loading: bool,
    error: Option<Error>,
}

impl InboxState {
    fn blocks(&self, me: &ActorId, conversation: &Conversation) -> bool {
        conversation
            .other(me)
            .map_or(false, |o| self.blocking.contains(o) || self.blocked_by.contains(o))
    }
}

struct InboxShared {
    me: ActorId,
    state: Mutex<InboxState>,
    render: RenderSignal,
}

impl InboxShared {
    fn lock(&self) -> MutexGuard<'_, InboxState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn receive(&self, conversations: Vec<Conversation>) {
        self.lock().received = Some(conversations);
    }

    /// Starts a filter pass over the last received list.
    fn begin_pass(&self) -> Option<(u64, Vec<Conversation>)> {
        let mut state = self.lock();
        let received = state.received.clone()?;
        state.generation += 1;
        Some((state.generation, received))
    }

    fn publish(&self, generation: u64, mut conversations: Vec<Conversation>) {
        let mut state = self.lock();
        if state.generation != generation {
            debug!(generation, latest = state.generation, "Dropping superseded inbox pass");
            return;
        }
        conversations.retain(|c| !state.blocks(&self.me, c));
        state.conversations = conversations;
        state.loading = false;
        state.error = None;
        drop(state);
        self.render.bump();
    }

    /// Replaces one side of the block set and hides affected rows at once.
    fn set_blocks(&self, side: BlockSide, edges: Vec<Edge>) {
        let mut state = self.lock();
        let peers: HashSet<ActorId> = edges
            .into_iter()
            .map(|e| match side {
                BlockSide::Blocking => ActorId::new_unchecked(e.target),
                BlockSide::BlockedBy => e.actor,
            })
            .collect();
        match side {
            BlockSide::Blocking => state.blocking = peers,
            BlockSide::BlockedBy => state.blocked_by = peers,
        }
        let before = state.conversations.len();
        let mut rows = std::mem::take(&mut state.conversations);
        rows.retain(|c| !state.blocks(&self.me, c));
        state.conversations = rows;
        if state.conversations.len() != before {
            debug!(hidden = before - state.conversations.len(), "Block edge hid inbox rows");
        }
        drop(state);
        self.render.bump();
    }

    fn fail(&self, e: Error) {
        error!("Listener for inbox failed: {}", e);
        let mut state = self.lock();
        state.loading = false;
        state.error = Some(e);
        drop(state);
        self.render.bump();
    }
}

/// Drops every conversation whose pair has a block edge either way.
/// A failed check drops the conversation too.
pub async fn visible_conversations<S: DocumentStore>(
    store: &S,
    actor: &ActorId,
    conversations: Vec<Conversation>,
) -> Vec<Conversation> {
    let checks = conversations.into_iter().map(|conversation| async move {
        let Some(other) = conversation.other(actor).cloned() else {
            return Some(conversation);
        };
        match is_blocked_between(store, actor, &other).await {
            Ok(false) => Some(conversation),
            Ok(true) => {
                debug!(conversation_id = %conversation.id, "Hiding blocked conversation");
                None
            }
            Err(e) => {
                warn!(conversation_id = %conversation.id, "Block check failed, hiding: {}", e);
                None
            }
        }
    });
    join_all(checks).await.into_iter().flatten().collect()
}

/// Re-checks the last received list against the store and publishes it,
/// unless a newer pass started meanwhile.
async fn refilter<S: DocumentStore>(shared: &InboxShared, store: &S) {
    let Some((generation, received)) = shared.begin_pass() else {
        return;
    };
    let visible = visible_conversations(store, &shared.me, received).await;
    shared.publish(generation, visible);
}

pub struct InboxScreen<S> {
    services: Services<S>,
    actor: ActorId,
    shared: Arc<InboxShared>,
    _listeners: Vec<Listener>,
}

impl<S: DocumentStore> InboxScreen<S> {
    pub fn subscribe(services: Services<S>, page_size: usize) -> Result<Self> {
        let actor = services.require_actor()?;
        let subscription = services.store.subscribe(inbox_query(&actor, page_size));
        let blocks = BlockFeeds::subscribe(&*services.store, &actor);
        Ok(Self::attach(services, actor, subscription, Some(blocks)))
    }

    pub fn attach(
        services: Services<S>,
        actor: ActorId,
        conversations: Subscription,
        blocks: Option<BlockFeeds>,
    ) -> Self {
        let shared = Arc::new(InboxShared {
            me: actor.clone(),
            state: Mutex::new(InboxState {
                conversations: Vec::new(),
                received: None,
                blocking: HashSet::new(),
                blocked_by: HashSet::new(),
                generation: 0,
                loading: true,
                error: None,
            }),
            render: RenderSignal::default(),
        });

        let mut listeners = Vec::with_capacity(3);
        let target = shared.clone();
        let store = services.store.clone();
        listeners.push(spawn_listener(conversations, move |snapshot: Snapshot| {
            let target = target.clone();
            let store = store.clone();
            async move {
                match snapshot.and_then(decode_all::<Conversation>) {
                    Ok(all) => {
                        target.receive(all);
                        refilter(&target, &*store).await;
                    }
                    Err(e) => target.fail(e),
                }
            }
        }));

        if let Some(blocks) = blocks {
            for (side, feed) in [
                (BlockSide::Blocking, blocks.blocking),
                (BlockSide::BlockedBy, blocks.blocked_by),
            ] {
                let target = shared.clone();
                let store = services.store.clone();
                listeners.push(spawn_listener(feed, move |snapshot: Snapshot| {
                    let target = target.clone();
                    let store = store.clone();
                    async move {
                        match snapshot.and_then(decode_all::<Edge>) {
                            Ok(edges) => {
                                target.set_blocks(side, edges);
                                refilter(&target, &*store).await;
                            }
                            Err(e) => warn!(?side, "Block listener for inbox failed: {}", e),
                        }
                    }
                }));
            }
        }

        Self {
            services,
            actor,
            shared,
            _listeners: listeners,
        }
    }

    pub fn render(&self) -> &RenderSignal {
        &self.shared.render
    }

    pub async fn ready(&self) {
        let shared = &self.shared;
        shared.render.wait_for(|| !shared.lock().loading).await;
    }

    pub fn view(&self) -> InboxView {
        let state = self.shared.lock();
        let rows: Vec<InboxRow> = state
            .conversations
            .iter()
            .filter_map(|c| {
                let other = c.other(&self.actor)?.clone();
                let info = c.participant_info.get(&other);
                Some(InboxRow {
                    conversation_id: c.id.clone(),
                    username: info.map_or_else(|| other.to_string(), |i| i.username.clone()),
                    avatar_url: info.and_then(|i| i.avatar_url.clone()),
                    other,
                    last_message: c.last_message.clone(),
                    unread: c.unread_for(&self.actor),
                    last_activity_at: c.last_activity_at,
                })
            })
            .collect();
        InboxView {
            total_unread: rows.iter().map(|r| r.unread).sum(),
            rows,
            loading: state.loading,
            error: state.error.as_ref().map(|e| e.user_message()),
        }
    }

    /// Clears the unread badge at once, then opens the conversation.
    /// A failed read receipt puts the badge back without an alert.
    pub async fn open_conversation(&self, conversation_id: &str) -> Result<ConversationScreen<S>> {
        let previous = {
            let mut state = self.shared.lock();
            state
                .conversations
                .iter_mut()
                .find(|c| c.id == conversation_id)
                .and_then(|c| c.unread.insert(self.actor.clone(), 0))
        };
        self.shared.render.bump();

        if let Err(e) = mark_read(&self.services, conversation_id).await {
            warn!(conversation_id, "Marking read failed: {}", e);
            if let Some(count) = previous {
                let mut state = self.shared.lock();
                if let Some(c) = state.conversations.iter_mut().find(|c| c.id == conversation_id) {
                    c.unread.insert(self.actor.clone(), count);
                }
            }
            self.shared.render.bump();
        }

        ConversationScreen::open(self.services.clone(), conversation_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimistic::{run_toggle, PendingEdges};
    use crate::testing::{wait_until, Harness};
    use domain::EdgeKind;
    use serde_json::to_value;

    fn ids(view: &InboxView) -> Vec<String> {
        view.rows.iter().map(|r| r.conversation_id.clone()).collect()
    }

    #[tokio::test]
    async fn block_hides_the_conversation_for_both_sides() {
        let h = Harness::signed_in("alice").await;
        h.seed_profile("bob").await;
        h.seed_conversation("alice", "bob").await;
        h.seed_conversation("alice", "carol").await;

        let alice_inbox = InboxScreen::subscribe(h.services.clone(), DEFAULT_PAGE_SIZE).unwrap();
        wait_until(|| alice_inbox.view().rows.len() == 2).await;

        // bob's screen runs against the same store with its own session
        let bob = Harness::signed_in("bob").await;
        let bob_services = Services {
            store: h.store.clone(),
            ..bob.services.clone()
        };
        let bob_inbox = InboxScreen::subscribe(bob_services, DEFAULT_PAGE_SIZE).unwrap();
        wait_until(|| bob_inbox.view().rows.len() == 1).await;

        run_toggle(&h.services, &PendingEdges::default(), EdgeKind::Block, "bob")
            .await
            .unwrap();

        wait_until(|| ids(&alice_inbox.view()) == vec!["alice_carol"]).await;
        wait_until(|| bob_inbox.view().rows.is_empty()).await;
    }

    #[tokio::test]
    async fn unblocking_brings_the_conversation_back() {
        let h = Harness::signed_in("alice").await;
        h.seed_profile("bob").await;
        h.seed_conversation("alice", "bob").await;
        h.seed_edge(EdgeKind::Block, "alice", "bob").await;

        let inbox = InboxScreen::subscribe(h.services.clone(), DEFAULT_PAGE_SIZE).unwrap();
        inbox.ready().await;
        assert!(inbox.view().rows.is_empty());

        let guard = PendingEdges::default();
        run_toggle(&h.services, &guard, EdgeKind::Block, "bob").await.unwrap();
        assert!(!h.edge_exists(EdgeKind::Block, "alice", "bob").await);
        wait_until(|| ids(&inbox.view()) == vec!["alice_bob"]).await;
    }

    #[tokio::test]
    async fn block_edge_hides_the_row_even_if_the_store_check_passes() {
        let h = Harness::signed_in("alice").await;
        let conversation = h.seed_conversation("alice", "bob").await;
        let (conversations, subscription) = Subscription::channel(4);
        let (_, blocking) = Subscription::channel(4);
        let (blocked_by, blocked_sub) = Subscription::channel(4);
        let inbox = InboxScreen::attach(
            h.services.clone(),
            ActorId::new_unchecked("alice"),
            subscription,
            Some(BlockFeeds {
                blocking,
                blocked_by: blocked_sub,
            }),
        );

        conversations.emit(Ok(vec![to_value(&conversation).unwrap()])).await;
        wait_until(|| inbox.view().rows.len() == 1).await;

        let edge = Edge::new(ActorId::new_unchecked("bob"), "alice");
        blocked_by.emit(Ok(vec![to_value(&edge).unwrap()])).await;
        wait_until(|| inbox.view().rows.is_empty()).await;

        // a later conversation snapshot must not bring the row back
        let version = inbox.render().version();
        conversations.emit(Ok(vec![to_value(&conversation).unwrap()])).await;
        wait_until(|| inbox.render().version() > version).await;
        assert!(inbox.view().rows.is_empty());

        blocked_by.emit(Ok(Vec::new())).await;
        wait_until(|| inbox.view().rows.len() == 1).await;
    }

    #[tokio::test]
    async fn failed_block_check_fails_closed() {
        let h = Harness::signed_in("alice").await;
        let conversation = h.seed_conversation("alice", "bob").await;
        h.store.set_offline(true);

        let visible =
            visible_conversations(&*h.store, &ActorId::new_unchecked("alice"), vec![conversation])
                .await;
        assert!(visible.is_empty());
    }

    #[tokio::test]
    async fn snapshot_error_keeps_the_last_list() {
        let h = Harness::signed_in("alice").await;
        let conversation = h.seed_conversation("alice", "bob").await;
        let (feed, subscription) = Subscription::channel(4);
        let inbox = InboxScreen::attach(
            h.services.clone(),
            ActorId::new_unchecked("alice"),
            subscription,
            None,
        );

        feed.emit(Ok(vec![to_value(&conversation).unwrap()])).await;
        wait_until(|| inbox.view().rows.len() == 1).await;

        feed.emit(Err(Error::Unavailable("down".to_string()))).await;
        wait_until(|| inbox.view().error.is_some()).await;
        let view = inbox.view();
        assert_eq!(view.rows.len(), 1);
        assert!(!view.loading);
    }

    #[tokio::test]
    async fn opening_clears_unread_and_totals_follow() {
        let h = Harness::signed_in("alice").await;
        let mut conversation = h.seed_conversation("alice", "bob").await;
        conversation.unread.insert(ActorId::new_unchecked("alice"), 3);
        h.store
            .batch(vec![storage::Write::set(CONVERSATIONS, &conversation.id, &conversation).unwrap()])
            .await
            .unwrap();

        let inbox = InboxScreen::subscribe(h.services.clone(), DEFAULT_PAGE_SIZE).unwrap();
        wait_until(|| inbox.view().total_unread == 3).await;

        let screen = inbox.open_conversation(&conversation.id).await.unwrap();
        assert_eq!(inbox.view().total_unread, 0);
        assert!(screen.view().other.is_some());
        assert_eq!(
            h.conversation(&conversation.id)
                .await
                .unread_for(&ActorId::new_unchecked("alice")),
            0
        );
    }

    #[tokio::test]
    async fn page_size_caps_the_list() {
        let h = Harness::signed_in("alice").await;
        for other in ["bob", "carol", "dave"] {
            h.seed_conversation("alice", other).await;
        }
        let inbox = InboxScreen::subscribe(h.services.clone(), 2).unwrap();
        inbox.ready().await;
        assert_eq!(inbox.view().rows.len(), 2);
    }
}
