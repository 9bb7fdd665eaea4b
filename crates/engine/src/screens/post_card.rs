use domain::{Counter, CounterChange, EdgeKind, Error, Post, PostAction, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use storage::collections::POSTS;
use storage::{DocumentStore, TxnExt};
use tracing::{debug, info, warn};

use crate::live::RenderSignal;
use crate::optimistic::{
    self, run_toggle, OptimisticTarget, PendingEdges, ToggleOutcome, ToggleReceipt,
};
use crate::services::Services;
use crate::traits::HapticCue;

#[derive(Debug, Clone, Serialize)]
pub struct PostCardView {
    pub post: Post,
    pub engagement: u64,
    pub liked: bool,
    pub reposted: bool,
    pub bookmarked: bool,
    pub actions: Vec<PostAction>,
}

struct CardState {
    post: Post,
    liked: bool,
    reposted: bool,
    bookmarked: bool,
    in_flight: HashSet<EdgeKind>,
    sharing: bool,
}

impl CardState {
    fn flag_mut(&mut self, kind: EdgeKind) -> Option<&mut bool> {
        match kind {
            EdgeKind::Like => Some(&mut self.liked),
            EdgeKind::Repost => Some(&mut self.reposted),
            EdgeKind::Bookmark => Some(&mut self.bookmarked),
            _ => None,
        }
    }
}

pub struct CardShared {
    state: Mutex<CardState>,
    render: RenderSignal,
}

impl CardShared {
    fn lock(&self) -> MutexGuard<'_, CardState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct CardCheckpoint {
    flag: bool,
    change: Option<CounterChange>,
}

impl OptimisticTarget for CardShared {
    type Checkpoint = CardCheckpoint;

    fn begin(&self, kind: EdgeKind, _: &str) -> Option<CardCheckpoint> {
        let mut state = self.lock();
        if state.in_flight.contains(&kind) {
            return None;
        }
        let flag = state.flag_mut(kind).map(|f| {
            let before = *f;
            *f = !before;
            before
        })?;
        state.in_flight.insert(kind);
        let delta = if flag { -1 } else { 1 };
        let change = kind.post_counter().map(|c| state.post.adjust(c, delta));
        drop(state);
        self.render.bump();
        Some(CardCheckpoint { flag, change })
    }

    fn settle(&self, kind: EdgeKind, _: &str, receipt: &ToggleReceipt) {
        let mut state = self.lock();
        state.in_flight.remove(&kind);
        if let Some(flag) = state.flag_mut(kind) {
            *flag = receipt.active;
        }
        if let (Some(counter), Some(value)) = (kind.post_counter(), receipt.counter) {
            state.post.set_counter(counter, value);
        }
        drop(state);
        self.render.bump();
    }

    fn rollback(&self, kind: EdgeKind, _: &str, checkpoint: CardCheckpoint) {
        let mut state = self.lock();
        state.in_flight.remove(&kind);
        if let Some(flag) = state.flag_mut(kind) {
            *flag = checkpoint.flag;
        }
        if let Some(change) = checkpoint.change {
            state.post.revert(change);
        }
        drop(state);
        self.render.bump();
    }
}

/// One post with the viewer's like, repost and bookmark state.
pub struct PostCard<S> {
    services: Services<S>,
    post_id: String,
    shared: Arc<CardShared>,
}

impl<S: DocumentStore> PostCard<S> {
    pub async fn load(services: Services<S>, post_id: &str) -> Result<Self> {
        let post: Post = services
            .store
            .get_as(POSTS, post_id)
            .await?
            .ok_or_else(|| Error::NotFound("post".to_string()))?;

        let (liked, reposted, bookmarked) = match services.actor() {
            Some(actor) => {
                let id = domain::edge_doc_id(&actor, post_id);
                let store = &services.store;
                futures::try_join!(
                    store.exists(EdgeKind::Like.collection(), &id),
                    store.exists(EdgeKind::Repost.collection(), &id),
                    store.exists(EdgeKind::Bookmark.collection(), &id)
                )?
            }
            None => (false, false, false),
        };

        Ok(Self {
            services,
            post_id: post_id.to_string(),
            shared: Arc::new(CardShared {
                state: Mutex::new(CardState {
                    post,
                    liked,
                    reposted,
                    bookmarked,
                    in_flight: HashSet::new(),
                    sharing: false,
                }),
                render: RenderSignal::default(),
            }),
        })
    }

    pub fn services(&self) -> &Services<S> {
        &self.services
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn render(&self) -> &RenderSignal {
        &self.shared.render
    }

    pub fn view(&self) -> PostCardView {
        let viewer = self.services.actor();
        let state = self.shared.lock();
        PostCardView {
            engagement: state.post.engagement(),
            liked: state.liked,
            reposted: state.reposted,
            bookmarked: state.bookmarked,
            actions: PostAction::menu(viewer.as_ref(), &state.post, state.bookmarked),
            post: state.post.clone(),
        }
    }

    pub fn actions(&self) -> Vec<PostAction> {
        self.view().actions
    }

    pub async fn toggle(&self, kind: EdgeKind) -> Result<ToggleOutcome> {
        if !matches!(kind, EdgeKind::Like | EdgeKind::Repost | EdgeKind::Bookmark) {
            return Err(Error::InvalidInput(format!("{:?} does not apply to posts", kind)));
        }
        run_toggle(&self.services, &*self.shared, kind, &self.post_id).await
    }

    /// Toggles while also holding `guard` for this post, so cards loaded
    /// separately for the same viewer never overlap on one edge.
    pub async fn toggle_guarded(&self, kind: EdgeKind, guard: &PendingEdges) -> Result<ToggleOutcome> {
        let Some(_claim) = guard.claim(kind, &self.post_id) else {
            debug!(?kind, post_id = %self.post_id, "Toggle ignored, held by another card");
            return Ok(ToggleOutcome::Busy);
        };
        self.toggle(kind).await
    }

    pub async fn toggle_like(&self) -> Result<ToggleOutcome> {
        self.toggle(EdgeKind::Like).await
    }

    pub async fn toggle_repost(&self) -> Result<ToggleOutcome> {
        self.toggle(EdgeKind::Repost).await
    }

    pub async fn toggle_bookmark(&self) -> Result<ToggleOutcome> {
        self.toggle(EdgeKind::Bookmark).await
    }

    /// Counts a share. Requires a signed-in viewer; one share at a time per card.
    pub async fn share(&self) -> Result<u64> {
        self.services.require_actor()?;
        let change = {
            let mut state = self.shared.lock();
            if state.sharing {
                return Err(Error::InFlight);
            }
            state.sharing = true;
            state.post.adjust(Counter::Shares, 1)
        };
        self.shared.render.bump();
        self.services.feedback.haptic(HapticCue::Impact);

        let post_id = self.post_id.clone();
        let result = self
            .services
            .store
            .transaction(move |txn| {
                let mut post = optimistic::load_post(txn, &post_id)?;
                post.adjust(Counter::Shares, 1);
                txn.set_as(POSTS, &post.id, &post)?;
                Ok(post.share_count)
            })
            .await;

        {
            let mut state = self.shared.lock();
            state.sharing = false;
            match &result {
                Ok(count) => state.post.set_counter(Counter::Shares, *count),
                Err(_) => state.post.revert(change),
            }
        }
        self.shared.render.bump();

        match result {
            Ok(count) => {
                info!(post_id = %self.post_id, count, "Post shared");
                Ok(count)
            }
            Err(e) => {
                warn!(post_id = %self.post_id, "Share failed, rolled back: {}", e);
                self.services.surface("Couldn't share", &e);
                Err(e)
            }
        }
    }

    /// Re-reads the post, e.g. after an edit.
    pub async fn refresh(&self) -> Result<()> {
        let post: Post = self
            .services
            .store
            .get_as(POSTS, &self.post_id)
            .await?
            .ok_or_else(|| Error::NotFound("post".to_string()))?;
        self.shared.lock().post = post;
        self.shared.render.bump();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;

    #[tokio::test]
    async fn loads_viewer_edges() {
        let h = Harness::signed_in("bob").await;
        h.seed_post("p1", "alice", 3).await;
        h.seed_edge(EdgeKind::Bookmark, "bob", "p1").await;

        let card = PostCard::load(h.services.clone(), "p1").await.unwrap();
        let view = card.view();
        assert!(view.bookmarked);
        assert!(!view.liked);
        assert!(view.actions.contains(&PostAction::RemoveBookmark));
        assert!(view.actions.contains(&PostAction::BlockAuthor));
    }

    #[tokio::test]
    async fn like_moves_counter_and_engagement_together() {
        let h = Harness::signed_in("bob").await;
        h.seed_post("p1", "alice", 3).await;
        let card = PostCard::load(h.services.clone(), "p1").await.unwrap();

        card.toggle_like().await.unwrap();
        let view = card.view();
        assert!(view.liked);
        assert_eq!(view.post.like_count, 4);
        assert_eq!(view.engagement, 4);
        assert_eq!(h.post("p1").await.like_count, 4);
    }

    #[tokio::test]
    async fn failed_like_restores_card_exactly() {
        let h = Harness::signed_in("bob").await;
        h.seed_post("p1", "alice", 3).await;
        let card = PostCard::load(h.services.clone(), "p1").await.unwrap();
        let before = card.view();

        h.store.set_offline(true);
        assert!(card.toggle_like().await.is_err());
        let after = card.view();
        assert_eq!(after.liked, before.liked);
        assert_eq!(after.post.like_count, before.post.like_count);
        assert_eq!(after.engagement, before.engagement);
        assert!(card.render().version() >= 2);
    }

    #[tokio::test]
    async fn bookmark_never_notifies() {
        let h = Harness::signed_in("bob").await;
        h.seed_post("p1", "alice", 0).await;
        let card = PostCard::load(h.services.clone(), "p1").await.unwrap();

        card.toggle_bookmark().await.unwrap();
        card.toggle_like().await.unwrap();
        crate::testing::wait_until(|| !h.push.sent().is_empty()).await;
        let kinds: Vec<_> = h.push.sent().into_iter().map(|(_, p)| p.kind).collect();
        assert_eq!(kinds, vec![domain::NotificationKind::Like]);
    }

    #[tokio::test]
    async fn share_rolls_back_on_failure() {
        let h = Harness::signed_in("bob").await;
        h.seed_post("p1", "alice", 1).await;
        let card = PostCard::load(h.services.clone(), "p1").await.unwrap();

        assert_eq!(card.share().await.unwrap(), 1);
        assert_eq!(card.view().engagement, 2);

        h.store.set_offline(true);
        assert!(card.share().await.is_err());
        let view = card.view();
        assert_eq!(view.post.share_count, 1);
        assert_eq!(view.engagement, 2);
    }

    #[tokio::test]
    async fn signed_out_share_is_refused() {
        let h = Harness::signed_out().await;
        h.seed_post("p1", "alice", 1).await;
        let card = PostCard::load(h.services.clone(), "p1").await.unwrap();
        let before = card.view();

        assert!(matches!(card.share().await, Err(Error::NotLoggedIn)));
        assert_eq!(card.view().post.share_count, before.post.share_count);
        assert_eq!(card.view().engagement, before.engagement);
        assert_eq!(h.post("p1").await.share_count, 0);
        assert_eq!(h.feedback.alerts().len(), 1);
    }

    #[tokio::test]
    async fn separate_cards_share_one_guard() {
        let h = Harness::with_latency("bob", std::time::Duration::from_millis(50)).await;
        h.seed_post("p1", "alice", 0).await;
        let first = PostCard::load(h.services.clone(), "p1").await.unwrap();
        let second = PostCard::load(h.services.clone(), "p1").await.unwrap();
        let guard = PendingEdges::default();

        let (a, b) = tokio::join!(
            first.toggle_guarded(EdgeKind::Like, &guard),
            second.toggle_guarded(EdgeKind::Like, &guard)
        );
        assert_eq!(a.unwrap(), ToggleOutcome::Applied { active: true });
        assert_eq!(b.unwrap(), ToggleOutcome::Busy);
        assert_eq!(h.post("p1").await.like_count, 1);

        // released once the first toggle settled
        assert_eq!(
            second.toggle_guarded(EdgeKind::Like, &guard).await.unwrap(),
            ToggleOutcome::Applied { active: false }
        );
    }

    #[tokio::test]
    async fn follow_is_not_a_post_toggle() {
        let h = Harness::signed_in("bob").await;
        h.seed_post("p1", "alice", 0).await;
        let card = PostCard::load(h.services.clone(), "p1").await.unwrap();
        assert!(matches!(
            card.toggle(EdgeKind::Follow).await,
            Err(Error::InvalidInput(_))
        ));
    }
}
