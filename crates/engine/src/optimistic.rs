//! Optimistic edge toggles.
//!
//! A toggle flips screen-local state first, then runs one store transaction
//! that reads the edge and its counter, branches on existence and commits.
//! Success settles the local state and notifies the target's owner;
//! failure restores exactly what `begin` captured.

use domain::{
    apply_delta, edge_doc_id, ActorId, Comment, Counter, Edge, EdgeKey, EdgeKind, Error, Post,
    Profile, PushPayload, Result,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Mutex;
use storage::collections::{COMMENTS, POSTS, PROFILES};
use storage::{DocumentStore, Txn, TxnExt};
use tracing::{debug, info, warn};

use crate::relations::blocked_between;
use crate::services::Services;
use crate::traits::HapticCue;

/// What the transaction found and wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleReceipt {
    /// Edge existence after commit.
    pub active: bool,
    /// Dependent counter after commit, for kinds that have one.
    pub counter: Option<u64>,
    /// Owner of the target, the notification recipient.
    pub owner: Option<ActorId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ToggleOutcome {
    Applied { active: bool },
    /// A toggle of the same edge was still pending; nothing happened.
    Busy,
}

/// Screen-local state that a toggle flips before the remote call.
pub trait OptimisticTarget: Send + Sync {
    type Checkpoint: Send;

    /// Flips the edge and its counter, returning what is needed to undo it.
    /// `None` while a toggle of the same edge is in flight.
    fn begin(&self, kind: EdgeKind, target: &str) -> Option<Self::Checkpoint>;

    fn settle(&self, kind: EdgeKind, target: &str, receipt: &ToggleReceipt);

    fn rollback(&self, kind: EdgeKind, target: &str, checkpoint: Self::Checkpoint);
}

/// Toggle target without visible state, only the in-flight guard.
/// Used where an edge is flipped from a menu rather than a control.
#[derive(Default)]
pub struct PendingEdges {
    in_flight: Mutex<HashSet<(EdgeKind, String)>>,
}

impl OptimisticTarget for PendingEdges {
    type Checkpoint = ();

    fn begin(&self, kind: EdgeKind, target: &str) -> Option<()> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.insert((kind, target.to_string())).then_some(())
    }

    fn settle(&self, kind: EdgeKind, target: &str, _: &ToggleReceipt) {
        self.release(kind, target);
    }

    fn rollback(&self, kind: EdgeKind, target: &str, _: ()) {
        self.release(kind, target);
    }
}

impl PendingEdges {
    /// Holds the edge until the claim drops. `None` while it is already held.
    pub fn claim(&self, kind: EdgeKind, target: &str) -> Option<EdgeClaim<'_>> {
        self.begin(kind, target).map(|()| EdgeClaim {
            edges: self,
            kind,
            target: target.to_string(),
        })
    }

    fn release(&self, kind: EdgeKind, target: &str) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(kind, target.to_string()));
    }
}

/// Releases its edge on drop, so a cancelled request never leaves it held.
pub struct EdgeClaim<'a> {
    edges: &'a PendingEdges,
    kind: EdgeKind,
    target: String,
}

impl Drop for EdgeClaim<'_> {
    fn drop(&mut self) {
        self.edges.release(self.kind, &self.target);
    }
}

pub async fn run_toggle<S, L>(
    services: &Services<S>,
    local: &L,
    kind: EdgeKind,
    target: &str,
) -> Result<ToggleOutcome>
where
    S: DocumentStore,
    L: OptimisticTarget + ?Sized,
{
    let actor = services.require_actor()?;

    let Some(checkpoint) = local.begin(kind, target) else {
        debug!(?kind, target, "Toggle ignored, previous one still pending");
        return Ok(ToggleOutcome::Busy);
    };
    services.feedback.haptic(HapticCue::Selection);

    let key = EdgeKey::new(kind, actor.clone(), target);
    match services
        .store
        .transaction(move |txn| toggle_edge(txn, &key))
        .await
    {
        Ok(receipt) => {
            local.settle(kind, target, &receipt);
            info!(?kind, %actor, target, active = receipt.active, "Edge toggled");
            if receipt.active {
                if let (Some(owner), Some(notification)) = (&receipt.owner, kind.notification()) {
                    let payload = PushPayload::new(notification, actor, Some(target.to_string()));
                    services.notifier.notify(owner, payload);
                }
            }
            Ok(ToggleOutcome::Applied {
                active: receipt.active,
            })
        }
        Err(e) => {
            local.rollback(kind, target, checkpoint);
            warn!(?kind, target, "Toggle failed, rolled back: {}", e);
            services.surface("Something went wrong", &e);
            Err(e)
        }
    }
}

/// Transaction body shared by every edge kind.
pub(crate) fn toggle_edge(txn: &mut dyn Txn, key: &EdgeKey) -> Result<ToggleReceipt> {
    let collection = key.kind.collection();
    let edge_id = key.doc_id();
    let existed = txn.exists(collection, &edge_id);
    let delta = if existed { -1 } else { 1 };

    let (counter, owner) = match key.kind {
        EdgeKind::Like | EdgeKind::Repost => {
            let counter = if key.kind == EdgeKind::Like {
                Counter::Likes
            } else {
                Counter::Reposts
            };
            let mut post = load_post(txn, &key.target)?;
            post.adjust(counter, delta);
            txn.set_as(POSTS, &post.id, &post)?;
            (Some(post.counter(counter)), Some(post.author_id))
        }
        EdgeKind::Bookmark => {
            let post = load_post(txn, &key.target)?;
            (None, Some(post.author_id))
        }
        EdgeKind::CommentLike => {
            let mut comment: Comment = txn
                .get_as(COMMENTS, &key.target)?
                .ok_or_else(|| Error::NotFound("comment".to_string()))?;
            comment.like_count = apply_delta(comment.like_count, delta);
            txn.set_as(COMMENTS, &comment.id, &comment)?;
            (Some(comment.like_count), Some(comment.author_id))
        }
        EdgeKind::Follow => {
            let target = target_actor(key)?;
            load_profile(txn, &target)?;
            if !existed && blocked_between(txn, &key.actor, &target) {
                return Err(Error::Blocked);
            }
            let followers = shift_follow_counts(txn, &key.actor, &target, delta)?;
            (followers, Some(target))
        }
        EdgeKind::Block => {
            let target = target_actor(key)?;
            load_profile(txn, &target)?;
            let followers = if existed {
                None
            } else {
                sever_follows(txn, &key.actor, &target)?
            };
            (followers, Some(target))
        }
    };

    if existed {
        txn.delete(collection, &edge_id);
    } else {
        let edge = Edge::new(key.actor.clone(), key.target.clone());
        txn.set_as(collection, &edge_id, &edge)?;
    }

    Ok(ToggleReceipt {
        active: !existed,
        counter,
        owner,
    })
}

pub(crate) fn load_post(txn: &dyn Txn, post_id: &str) -> Result<Post> {
    txn.get_as(POSTS, post_id)?
        .ok_or_else(|| Error::NotFound("post".to_string()))
}

pub(crate) fn load_profile(txn: &dyn Txn, actor: &ActorId) -> Result<Profile> {
    txn.get_as(PROFILES, actor.as_str())?
        .ok_or_else(|| Error::NotFound("profile".to_string()))
}

fn target_actor(key: &EdgeKey) -> Result<ActorId> {
    let target = ActorId::new(key.target.clone()).map_err(Error::InvalidInput)?;
    if target == key.actor {
        return Err(Error::InvalidInput(
            "You can't do that to your own account.".to_string(),
        ));
    }
    Ok(target)
}

/// Returns the followee's follower count when the profile exists.
fn shift_follow_counts(
    txn: &mut dyn Txn,
    follower: &ActorId,
    followee: &ActorId,
    delta: i64,
) -> Result<Option<u64>> {
    let mut followers = None;
    if let Some(mut p) = txn.get_as::<Profile>(PROFILES, followee.as_str())? {
        p.follower_count = apply_delta(p.follower_count, delta);
        followers = Some(p.follower_count);
        txn.set_as(PROFILES, followee.as_str(), &p)?;
    }
    if let Some(mut p) = txn.get_as::<Profile>(PROFILES, follower.as_str())? {
        p.following_count = apply_delta(p.following_count, delta);
        txn.set_as(PROFILES, follower.as_str(), &p)?;
    }
    Ok(followers)
}

/// Removes follow edges in both directions. Returns the target's follower count.
fn sever_follows(txn: &mut dyn Txn, actor: &ActorId, target: &ActorId) -> Result<Option<u64>> {
    let follows = EdgeKind::Follow.collection();
    for (from, to) in [(actor, target), (target, actor)] {
        let id = edge_doc_id(from, to.as_str());
        if txn.exists(follows, &id) {
            txn.delete(follows, &id);
            shift_follow_counts(txn, from, to, -1)?;
        }
    }
    Ok(txn
        .get_as::<Profile>(PROFILES, target.as_str())?
        .map(|p| p.follower_count))
}
