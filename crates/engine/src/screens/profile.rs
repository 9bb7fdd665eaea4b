use domain::{ActorId, EdgeKind, Error, Post, Profile, ProfileAction, Relationship, Result};
use futures::future;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use storage::collections::{POSTS, PROFILES};
use storage::{Direction, DocumentStore, Query, Subscription};

use crate::live::{spawn_listener, Listener, LiveList, RenderSignal};
use crate::optimistic::{run_toggle, OptimisticTarget, ToggleOutcome, ToggleReceipt};
use crate::relations::relationship;
use crate::services::Services;

#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub profile: Profile,
    pub relationship: Relationship,
    pub is_self: bool,
    /// Empty while a block exists either way.
    pub posts: Vec<Post>,
    pub actions: Vec<ProfileAction>,
    pub loading: bool,
}

struct ProfileState {
    profile: Profile,
    relationship: Relationship,
    posts: LiveList<Post>,
    in_flight: HashSet<EdgeKind>,
}

pub struct ProfileShared {
    state: Mutex<ProfileState>,
    render: RenderSignal,
}

impl ProfileShared {
    fn lock(&self) -> MutexGuard<'_, ProfileState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct ProfileCheckpoint {
    relationship: Relationship,
    follower_count: u64,
}

impl OptimisticTarget for ProfileShared {
    type Checkpoint = ProfileCheckpoint;

    fn begin(&self, kind: EdgeKind, _: &str) -> Option<ProfileCheckpoint> {
        let mut state = self.lock();
        if !kind.targets_actor() || !state.in_flight.insert(kind) {
            return None;
        }
        let checkpoint = ProfileCheckpoint {
            relationship: state.relationship,
            follower_count: state.profile.follower_count,
        };
        match kind {
            EdgeKind::Follow => {
                let following = !state.relationship.following;
                state.relationship.following = following;
                state.profile.follower_count = if following {
                    state.profile.follower_count + 1
                } else {
                    state.profile.follower_count.saturating_sub(1)
                };
            }
            _ => {
                let blocking = !state.relationship.blocking;
                state.relationship.blocking = blocking;
                if blocking && state.relationship.following {
                    state.relationship.following = false;
                    state.profile.follower_count = state.profile.follower_count.saturating_sub(1);
                }
            }
        }
        drop(state);
        self.render.bump();
        Some(checkpoint)
    }

    fn settle(&self, kind: EdgeKind, _: &str, receipt: &ToggleReceipt) {
        let mut state = self.lock();
        state.in_flight.remove(&kind);
        match kind {
            EdgeKind::Follow => state.relationship.following = receipt.active,
            _ => state.relationship.blocking = receipt.active,
        }
        if let Some(count) = receipt.counter {
            state.profile.follower_count = count;
        }
        drop(state);
        self.render.bump();
    }

    fn rollback(&self, kind: EdgeKind, _: &str, checkpoint: ProfileCheckpoint) {
        let mut state = self.lock();
        state.in_flight.remove(&kind);
        state.relationship = checkpoint.relationship;
        state.profile.follower_count = checkpoint.follower_count;
        drop(state);
        self.render.bump();
    }
}

pub struct ProfileScreen<S> {
    services: Services<S>,
    profile_id: ActorId,
    shared: Arc<ProfileShared>,
    _listener: Listener,
}

impl<S: DocumentStore> ProfileScreen<S> {
    pub async fn load(services: Services<S>, profile_id: &ActorId) -> Result<Self> {
        let profile: Profile = services
            .store
            .get_as(PROFILES, profile_id.as_str())
            .await?
            .ok_or_else(|| Error::NotFound("profile".to_string()))?;
        let rel = match services.actor() {
            Some(viewer) if viewer != *profile_id => {
                relationship(&*services.store, &viewer, profile_id).await?
            }
            _ => Relationship::default(),
        };
        let posts = services.store.subscribe(
            Query::collection(POSTS)
                .where_eq("author_id", profile_id.as_str())
                .order_by("created_at", Direction::Desc),
        );
        Ok(Self::attach(services, profile, rel, posts))
    }

    pub fn attach(
        services: Services<S>,
        profile: Profile,
        relationship: Relationship,
        posts: Subscription,
    ) -> Self {
        let profile_id = profile.id.clone();
        let shared = Arc::new(ProfileShared {
            state: Mutex::new(ProfileState {
                profile,
                relationship,
                posts: LiveList::new(),
                in_flight: HashSet::new(),
            }),
            render: RenderSignal::default(),
        });
        let target = shared.clone();
        let listener = spawn_listener(posts, move |snapshot| {
            target.lock().posts.apply_snapshot(snapshot, "profile posts");
            target.render.bump();
            future::ready(())
        });
        Self {
            services,
            profile_id,
            shared,
            _listener: listener,
        }
    }

    pub fn services(&self) -> &Services<S> {
        &self.services
    }

    pub fn profile_id(&self) -> &ActorId {
        &self.profile_id
    }

    pub fn render(&self) -> &RenderSignal {
        &self.shared.render
    }

    /// Waits for the first page of the profile's posts.
    pub async fn ready(&self) {
        let shared = &self.shared;
        shared
            .render
            .wait_for(|| !shared.lock().posts.is_loading())
            .await;
    }

    pub fn view(&self) -> ProfileView {
        let viewer = self.services.actor();
        let state = self.shared.lock();
        let rel = state.relationship;
        ProfileView {
            profile: state.profile.clone(),
            relationship: rel,
            is_self: viewer.as_ref() == Some(&self.profile_id),
            posts: if rel.is_blocked() {
                Vec::new()
            } else {
                state.posts.merged()
            },
            actions: ProfileAction::menu(viewer.as_ref(), &self.profile_id, rel),
            loading: state.posts.is_loading(),
        }
    }

    pub fn actions(&self) -> Vec<ProfileAction> {
        self.view().actions
    }

    pub async fn toggle_follow(&self) -> Result<ToggleOutcome> {
        run_toggle(
            &self.services,
            &*self.shared,
            EdgeKind::Follow,
            self.profile_id.as_str(),
        )
        .await
    }

    /// Blocking also drops the viewer's follow.
    pub async fn toggle_block(&self) -> Result<ToggleOutcome> {
        run_toggle(
            &self.services,
            &*self.shared,
            EdgeKind::Block,
            self.profile_id.as_str(),
        )
        .await
    }
}
