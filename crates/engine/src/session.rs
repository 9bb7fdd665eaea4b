use domain::ActorId;
use std::sync::RwLock;

use crate::traits::AuthProvider;

/// Session whose actor is set by the host (config, login screen).
#[derive(Default)]
pub struct StaticSession {
    actor: RwLock<Option<ActorId>>,
}

impl StaticSession {
    pub fn new(actor: Option<ActorId>) -> Self {
        Self {
            actor: RwLock::new(actor),
        }
    }

    pub fn sign_in(&self, actor: ActorId) {
        *self.actor.write().unwrap_or_else(|e| e.into_inner()) = Some(actor);
    }

    pub fn sign_out(&self) {
        *self.actor.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl AuthProvider for StaticSession {
    fn current_actor(&self) -> Option<ActorId> {
        self.actor.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
