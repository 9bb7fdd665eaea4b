use domain::{ActorId, Error, Result};
use std::sync::Arc;
use storage::DocumentStore;
use tracing::debug;

use crate::notify::Notifier;
use crate::traits::{AuthProvider, MediaUploader, UiFeedback};

/// Everything a screen needs, injected instead of reached through globals.
pub struct Services<S> {
    pub store: Arc<S>,
    pub auth: Arc<dyn AuthProvider>,
    pub media: Arc<dyn MediaUploader>,
    pub feedback: Arc<dyn UiFeedback>,
    pub notifier: Notifier,
}

impl<S> Clone for Services<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            auth: self.auth.clone(),
            media: self.media.clone(),
            feedback: self.feedback.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<S: DocumentStore> Services<S> {
    pub fn actor(&self) -> Option<ActorId> {
        self.auth.current_actor()
    }

    /// Fails fast with an alert when nobody is signed in.
    pub fn require_actor(&self) -> Result<ActorId> {
        match self.auth.current_actor() {
            Some(actor) => Ok(actor),
            None => {
                debug!("Mutation attempted while signed out");
                self.surface("Not logged in", &Error::NotLoggedIn);
                Err(Error::NotLoggedIn)
            }
        }
    }

    pub fn surface(&self, title: &str, err: &Error) {
        self.feedback.alert(title, &err.user_message());
    }
}
