use domain::{Error, MediaBlob, Post, Profile, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use storage::collections::{POSTS, PROFILES};
use storage::{DocumentStore, TxnExt};
use tracing::{info, warn};

use crate::services::Services;
use crate::traits::HapticCue;

pub const MAX_POST_CHARS: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub text: String,
    #[serde(default)]
    pub image: Option<MediaBlob>,
}

impl Draft {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.image.is_none()
    }
}

/// Clears the busy flag however `submit` exits.
struct Submitting<'a>(&'a AtomicBool);

impl Drop for Submitting<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// New-post composer. The draft survives every failure so retry can re-run the whole flow.
pub struct Composer<S> {
    services: Services<S>,
    draft: Mutex<Draft>,
    submitting: AtomicBool,
}

impl<S: DocumentStore> Composer<S> {
    pub fn new(services: Services<S>) -> Self {
        Self {
            services,
            draft: Mutex::new(Draft::default()),
            submitting: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Draft> {
        self.draft.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn draft(&self) -> Draft {
        self.lock().clone()
    }

    pub fn set_text(&self, text: impl Into<String>) {
        self.lock().text = text.into();
    }

    pub fn attach_image(&self, image: MediaBlob) {
        self.lock().image = Some(image);
    }

    pub fn clear_image(&self) {
        self.lock().image = None;
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::SeqCst)
    }

    pub async fn submit(&self) -> Result<Post> {
        let actor = self.services.require_actor()?;
        if self.submitting.swap(true, Ordering::SeqCst) {
            return Err(Error::InFlight);
        }
        let _busy = Submitting(&self.submitting);

        let draft = self.draft();
        if draft.is_empty() {
            return Err(Error::InvalidInput("Write something or add an image.".to_string()));
        }
        if draft.text.chars().count() > MAX_POST_CHARS {
            return Err(Error::InvalidInput(format!(
                "Posts are limited to {} characters.",
                MAX_POST_CHARS
            )));
        }

        let image_url = match &draft.image {
            Some(blob) => match self.services.media.upload(blob).await {
                Ok(url) => Some(url),
                Err(e) => {
                    let err = Error::Upload(format!("{:#}", e));
                    warn!(%actor, "Image upload failed, draft kept: {:#}", e);
                    self.services.surface("Upload failed", &err);
                    return Err(err);
                }
            },
            None => None,
        };

        let text = draft.text.trim().to_string();
        let author = actor.clone();
        let result = self
            .services
            .store
            .transaction(move |txn| {
                let mut post = Post::new(txn.generate_id(), author.clone(), text.clone());
                post.image_url = image_url.clone();
                txn.set_as(POSTS, &post.id, &post)?;
                if let Some(mut profile) = txn.get_as::<Profile>(PROFILES, author.as_str())? {
                    profile.post_count += 1;
                    txn.set_as(PROFILES, author.as_str(), &profile)?;
                }
                Ok(post)
            })
            .await;

        match result {
            Ok(post) => {
                info!(%actor, post_id = %post.id, "Post published");
                self.services.feedback.haptic(HapticCue::Impact);
                let mut current = self.lock();
                // edits made while publishing stay in the composer
                if *current == draft {
                    *current = Draft::default();
                }
                Ok(post)
            }
            Err(e) => {
                warn!(%actor, "Publishing failed, draft kept: {}", e);
                self.services.surface("Couldn't publish", &e);
                Err(e)
            }
        }
    }
}
