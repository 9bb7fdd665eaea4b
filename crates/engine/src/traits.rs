use anyhow::Result;
use async_trait::async_trait;
use domain::{ActorId, MediaBlob, PushPayload};

/// Source of the signed-in actor. `None` means signed out.
pub trait AuthProvider: Send + Sync {
    fn current_actor(&self) -> Option<ActorId>;
}

#[async_trait]
pub trait MediaUploader: Send + Sync {
    /// Stores the blob and returns a durable URL.
    async fn upload(&self, blob: &MediaBlob) -> Result<String>;
}

#[async_trait]
pub trait PushDispatcher: Send + Sync {
    async fn dispatch(&self, recipient: &ActorId, payload: &PushPayload) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HapticCue {
    Selection,
    Impact,
    Warning,
}

/// Device feedback the screens trigger synchronously.
pub trait UiFeedback: Send + Sync {
    fn haptic(&self, cue: HapticCue);
    fn alert(&self, title: &str, message: &str);
}
