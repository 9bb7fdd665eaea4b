use anyhow::Result;
use async_trait::async_trait;
use domain::{ActorId, PushPayload};
use engine::PushDispatcher;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

const OUTBOX_LIMIT: usize = 100;

/// Logs each push and keeps the latest ones per recipient so the shell can poll them.
#[derive(Default)]
pub struct OutboxPush {
    outbox: Mutex<HashMap<ActorId, Vec<PushPayload>>>,
}

impl OutboxPush {
    fn outbox(&self) -> MutexGuard<'_, HashMap<ActorId, Vec<PushPayload>>> {
        self.outbox.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Newest first.
    pub fn for_recipient(&self, recipient: &ActorId) -> Vec<PushPayload> {
        self.outbox()
            .get(recipient)
            .map(|items| items.iter().rev().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PushDispatcher for OutboxPush {
    async fn dispatch(&self, recipient: &ActorId, payload: &PushPayload) -> Result<()> {
        info!(%recipient, actor = %payload.actor, kind = ?payload.kind, "Push delivered");
        let mut outbox = self.outbox();
        let items = outbox.entry(recipient.clone()).or_default();
        items.push(payload.clone());
        if items.len() > OUTBOX_LIMIT {
            items.remove(0);
        }
        Ok(())
    }
}
