use domain::{ActorId, PushPayload};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::traits::PushDispatcher;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Fire-and-forget side channel. Failures are logged, never returned.
#[derive(Clone)]
pub struct Notifier {
    push: Arc<dyn PushDispatcher>,
    policy: RetryPolicy,
}

impl Notifier {
    pub fn new(push: Arc<dyn PushDispatcher>, policy: RetryPolicy) -> Self {
        Self { push, policy }
    }

    /// Self-actions are dropped here and never reach the dispatcher.
    pub fn notify(&self, recipient: &ActorId, payload: PushPayload) -> Option<JoinHandle<bool>> {
        if *recipient == payload.actor {
            debug!(kind = ?payload.kind, "Skipping notification for self-action");
            return None;
        }
        let push = self.push.clone();
        let policy = self.policy;
        let recipient = recipient.clone();
        Some(tokio::spawn(async move {
            deliver(push, &recipient, &payload, policy).await
        }))
    }
}

async fn deliver(
    push: Arc<dyn PushDispatcher>,
    recipient: &ActorId,
    payload: &PushPayload,
    policy: RetryPolicy,
) -> bool {
    for attempt in 1..=policy.max_attempts {
        match push.dispatch(recipient, payload).await {
            Ok(()) => return true,
            Err(e) => {
                warn!(
                    attempt,
                    "Push to {} ({:?}) failed: {:?}", recipient, payload.kind, e
                );
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.backoff * attempt).await;
                }
            }
        }
    }
    false
}
