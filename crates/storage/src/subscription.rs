use domain::Result;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

pub type Snapshot = Result<Vec<Value>>;

/// Live query handle. Yields full snapshots; dropping it unsubscribes.
pub struct Subscription {
    rx: mpsc::Receiver<Snapshot>,
    cancel: CancellationToken,
}

/// Producer side of a [`Subscription`].
#[derive(Clone)]
pub struct SnapshotFeed {
    tx: mpsc::Sender<Snapshot>,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn channel(buffer: usize) -> (SnapshotFeed, Subscription) {
        let (tx, rx) = mpsc::channel(buffer);
        let cancel = CancellationToken::new();
        (
            SnapshotFeed {
                tx,
                cancel: cancel.clone(),
            },
            Subscription { rx, cancel },
        )
    }

    pub async fn next_snapshot(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Stream for Subscription {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl SnapshotFeed {
    /// `false` once the subscriber is gone.
    pub async fn emit(&self, snapshot: Snapshot) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(snapshot).await.is_ok()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
