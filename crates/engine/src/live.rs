//! Building blocks for screens fed by live subscriptions.

use domain::{Comment, Error, Message, Post};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use storage::{decode_all, Snapshot, Subscription};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Records that may have been shown optimistically before the store confirmed them.
pub trait Confirmable {
    fn record_id(&self) -> &str;
    fn client_token(&self) -> Option<&str>;
}

impl Confirmable for Comment {
    fn record_id(&self) -> &str {
        &self.id
    }

    fn client_token(&self) -> Option<&str> {
        self.client_token.as_deref()
    }
}

impl Confirmable for Message {
    fn record_id(&self) -> &str {
        &self.id
    }

    fn client_token(&self) -> Option<&str> {
        self.client_token.as_deref()
    }
}

impl Confirmable for Post {
    fn record_id(&self) -> &str {
        &self.id
    }

    fn client_token(&self) -> Option<&str> {
        None
    }
}

/// Authoritative slice replaced wholesale by each snapshot, plus optimistic
/// entries that are still waiting for their confirmed counterpart.
#[derive(Debug, Clone)]
pub struct LiveList<T> {
    authoritative: Vec<T>,
    pending: Vec<T>,
    loading: bool,
    error: Option<Error>,
}

impl<T> Default for LiveList<T> {
    fn default() -> Self {
        Self {
            authoritative: Vec::new(),
            pending: Vec::new(),
            loading: true,
            error: None,
        }
    }
}

impl<T: Confirmable + Clone + DeserializeOwned> LiveList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors keep the last good content and only clear the loading flag.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot, source: &str) {
        self.loading = false;
        match snapshot.and_then(decode_all::<T>) {
            Ok(items) => {
                let confirmed: HashSet<&str> =
                    items.iter().filter_map(|i| i.client_token()).collect();
                let before = self.pending.len();
                self.pending.retain(|p| {
                    p.client_token()
                        .map_or(true, |token| !confirmed.contains(token))
                });
                if self.pending.len() != before {
                    debug!(source, confirmed = before - self.pending.len(), "Dropped confirmed placeholders");
                }
                self.authoritative = items;
                self.error = None;
            }
            Err(e) => {
                error!("Listener for {} failed: {}", source, e);
                self.error = Some(e);
            }
        }
    }

    pub fn push_pending(&mut self, item: T) {
        self.pending.push(item);
    }

    /// Swaps the placeholder for the committed record. The next snapshot
    /// replaces it like any other authoritative entry, so a record deleted
    /// before that snapshot does not linger.
    pub fn confirm_pending(&mut self, token: &str, confirmed: T) {
        self.discard_pending(token);
        if !self
            .authoritative
            .iter()
            .any(|c| c.record_id() == confirmed.record_id())
        {
            self.authoritative.push(confirmed);
        }
    }

    /// Removes a placeholder after its write failed.
    pub fn discard_pending(&mut self, token: &str) -> Option<T> {
        let idx = self
            .pending
            .iter()
            .position(|p| p.client_token() == Some(token))?;
        Some(self.pending.remove(idx))
    }

    /// Authoritative entries first, then unconfirmed placeholders.
    pub fn merged(&self) -> Vec<T> {
        self.authoritative
            .iter()
            .chain(self.pending.iter())
            .cloned()
            .collect()
    }

    /// Local edits of visible entries. The next snapshot overwrites them.
    pub fn items_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.authoritative.iter_mut().chain(self.pending.iter_mut())
    }

    pub fn authoritative(&self) -> &[T] {
        &self.authoritative
    }

    pub fn pending(&self) -> &[T] {
        &self.pending
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }
}

/// Version counter bumped after every state change of a screen.
#[derive(Clone)]
pub struct RenderSignal {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for RenderSignal {
    fn default() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }
}

impl RenderSignal {
    pub fn bump(&self) {
        self.tx.send_modify(|v| *v += 1);
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Resolves once `done` holds, re-checking after every bump.
    pub async fn wait_for(&self, done: impl Fn() -> bool) {
        let mut rx = self.subscribe();
        while !done() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

/// Background task draining one subscription. Dropping it unsubscribes.
pub struct Listener {
    cancel: CancellationToken,
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub fn spawn_listener<F, Fut>(mut subscription: Subscription, mut on_snapshot: F) -> Listener
where
    F: FnMut(Snapshot) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                next = subscription.next_snapshot() => match next {
                    Some(snapshot) => on_snapshot(snapshot).await,
                    None => break,
                },
            }
        }
        debug!("Listener stopped");
    });
    Listener { cancel }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{comment, wait_until};
    use serde_json::to_value;
    use std::sync::Mutex;

    fn snapshot(comments: &[Comment]) -> Snapshot {
        Ok(comments.iter().map(|c| to_value(c).unwrap()).collect())
    }

    fn placeholder(id: &str, token: &str) -> Comment {
        let mut c = comment(id, "p1", "bob", None);
        c.client_token = Some(token.to_string());
        c
    }

    #[test]
    fn confirmed_placeholder_is_dropped_by_token() {
        let mut list = LiveList::<Comment>::new();
        list.push_pending(placeholder("local-1", "t1"));
        list.push_pending(placeholder("local-2", "t2"));

        // same text from a different client must not confirm t2
        let mut confirmed = placeholder("c9", "t1");
        confirmed.text = "same text".to_string();
        list.apply_snapshot(snapshot(&[confirmed]), "comments");

        let merged = list.merged();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, "c9");
        assert_eq!(merged[1].id, "local-2");
        assert!(!list.is_loading());
    }

    #[test]
    fn failed_snapshot_keeps_last_good_content() {
        let mut list = LiveList::<Comment>::new();
        list.apply_snapshot(snapshot(&[comment("c1", "p1", "alice", None)]), "comments");
        list.apply_snapshot(Err(Error::Unavailable("down".into())), "comments");

        assert_eq!(list.authoritative().len(), 1);
        assert!(list.error().is_some());
        assert!(!list.is_loading());
    }

    #[test]
    fn discard_removes_only_the_matching_placeholder() {
        let mut list = LiveList::<Comment>::new();
        list.push_pending(placeholder("local-1", "t1"));
        list.push_pending(placeholder("local-2", "t2"));
        assert_eq!(list.discard_pending("t1").unwrap().id, "local-1");
        assert!(list.discard_pending("t1").is_none());
        assert_eq!(list.pending().len(), 1);
    }

    #[test]
    fn confirmed_write_replaces_its_placeholder_at_once() {
        let mut list = LiveList::<Comment>::new();
        list.apply_snapshot(snapshot(&[comment("c1", "p1", "alice", None)]), "comments");
        list.push_pending(placeholder("local-1", "t1"));
        list.push_pending(placeholder("local-2", "t2"));

        list.confirm_pending("t1", placeholder("c2", "t1"));
        let ids: Vec<String> = list.merged().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["c1", "c2", "local-2"]);

        // the record was deleted before any snapshot carried it
        list.apply_snapshot(snapshot(&[comment("c1", "p1", "alice", None)]), "comments");
        let ids: Vec<String> = list.merged().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["c1", "local-2"]);
    }

    #[test]
    fn confirming_a_record_already_delivered_keeps_one_copy() {
        let mut list = LiveList::<Comment>::new();
        list.push_pending(placeholder("local-1", "t1"));
        list.apply_snapshot(snapshot(&[placeholder("c2", "t1")]), "comments");
        list.confirm_pending("t1", placeholder("c2", "t1"));
        assert_eq!(list.merged().len(), 1);
        assert!(list.pending().is_empty());
    }

    #[tokio::test]
    async fn listener_delivers_until_dropped() {
        let (feed, subscription) = Subscription::channel(4);
        let seen = Arc::new(Mutex::new(0));
        let counter = seen.clone();
        let listener = spawn_listener(subscription, move |_| {
            *counter.lock().unwrap() += 1;
            async {}
        });

        assert!(feed.emit(Ok(Vec::new())).await);
        wait_until(|| *seen.lock().unwrap() == 1).await;

        drop(listener);
        wait_until(|| feed.is_cancelled()).await;
        assert!(!feed.emit(Ok(Vec::new())).await);
    }

    #[test]
    fn render_signal_counts_versions() {
        let signal = RenderSignal::default();
        let rx = signal.subscribe();
        signal.bump();
        signal.bump();
        assert_eq!(signal.version(), 2);
        assert_eq!(*rx.borrow(), 2);
    }

    #[tokio::test]
    async fn wait_for_wakes_on_bump() {
        let signal = RenderSignal::default();
        let flag = Arc::new(Mutex::new(false));
        let (bumper, set) = (signal.clone(), flag.clone());
        tokio::spawn(async move {
            *set.lock().unwrap() = true;
            bumper.bump();
        });
        signal.wait_for(|| *flag.lock().unwrap()).await;
        assert!(*flag.lock().unwrap());
    }
}
