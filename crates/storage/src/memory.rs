use async_trait::async_trait;
use domain::{ChangeEvent, Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error};

use crate::subscription::SnapshotFeed;
use crate::{DocumentStore, Query, Subscription, Txn, Write};

type Collections = BTreeMap<String, BTreeMap<String, Value>>;
type Staged = BTreeMap<(String, String), Option<Value>>;

/// In-process stand-in for the remote document database.
///
/// Transactions run under one lock, so they are serializable. Every commit
/// is published on a broadcast change feed which drives subscriptions.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    docs: Mutex<Collections>,
    changes: broadcast::Sender<ChangeEvent>,
    offline: AtomicBool,
    latency: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    /// Every operation waits `latency` before touching the data.
    pub fn with_latency(latency: Duration) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                docs: Mutex::new(BTreeMap::new()),
                changes,
                offline: AtomicBool::new(false),
                latency,
            }),
        }
    }

    /// While offline every operation fails with `Error::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    pub fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.changes.subscribe()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.docs().get(collection).map_or(0, BTreeMap::len)
    }

    fn docs(&self) -> MutexGuard<'_, Collections> {
        self.inner.docs.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn round_trip(&self) -> Result<()> {
        if !self.inner.latency.is_zero() {
            tokio::time::sleep(self.inner.latency).await;
        }
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("store is offline".to_string()));
        }
        Ok(())
    }

    fn publish(&self, events: Vec<ChangeEvent>) {
        for event in events {
            // no receivers is fine
            let _ = self.inner.changes.send(event);
        }
    }
}

fn new_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

fn apply(docs: &mut Collections, staged: Staged) -> Vec<ChangeEvent> {
    staged
        .into_iter()
        .map(|((collection, doc_id), doc)| match doc {
            Some(doc) => {
                docs.entry(collection.clone())
                    .or_default()
                    .insert(doc_id.clone(), doc);
                ChangeEvent::DocumentSaved { collection, doc_id }
            }
            None => {
                if let Some(c) = docs.get_mut(&collection) {
                    c.remove(&doc_id);
                }
                ChangeEvent::DocumentDeleted { collection, doc_id }
            }
        })
        .collect()
}

struct StagedTxn<'a> {
    base: &'a Collections,
    staged: Staged,
}

impl Txn for StagedTxn<'_> {
    fn get(&self, collection: &str, id: &str) -> Option<Value> {
        if let Some(staged) = self.staged.get(&(collection.to_string(), id.to_string())) {
            return staged.clone();
        }
        self.base.get(collection).and_then(|c| c.get(id)).cloned()
    }

    fn set(&mut self, collection: &str, id: &str, doc: Value) {
        self.staged
            .insert((collection.to_string(), id.to_string()), Some(doc));
    }

    fn delete(&mut self, collection: &str, id: &str) {
        self.staged
            .insert((collection.to_string(), id.to_string()), None);
    }

    fn generate_id(&mut self) -> String {
        new_id()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        self.round_trip().await?;
        Ok(self.docs().get(collection).and_then(|c| c.get(id)).cloned())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Value>> {
        self.round_trip().await?;
        let docs = self.docs();
        Ok(query.evaluate(docs.get(&query.collection).into_iter().flat_map(|c| c.values())))
    }

    fn subscribe(&self, query: Query) -> Subscription {
        let (feed, subscription) = Subscription::channel(16);
        let mut changes = self.inner.changes.subscribe();
        let store = self.clone();

        tokio::spawn(async move {
            loop {
                let snapshot = store.query(&query).await;
                if let Err(e) = &snapshot {
                    error!("Subscription on '{}' failed: {}", query.collection, e);
                }
                if !feed.emit(snapshot).await {
                    break;
                }
                if !wait_for_change(&feed, &mut changes, &query.collection).await {
                    break;
                }
            }
            debug!("Subscription on '{}' closed", query.collection);
        });

        subscription
    }

    async fn transaction<T, F>(&self, mut body: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnMut(&mut dyn Txn) -> Result<T> + Send + 'static,
    {
        self.round_trip().await?;
        let (value, events) = {
            let mut docs = self.docs();
            let mut txn = StagedTxn {
                base: &*docs,
                staged: Staged::new(),
            };
            let value = body(&mut txn)?;
            let staged = txn.staged;
            (value, apply(&mut *docs, staged))
        };
        self.publish(events);
        Ok(value)
    }

    async fn batch(&self, writes: Vec<Write>) -> Result<()> {
        self.round_trip().await?;
        let staged: Staged = writes
            .into_iter()
            .map(|w| match w {
                Write::Set {
                    collection,
                    id,
                    doc,
                } => ((collection, id), Some(doc)),
                Write::Delete { collection, id } => ((collection, id), None),
            })
            .collect();
        let events = apply(&mut *self.docs(), staged);
        self.publish(events);
        Ok(())
    }

    fn generate_id(&self) -> String {
        new_id()
    }
}

/// `false` once the subscriber is gone.
async fn wait_for_change(
    feed: &SnapshotFeed,
    changes: &mut broadcast::Receiver<ChangeEvent>,
    collection: &str,
) -> bool {
    loop {
        tokio::select! {
            _ = feed.cancelled() => return false,
            change = changes.recv() => match change {
                Ok(event) if event.collection() == collection => break,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Change feed lagged, re-running query");
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => return false,
            },
        }
    }
    // one re-query covers everything already queued
    while let Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) = changes.try_recv() {}
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TxnExt;
    use serde_json::json;

    async fn next(sub: &mut Subscription) -> Result<Vec<Value>> {
        tokio::time::timeout(Duration::from_secs(2), sub.next_snapshot())
            .await
            .expect("timed out waiting for snapshot")
            .expect("subscription closed")
    }

    fn comment(id: &str, post: &str) -> Write {
        Write::set("comments", id, &json!({ "id": id, "post_id": post })).unwrap()
    }

    #[tokio::test]
    async fn failed_transaction_commits_nothing() {
        let store = MemoryStore::new();
        let result: Result<()> = store
            .transaction(|txn| {
                txn.set("posts", "p1", json!({ "id": "p1" }));
                Err(Error::Conflict)
            })
            .await;
        assert_eq!(result, Err(Error::Conflict));
        assert_eq!(store.len("posts"), 0);
    }

    #[tokio::test]
    async fn transaction_reads_its_own_writes() {
        let store = MemoryStore::new();
        let seen = store
            .transaction(|txn| {
                txn.set("posts", "p1", json!({ "id": "p1", "n": 1 }));
                let doc = txn.get("posts", "p1");
                txn.delete("posts", "p1");
                Ok((doc, txn.exists("posts", "p1")))
            })
            .await
            .unwrap();
        assert_eq!(seen.0, Some(json!({ "id": "p1", "n": 1 })));
        assert!(!seen.1);
        assert_eq!(store.get("posts", "p1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn batch_applies_sets_and_deletes() {
        let store = MemoryStore::new();
        store
            .batch(vec![comment("c1", "p1"), comment("c2", "p1")])
            .await
            .unwrap();
        store
            .batch(vec![Write::delete("comments", "c1")])
            .await
            .unwrap();
        assert_eq!(store.len("comments"), 1);
        assert!(store.exists("comments", "c2").await.unwrap());
    }

    #[tokio::test]
    async fn subscription_redelivers_full_result_set() {
        let store = MemoryStore::new();
        store.batch(vec![comment("c1", "p1")]).await.unwrap();

        let mut sub = store.subscribe(Query::collection("comments").where_eq("post_id", "p1"));
        assert_eq!(next(&mut sub).await.unwrap().len(), 1);

        // other collections and other posts do not matter
        store
            .batch(vec![Write::set("posts", "p1", &json!({ "id": "p1" })).unwrap()])
            .await
            .unwrap();
        store.batch(vec![comment("c2", "p1")]).await.unwrap();
        assert_eq!(next(&mut sub).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn offline_store_fails_reads_and_subscriptions() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.get("posts", "p1").await,
            Err(Error::Unavailable(_))
        ));
        let mut sub = store.subscribe(Query::collection("posts"));
        assert!(matches!(next(&mut sub).await, Err(Error::Unavailable(_))));
    }

    #[tokio::test]
    async fn dropping_the_subscription_stops_the_feed() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe(Query::collection("posts"));
        next(&mut sub).await.unwrap();
        sub.unsubscribe();
        // nothing left to deliver to, the write must still succeed
        store
            .batch(vec![Write::set("posts", "p1", &json!({ "id": "p1" })).unwrap()])
            .await
            .unwrap();
        assert_eq!(store.len("posts"), 1);
    }
}
