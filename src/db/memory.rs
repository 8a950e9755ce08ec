// SPDX-License-Identifier: MIT

//! In-memory document store used by tests.
//!
//! Matches the semantics the engine relies on from the real backend:
//! snapshot pushes in commit order, and transactions that are atomic with
//! respect to each other. Transactions are serialized by a store-wide lock,
//! so a second redemption of the same code always observes the first one's
//! committed counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::store::{
    resolve_updates, Document, DocumentStore, FieldFilter, FieldUpdates, SnapshotEvent,
    StoreError, StoreTransaction, Subscription,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DocKey {
    collection: String,
    id: String,
}

impl DocKey {
    fn new(collection: &str, id: &str) -> Self {
        Self {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<SnapshotEvent>,
}

struct Inner {
    docs: DashMap<DocKey, Document>,
    subscribers: DashMap<DocKey, Vec<Subscriber>>,
    next_subscriber_id: AtomicU64,
    txn_lock: Arc<Mutex<()>>,
}

impl Inner {
    fn notify(&self, key: &DocKey) {
        let snapshot = self.docs.get(key).map(|doc| doc.value().clone());
        if let Some(mut subscribers) = self.subscribers.get_mut(key) {
            subscribers.retain(|subscriber| {
                subscriber
                    .tx
                    .send(SnapshotEvent::Snapshot(snapshot.clone()))
                    .is_ok()
            });
        }
    }

    fn merge_update(
        &self,
        key: &DocKey,
        fields: Vec<(String, serde_json::Value)>,
    ) -> Result<(), StoreError> {
        let mut entry = self.docs.get_mut(key).ok_or_else(|| {
            StoreError::Backend(format!(
                "no document to update: {}/{}",
                key.collection, key.id
            ))
        })?;
        for (field, value) in fields {
            entry.insert(field, value);
        }
        Ok(())
    }
}

/// In-memory [`DocumentStore`].
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                docs: DashMap::new(),
                subscribers: DashMap::new(),
                next_subscriber_id: AtomicU64::new(0),
                txn_lock: Arc::new(Mutex::new(())),
            }),
        }
    }

    fn now() -> String {
        chrono::Utc::now().to_rfc3339()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let key = DocKey::new(collection, id);
        Ok(self.inner.docs.get(&key).map(|doc| doc.value().clone()))
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        fields: FieldUpdates,
    ) -> Result<(), StoreError> {
        let key = DocKey::new(collection, id);
        let doc: Document = resolve_updates(fields, &Self::now()).into_iter().collect();
        self.inner.docs.insert(key.clone(), doc);
        self.inner.notify(&key);
        Ok(())
    }

    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        updates: FieldUpdates,
    ) -> Result<(), StoreError> {
        let key = DocKey::new(collection, id);
        let resolved = resolve_updates(updates, &Self::now());
        self.inner.merge_update(&key, resolved)?;
        self.inner.notify(&key);
        Ok(())
    }

    async fn query_where(
        &self,
        collection: &str,
        filters: &[FieldFilter],
    ) -> Result<Vec<Document>, StoreError> {
        let matches = self
            .inner
            .docs
            .iter()
            .filter(|entry| entry.key().collection == collection)
            .filter(|entry| {
                filters
                    .iter()
                    .all(|filter| entry.value().get(&filter.field) == Some(&filter.equals))
            })
            .map(|entry| entry.value().clone())
            .collect();
        Ok(matches)
    }

    fn subscribe(&self, collection: &str, id: &str) -> Subscription {
        let key = DocKey::new(collection, id);
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber_id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);

        // First event is the current state, matching onSnapshot semantics.
        let current = self.inner.docs.get(&key).map(|doc| doc.value().clone());
        let _ = tx.send(SnapshotEvent::Snapshot(current));

        self.inner
            .subscribers
            .entry(key.clone())
            .or_default()
            .push(Subscriber {
                id: subscriber_id,
                tx,
            });

        let inner = Arc::clone(&self.inner);
        Subscription::new(rx, move || {
            if let Some(mut subscribers) = inner.subscribers.get_mut(&key) {
                subscribers.retain(|subscriber| subscriber.id != subscriber_id);
            }
        })
    }

    async fn begin_transaction(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        let guard = Arc::clone(&self.inner.txn_lock).lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            _guard: guard,
            writes: Vec::new(),
            finished: false,
        }))
    }
}

enum BufferedWrite {
    Set(DocKey, FieldUpdates),
    Update(DocKey, FieldUpdates),
}

struct MemoryTransaction {
    inner: Arc<Inner>,
    _guard: OwnedMutexGuard<()>,
    writes: Vec<BufferedWrite>,
    finished: bool,
}

impl MemoryTransaction {
    fn check_open(&self) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::Backend("transaction already finished".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.check_open()?;
        let key = DocKey::new(collection, id);
        let mut doc = self.inner.docs.get(&key).map(|doc| doc.value().clone());

        // Overlay this transaction's own buffered writes so reads after
        // writes see them.
        let now = MemoryStore::now();
        for write in &self.writes {
            match write {
                BufferedWrite::Set(write_key, fields) if *write_key == key => {
                    doc = Some(resolve_updates(fields.clone(), &now).into_iter().collect());
                }
                BufferedWrite::Update(write_key, fields) if *write_key == key => {
                    let target = doc.get_or_insert_with(Document::new);
                    for (field, value) in resolve_updates(fields.clone(), &now) {
                        target.insert(field, value);
                    }
                }
                _ => {}
            }
        }
        Ok(doc)
    }

    fn set(&mut self, collection: &str, id: &str, fields: FieldUpdates) -> Result<(), StoreError> {
        self.check_open()?;
        self.writes
            .push(BufferedWrite::Set(DocKey::new(collection, id), fields));
        Ok(())
    }

    fn update(
        &mut self,
        collection: &str,
        id: &str,
        updates: FieldUpdates,
    ) -> Result<(), StoreError> {
        self.check_open()?;
        self.writes
            .push(BufferedWrite::Update(DocKey::new(collection, id), updates));
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.check_open()?;
        self.finished = true;

        // Validate update targets before touching anything, so a failed
        // commit leaves the store unchanged.
        let mut created: Vec<&DocKey> = Vec::new();
        for write in &self.writes {
            match write {
                BufferedWrite::Set(key, _) => created.push(key),
                BufferedWrite::Update(key, _) => {
                    if !self.inner.docs.contains_key(key) && !created.contains(&key) {
                        return Err(StoreError::Backend(format!(
                            "no document to update: {}/{}",
                            key.collection, key.id
                        )));
                    }
                }
            }
        }

        let commit_time = MemoryStore::now();
        let mut touched: Vec<DocKey> = Vec::new();
        for write in self.writes.drain(..) {
            match write {
                BufferedWrite::Set(key, fields) => {
                    let doc: Document =
                        resolve_updates(fields, &commit_time).into_iter().collect();
                    self.inner.docs.insert(key.clone(), doc);
                    if !touched.contains(&key) {
                        touched.push(key);
                    }
                }
                BufferedWrite::Update(key, fields) => {
                    self.inner
                        .merge_update(&key, resolve_updates(fields, &commit_time))?;
                    if !touched.contains(&key) {
                        touched.push(key);
                    }
                }
            }
        }

        for key in touched {
            self.inner.notify(&key);
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.check_open()?;
        self.finished = true;
        self.writes.clear();
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished && !self.writes.is_empty() {
            tracing::debug!(
                writes = self.writes.len(),
                "dropping uncommitted transaction"
            );
        }
    }
}
