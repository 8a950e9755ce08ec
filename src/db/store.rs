// SPDX-License-Identifier: MIT

//! Narrow document-store interface consumed by the session engine.
//!
//! The engine never talks to a concrete backend directly; everything goes
//! through [`DocumentStore`]. Two implementations exist: the Firestore
//! adapter used in production and an in-memory store for tests.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// A document's fields, as stored.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// A field value in a write. `ServerTimestamp` is a sentinel resolved to the
/// commit time by the store, never by the caller.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Json(serde_json::Value),
    ServerTimestamp,
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        FieldValue::Json(value)
    }
}

/// Field-level write set: `(field name, value)` pairs.
pub type FieldUpdates = Vec<(String, FieldValue)>;

/// Equality filter for [`DocumentStore::query_where`]. Equality is the only
/// predicate the engine needs.
#[derive(Debug, Clone)]
pub struct FieldFilter {
    pub field: String,
    pub equals: serde_json::Value,
}

impl FieldFilter {
    pub fn eq(field: impl Into<String>, equals: serde_json::Value) -> Self {
        Self {
            field: field.into(),
            equals,
        }
    }
}

/// One event on a standing document subscription.
///
/// `Snapshot(None)` means the document does not (or no longer does) exist.
#[derive(Debug, Clone)]
pub enum SnapshotEvent {
    Snapshot(Option<Document>),
    Error(String),
}

/// A standing subscription to a single document.
///
/// Events for a given document arrive in the order the backend committed
/// them. Dropping the handle tears the subscription down; teardown runs
/// exactly once.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<SnapshotEvent>,
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        rx: mpsc::UnboundedReceiver<SnapshotEvent>,
        teardown: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            rx,
            teardown: Some(Box::new(teardown)),
        }
    }

    /// Next already-delivered event, if any.
    pub fn try_recv(&mut self) -> Option<SnapshotEvent> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next event. `None` once the store side has closed.
    pub async fn recv(&mut self) -> Option<SnapshotEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

/// Store-level failure. Everything the backend can do wrong collapses to a
/// message, matching how callers treat it: log, surface a generic retry.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document store error: {0}")]
    Backend(String),
}

/// The document-store operations the engine requires.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a single document, `None` if absent.
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError>;

    /// Full document write. Used only at profile creation.
    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        fields: FieldUpdates,
    ) -> Result<(), StoreError>;

    /// Field-level write; fields not named are left alone.
    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        updates: FieldUpdates,
    ) -> Result<(), StoreError>;

    /// Documents in `collection` matching every filter.
    async fn query_where(
        &self,
        collection: &str,
        filters: &[FieldFilter],
    ) -> Result<Vec<Document>, StoreError>;

    /// Open a standing subscription to one document. The current state is
    /// pushed as the first event.
    fn subscribe(&self, collection: &str, id: &str) -> Subscription;

    /// Begin an atomic read-then-write transaction.
    async fn begin_transaction(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError>;
}

/// An open transaction: reads see committed state, writes are buffered until
/// `commit`. Dropping without committing discards the buffered writes.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Transactional read; registers the document for conflict handling
    /// where the backend supports it.
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Buffer a full document write.
    fn set(&mut self, collection: &str, id: &str, fields: FieldUpdates) -> Result<(), StoreError>;

    /// Buffer a field-level write.
    fn update(
        &mut self,
        collection: &str,
        id: &str,
        updates: FieldUpdates,
    ) -> Result<(), StoreError>;

    /// Commit all buffered writes atomically.
    async fn commit(&mut self) -> Result<(), StoreError>;

    /// Abort, discarding all buffered writes.
    async fn rollback(&mut self) -> Result<(), StoreError>;
}

/// Resolve sentinel values against a concrete commit time.
pub(crate) fn resolve_updates(
    updates: FieldUpdates,
    commit_time: &str,
) -> Vec<(String, serde_json::Value)> {
    updates
        .into_iter()
        .map(|(field, value)| {
            let value = match value {
                FieldValue::Json(v) => v,
                FieldValue::ServerTimestamp => serde_json::Value::String(commit_time.to_string()),
            };
            (field, value)
        })
        .collect()
}
