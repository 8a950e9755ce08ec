// SPDX-License-Identifier: MIT

//! Firestore implementation of the document-store interface.
//!
//! Thin adapter over the `firestore` crate's fluent API. Profile documents
//! live in `users`, gift codes in `gift_codes` (keyed by the code string),
//! redemption log entries in `points_logs`.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::store::{
    resolve_updates, Document, DocumentStore, FieldFilter, FieldUpdates, SnapshotEvent,
    StoreError, StoreTransaction, Subscription,
};

/// How often the standing subscription polls for a fresh snapshot.
const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreStore {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreStore {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, StoreError> {
        // If the emulator environment variable is set, use unauthenticated
        // connection to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, StoreError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            StoreError::Backend(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a client for the project named in the configuration.
    pub async fn from_config(config: &crate::config::Config) -> Result<Self, StoreError> {
        Self::new(&config.gcp_project_id).await
    }

    /// Create a mock client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, StoreError> {
        self.client.as_ref().ok_or_else(|| {
            StoreError::Backend("Database not connected (offline mode)".to_string())
        })
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(id)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        fields: FieldUpdates,
    ) -> Result<(), StoreError> {
        // The sentinel is resolved against the adapter's clock; the engine
        // never reads these timestamps back for ordering decisions.
        let doc: Document = resolve_updates(fields, &chrono::Utc::now().to_rfc3339())
            .into_iter()
            .collect();
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .object(&doc)
            .execute()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        updates: FieldUpdates,
    ) -> Result<(), StoreError> {
        let resolved = resolve_updates(updates, &chrono::Utc::now().to_rfc3339());
        let field_names: Vec<String> = resolved.iter().map(|(field, _)| field.clone()).collect();
        let doc: Document = resolved.into_iter().collect();
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(field_names)
            .in_col(collection)
            .document_id(id)
            .object(&doc)
            .execute()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn query_where(
        &self,
        collection: &str,
        filters: &[FieldFilter],
    ) -> Result<Vec<Document>, StoreError> {
        let filters = filters.to_vec();
        self.get_client()?
            .fluent()
            .select()
            .from(collection)
            .filter(move |q| {
                q.for_all(
                    filters
                        .iter()
                        .map(|filter| q.field(filter.field.clone()).eq(filter.equals.clone())),
                )
            })
            .obj()
            .query()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn subscribe(&self, collection: &str, id: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();

        let client = match self.client.clone() {
            Some(client) => client,
            None => {
                let _ = tx.send(SnapshotEvent::Error(
                    "Database not connected (offline mode)".to_string(),
                ));
                return Subscription::new(rx, || {});
            }
        };

        let collection = collection.to_string();
        let id = id.to_string();
        let handle = tokio::spawn(async move {
            let mut last_seen: Option<Option<Document>> = None;
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            loop {
                interval.tick().await;
                let result: Result<Option<Document>, _> = client
                    .fluent()
                    .select()
                    .by_id_in(&collection)
                    .obj()
                    .one(&id)
                    .await;
                match result {
                    Ok(snapshot) => {
                        if last_seen.as_ref() != Some(&snapshot) {
                            last_seen = Some(snapshot.clone());
                            if tx.send(SnapshotEvent::Snapshot(snapshot)).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            collection = %collection,
                            id = %id,
                            error = %e,
                            "Snapshot poll failed"
                        );
                        if tx.send(SnapshotEvent::Error(e.to_string())).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Subscription::new(rx, move || handle.abort())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        let db = self.get_client()?;
        let txn = db
            .begin_transaction()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to begin transaction: {}", e)))?;
        Ok(Box::new(FirestoreStoreTransaction {
            db,
            txn: Some(txn),
        }))
    }
}

struct FirestoreStoreTransaction<'a> {
    db: &'a firestore::FirestoreDb,
    txn: Option<firestore::FirestoreTransaction<'a>>,
}

#[async_trait]
impl<'a> StoreTransaction for FirestoreStoreTransaction<'a> {
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        if self.txn.is_none() {
            return Err(StoreError::Backend("transaction already finished".into()));
        }
        self.db
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(id)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to read in transaction: {}", e)))
    }

    fn set(&mut self, collection: &str, id: &str, fields: FieldUpdates) -> Result<(), StoreError> {
        let doc: Document = resolve_updates(fields, &chrono::Utc::now().to_rfc3339())
            .into_iter()
            .collect();
        let txn = self
            .txn
            .as_mut()
            .ok_or_else(|| StoreError::Backend("transaction already finished".to_string()))?;
        self.db
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .object(&doc)
            .add_to_transaction(txn)
            .map_err(|e| {
                StoreError::Backend(format!("Failed to add write to transaction: {}", e))
            })?;
        Ok(())
    }

    fn update(
        &mut self,
        collection: &str,
        id: &str,
        updates: FieldUpdates,
    ) -> Result<(), StoreError> {
        let resolved = resolve_updates(updates, &chrono::Utc::now().to_rfc3339());
        let field_names: Vec<String> = resolved.iter().map(|(field, _)| field.clone()).collect();
        let doc: Document = resolved.into_iter().collect();
        let txn = self
            .txn
            .as_mut()
            .ok_or_else(|| StoreError::Backend("transaction already finished".to_string()))?;
        self.db
            .fluent()
            .update()
            .fields(field_names)
            .in_col(collection)
            .document_id(id)
            .object(&doc)
            .add_to_transaction(txn)
            .map_err(|e| {
                StoreError::Backend(format!("Failed to add update to transaction: {}", e))
            })?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let txn = self
            .txn
            .take()
            .ok_or_else(|| StoreError::Backend("transaction already finished".to_string()))?;
        txn.commit()
            .await
            .map_err(|e| StoreError::Backend(format!("Transaction commit failed: {}", e)))?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        let txn = self
            .txn
            .take()
            .ok_or_else(|| StoreError::Backend("transaction already finished".to_string()))?;
        let _ = txn.rollback().await;
        Ok(())
    }
}
