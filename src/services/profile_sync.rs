// SPDX-License-Identifier: MIT

//! Local replica of the user's profile document.
//!
//! The replica is a cache, never an authority: optimistic mutations land on
//! it immediately for zero-latency UI feedback, and every snapshot pushed by
//! the store replaces it wholesale. A stale push can visibly revert an
//! optimistic write until the backend catches up; that bounded flicker is
//! the accepted cost of last-remote-wins reconciliation.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::db::{collections, DocumentStore, FieldUpdates, FieldValue, SnapshotEvent, Subscription};
use crate::error::{Result, SessionError};
use crate::models::UserProfile;

/// Owns the in-memory profile replica and its standing subscription.
pub struct ProfileSynchronizer {
    store: Arc<dyn DocumentStore>,
    identity: Option<String>,
    replica: Option<UserProfile>,
    subscription: Option<Subscription>,
    in_flight: Vec<JoinHandle<()>>,
}

impl ProfileSynchronizer {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            identity: None,
            replica: None,
            subscription: None,
            in_flight: Vec::new(),
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────

    /// Start a session for `identity`.
    ///
    /// Ensures the remote profile document exists (creating it with guest
    /// defaults and server-assigned timestamps, or refreshing only
    /// `lastLogin`), then opens the standing subscription and applies any
    /// snapshot already delivered.
    pub async fn sign_in(&mut self, identity: &str, email: Option<&str>) -> Result<()> {
        if self.identity.is_some() {
            self.sign_out();
        }

        let existing = self
            .store
            .get_document(collections::USERS, identity)
            .await?;

        if existing.is_none() {
            let fields: FieldUpdates = vec![
                ("email".to_string(), serde_json::json!(email).into()),
                ("points".to_string(), serde_json::json!(0).into()),
                ("likedAppIds".to_string(), serde_json::json!([]).into()),
                ("isPremium".to_string(), serde_json::json!(false).into()),
                ("createdAt".to_string(), FieldValue::ServerTimestamp),
                ("lastLogin".to_string(), FieldValue::ServerTimestamp),
            ];
            self.store
                .set_document(collections::USERS, identity, fields)
                .await?;
            tracing::info!(identity, "Created profile document");
        } else {
            self.store
                .update_fields(
                    collections::USERS,
                    identity,
                    vec![("lastLogin".to_string(), FieldValue::ServerTimestamp)],
                )
                .await?;
        }

        self.subscription = Some(self.store.subscribe(collections::USERS, identity));
        self.identity = Some(identity.to_string());
        self.drain_remote();
        tracing::info!(identity, "Profile session started");
        Ok(())
    }

    /// End the session: tear down the subscription and clear the replica,
    /// synchronously, before any further reads.
    ///
    /// In-flight optimistic writes are left to finish on their own; they
    /// target the identity that issued them.
    pub fn sign_out(&mut self) {
        // Dropping the handle runs teardown exactly once.
        self.subscription.take();
        self.identity = None;
        self.replica = None;
        self.in_flight.clear();
        tracing::info!("Profile session ended");
    }

    // ─── Optimistic mutations ────────────────────────────────────

    /// Flip membership of `app_id` in the liked set.
    ///
    /// The replica changes immediately; the remote write is fire-and-forget.
    /// Returns the new membership. No-op for guests.
    pub fn toggle_like(&mut self, app_id: &str) -> bool {
        let Some(identity) = self.identity.clone() else {
            tracing::debug!(app_id, "toggle_like ignored for guest");
            return false;
        };

        let replica = self.replica.get_or_insert_with(UserProfile::default);
        let liked = if replica.liked_app_ids.remove(app_id) {
            false
        } else {
            replica.liked_app_ids.insert(app_id.to_string());
            true
        };

        let liked_ids = serde_json::Value::Array(
            replica
                .liked_app_ids
                .iter()
                .map(|id| serde_json::Value::String(id.clone()))
                .collect(),
        );
        self.spawn_write(
            identity,
            vec![("likedAppIds".to_string(), liked_ids.into())],
            "likedAppIds",
        );
        liked
    }

    /// Mark the user premium locally before the backend confirms.
    ///
    /// Called after the payment widget reports success. No-op for guests.
    pub fn set_premium_optimistically(&mut self) {
        let Some(identity) = self.identity.clone() else {
            tracing::debug!("set_premium ignored for guest");
            return;
        };

        self.replica
            .get_or_insert_with(UserProfile::default)
            .is_premium = true;
        self.spawn_write(
            identity,
            vec![("isPremium".to_string(), serde_json::json!(true).into())],
            "isPremium",
        );
    }

    /// A failed remote half of an optimistic mutation is logged and
    /// swallowed: the UI already shows the new value, and the next snapshot
    /// push restores consistency either way.
    fn spawn_write(&mut self, identity: String, updates: FieldUpdates, what: &'static str) {
        self.in_flight.retain(|handle| !handle.is_finished());
        let store = Arc::clone(&self.store);
        let handle = tokio::spawn(async move {
            if let Err(e) = store
                .update_fields(collections::USERS, &identity, updates)
                .await
            {
                let err = SessionError::WriteFailed(e.to_string());
                tracing::warn!(identity = %identity, field = what, error = %err, "Optimistic write not persisted");
            }
        });
        self.in_flight.push(handle);
    }

    /// Wait for all in-flight optimistic writes. Teardown and test seam.
    pub async fn flush_writes(&mut self) {
        for handle in self.in_flight.drain(..) {
            let _ = handle.await;
        }
    }

    // ─── Reconciliation ──────────────────────────────────────────

    /// Apply every subscription event that has already arrived. Returns the
    /// number of snapshots applied.
    pub fn drain_remote(&mut self) -> usize {
        let mut events = Vec::new();
        if let Some(subscription) = self.subscription.as_mut() {
            while let Some(event) = subscription.try_recv() {
                events.push(event);
            }
        }

        let mut applied = 0;
        for event in events {
            if self.apply_event(event) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the next subscription event and apply it. `false` when no
    /// subscription is open or the store side has closed.
    pub async fn recv_remote(&mut self) -> bool {
        let event = match self.subscription.as_mut() {
            Some(subscription) => subscription.recv().await,
            None => return false,
        };
        match event {
            Some(event) => {
                self.apply_event(event);
                true
            }
            None => false,
        }
    }

    fn apply_event(&mut self, event: SnapshotEvent) -> bool {
        match event {
            SnapshotEvent::Snapshot(Some(doc)) => {
                match serde_json::from_value::<UserProfile>(serde_json::Value::Object(doc)) {
                    Ok(remote) => {
                        self.replica = Some(Self::reconciled(self.replica.take(), remote));
                        true
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Ignoring malformed profile snapshot");
                        false
                    }
                }
            }
            SnapshotEvent::Snapshot(None) => {
                // Document not (yet) present remotely; keep whatever we have.
                tracing::debug!("Snapshot for absent profile document");
                false
            }
            SnapshotEvent::Error(message) => {
                let err = SessionError::Subscription(message);
                tracing::warn!(error = %err, "Degraded to static profile view");
                false
            }
        }
    }

    /// Last-remote-wins reconciliation: the pushed snapshot replaces the
    /// local replica unconditionally. No field merge, no timestamps.
    fn reconciled(local: Option<UserProfile>, remote: UserProfile) -> UserProfile {
        let _ = local;
        remote
    }

    // ─── Derived state ───────────────────────────────────────────
    //
    // All accessors degrade to guest defaults when no replica is held; none
    // of them can panic.

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn is_premium_user(&self) -> bool {
        self.replica
            .as_ref()
            .map(|profile| profile.is_premium)
            .unwrap_or(false)
    }

    pub fn points(&self) -> u64 {
        self.replica
            .as_ref()
            .map(|profile| profile.points)
            .unwrap_or(0)
    }

    pub fn liked_app_ids(&self) -> BTreeSet<String> {
        self.replica
            .as_ref()
            .map(|profile| profile.liked_app_ids.clone())
            .unwrap_or_default()
    }

    pub fn likes(&self, app_id: &str) -> bool {
        self.replica
            .as_ref()
            .map(|profile| profile.liked_app_ids.contains(app_id))
            .unwrap_or(false)
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.replica.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_with_points(points: u64) -> UserProfile {
        UserProfile {
            points,
            ..UserProfile::default()
        }
    }

    #[test]
    fn reconciliation_prefers_remote() {
        let local = Some(profile_with_points(999));
        let remote = profile_with_points(10);
        assert_eq!(
            ProfileSynchronizer::reconciled(local, remote.clone()),
            remote
        );
    }

    #[test]
    fn reconciliation_is_idempotent() {
        let snapshot = profile_with_points(10);
        let once = ProfileSynchronizer::reconciled(None, snapshot.clone());
        let twice = ProfileSynchronizer::reconciled(Some(once.clone()), snapshot);
        assert_eq!(once, twice);
    }
}
