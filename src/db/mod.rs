// SPDX-License-Identifier: MIT

//! Document store layer: the narrow interface plus its two backends.

pub mod firestore;
pub mod memory;
pub mod store;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;
pub use store::{
    Document, DocumentStore, FieldFilter, FieldUpdates, FieldValue, SnapshotEvent, StoreError,
    StoreTransaction, Subscription,
};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Gift codes, keyed by the code string itself.
    pub const GIFT_CODES: &str = "gift_codes";
    /// Append-only redemption audit log.
    pub const POINTS_LOGS: &str = "points_logs";
}
