// SPDX-License-Identifier: MIT

use std::sync::Arc;

use nexa_session::db::{collections, DocumentStore, MemoryStore};

/// Initialize test logging once; later calls are no-ops.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[allow(dead_code)]
pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

/// Seed a profile document directly, bypassing the synchronizer.
#[allow(dead_code)]
pub async fn seed_profile(store: &MemoryStore, identity: &str, points: u64, is_premium: bool) {
    store
        .set_document(
            collections::USERS,
            identity,
            vec![
                (
                    "email".to_string(),
                    serde_json::json!(format!("{identity}@example.com")).into(),
                ),
                ("points".to_string(), serde_json::json!(points).into()),
                ("likedAppIds".to_string(), serde_json::json!([]).into()),
                (
                    "isPremium".to_string(),
                    serde_json::json!(is_premium).into(),
                ),
                (
                    "createdAt".to_string(),
                    serde_json::json!("2024-01-01T00:00:00Z").into(),
                ),
                (
                    "lastLogin".to_string(),
                    serde_json::json!("2024-01-01T00:00:00Z").into(),
                ),
            ],
        )
        .await
        .expect("seed profile");
}

/// Seed a gift code document, keyed by the code string.
#[allow(dead_code)]
pub async fn seed_gift_code(
    store: &MemoryStore,
    code: &str,
    active: bool,
    points: u64,
    usage_limit: Option<u64>,
    used_count: u64,
) {
    store
        .set_document(
            collections::GIFT_CODES,
            code,
            vec![
                ("code".to_string(), serde_json::json!(code).into()),
                ("active".to_string(), serde_json::json!(active).into()),
                ("points".to_string(), serde_json::json!(points).into()),
                (
                    "usageLimit".to_string(),
                    serde_json::json!(usage_limit).into(),
                ),
                (
                    "usedCount".to_string(),
                    serde_json::json!(used_count).into(),
                ),
            ],
        )
        .await
        .expect("seed gift code");
}
