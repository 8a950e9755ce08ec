// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use nexa_session::db::{
    collections, Document, DocumentStore, FieldFilter, FieldUpdates, MemoryStore, StoreError,
    StoreTransaction, Subscription,
};
use nexa_session::error::SessionError;
use nexa_session::models::RedemptionLogEntry;
use nexa_session::services::RedemptionTransactor;

mod common;
use common::{init_tracing, memory_store, seed_gift_code, seed_profile};

/// Store that deactivates one gift code right after the first query against
/// it, so the code's pre-check and its transactional re-read disagree.
struct DeactivatesAfterQuery {
    inner: Arc<MemoryStore>,
    code: String,
    fired: AtomicBool,
}

#[async_trait]
impl DocumentStore for DeactivatesAfterQuery {
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        self.inner.get_document(collection, id).await
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        fields: FieldUpdates,
    ) -> Result<(), StoreError> {
        self.inner.set_document(collection, id, fields).await
    }

    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        updates: FieldUpdates,
    ) -> Result<(), StoreError> {
        self.inner.update_fields(collection, id, updates).await
    }

    async fn query_where(
        &self,
        collection: &str,
        filters: &[FieldFilter],
    ) -> Result<Vec<Document>, StoreError> {
        let matches = self.inner.query_where(collection, filters).await?;
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.inner
                .update_fields(
                    collections::GIFT_CODES,
                    &self.code,
                    vec![("active".to_string(), serde_json::json!(false).into())],
                )
                .await?;
        }
        Ok(matches)
    }

    fn subscribe(&self, collection: &str, id: &str) -> Subscription {
        self.inner.subscribe(collection, id)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        self.inner.begin_transaction().await
    }
}

#[tokio::test]
async fn redeem_requires_authentication() {
    let store = memory_store();
    seed_gift_code(&store, "WELCOME50", true, 50, None, 0).await;
    let transactor = RedemptionTransactor::new(store);

    let err = transactor
        .redeem(None, "WELCOME50")
        .await
        .expect_err("guest redemption must fail");
    assert!(matches!(err, SessionError::NotAuthenticated));
    assert_eq!(err.user_message(), "Please sign in first.");
}

#[tokio::test]
async fn unknown_and_inactive_codes_are_equivalent() {
    let store = memory_store();
    seed_profile(&store, "user-1", 0, false).await;
    seed_gift_code(&store, "RETIRED", false, 50, None, 0).await;
    let transactor = RedemptionTransactor::new(store);

    for code in ["NEVER-EXISTED", "RETIRED", "", "   "] {
        let err = transactor
            .redeem(Some("user-1"), code)
            .await
            .expect_err("must fail");
        assert!(matches!(err, SessionError::CodeNotFound), "code {code:?}");
        assert_eq!(err.user_message(), "Invalid or expired code.");
    }
}

#[tokio::test]
async fn code_matching_is_case_sensitive() {
    let store = memory_store();
    seed_profile(&store, "user-1", 0, false).await;
    seed_gift_code(&store, "Welcome50", true, 50, None, 0).await;
    let transactor = RedemptionTransactor::new(store);

    let err = transactor
        .redeem(Some("user-1"), "WELCOME50")
        .await
        .expect_err("wrong case must fail");
    assert!(matches!(err, SessionError::CodeNotFound));
}

#[tokio::test]
async fn redeem_awards_points_and_logs_exactly_once() {
    init_tracing();
    let store = memory_store();
    seed_profile(&store, "user-1", 100, false).await;
    seed_gift_code(&store, "BONUS", true, 50, Some(10), 3).await;
    let transactor = RedemptionTransactor::new(store.clone());

    // Surrounding whitespace is stripped before matching.
    let receipt = transactor
        .redeem(Some("user-1"), "  BONUS ")
        .await
        .expect("redeem");
    assert_eq!(receipt.points_awarded, 50);

    let profile = store
        .get_document(collections::USERS, "user-1")
        .await
        .expect("get")
        .expect("profile");
    assert_eq!(profile["points"], serde_json::json!(150));

    let code = store
        .get_document(collections::GIFT_CODES, "BONUS")
        .await
        .expect("get")
        .expect("gift code");
    assert_eq!(code["usedCount"], serde_json::json!(4));

    let logs = store
        .query_where(
            collections::POINTS_LOGS,
            &[FieldFilter::eq("code", serde_json::json!("BONUS"))],
        )
        .await
        .expect("query logs");
    assert_eq!(logs.len(), 1, "exactly one audit record");
    let entry: RedemptionLogEntry =
        serde_json::from_value(serde_json::Value::Object(logs[0].clone())).expect("log entry");
    assert_eq!(entry.user_id, "user-1");
    assert_eq!(entry.amount, 50);
    assert_eq!(entry.code, "BONUS");
    assert_eq!(entry.reason, "Gift Code Redeem");
    assert!(!entry.timestamp.is_empty(), "server-assigned timestamp");
}

#[tokio::test]
async fn code_deactivated_after_the_pre_check_is_rejected_in_the_transaction() {
    init_tracing();
    let store = memory_store();
    seed_profile(&store, "user-1", 100, false).await;
    seed_gift_code(&store, "SHORT-LIVED", true, 50, None, 7).await;
    let racing = Arc::new(DeactivatesAfterQuery {
        inner: store.clone(),
        code: "SHORT-LIVED".to_string(),
        fired: AtomicBool::new(false),
    });
    let transactor = RedemptionTransactor::new(racing);

    // The pre-check sees the code active; the re-read inside the
    // transaction must not.
    let err = transactor
        .redeem(Some("user-1"), "SHORT-LIVED")
        .await
        .expect_err("deactivated code must fail");
    assert!(matches!(err, SessionError::CodeNotFound));

    let profile = store
        .get_document(collections::USERS, "user-1")
        .await
        .expect("get")
        .expect("profile");
    assert_eq!(profile["points"], serde_json::json!(100), "no award");
    let code = store
        .get_document(collections::GIFT_CODES, "SHORT-LIVED")
        .await
        .expect("get")
        .expect("gift code");
    assert_eq!(code["usedCount"], serde_json::json!(7), "counter untouched");
    let logs = store
        .query_where(
            collections::POINTS_LOGS,
            &[FieldFilter::eq("code", serde_json::json!("SHORT-LIVED"))],
        )
        .await
        .expect("query logs");
    assert!(logs.is_empty(), "no audit record");
}

#[tokio::test]
async fn exhausted_code_is_rejected_without_side_effects() {
    let store = memory_store();
    seed_profile(&store, "user-1", 100, false).await;
    seed_gift_code(&store, "LIMITED", true, 50, Some(2), 2).await;
    let transactor = RedemptionTransactor::new(store.clone());

    let err = transactor
        .redeem(Some("user-1"), "LIMITED")
        .await
        .expect_err("exhausted code must fail");
    assert!(matches!(err, SessionError::UsageLimitReached));
    assert_eq!(err.user_message(), "Code usage limit reached.");

    let profile = store
        .get_document(collections::USERS, "user-1")
        .await
        .expect("get")
        .expect("profile");
    assert_eq!(profile["points"], serde_json::json!(100), "no award");
    let code = store
        .get_document(collections::GIFT_CODES, "LIMITED")
        .await
        .expect("get")
        .expect("gift code");
    assert_eq!(code["usedCount"], serde_json::json!(2), "counter untouched");
}

#[tokio::test]
async fn concurrent_redemptions_of_the_last_use_resolve_to_one_winner() {
    init_tracing();
    let store = memory_store();
    seed_profile(&store, "user-1", 0, false).await;
    seed_gift_code(&store, "ONE-SHOT", true, 50, Some(1), 0).await;
    let transactor = RedemptionTransactor::new(store.clone());

    let (first, second) = tokio::join!(
        transactor.redeem(Some("user-1"), "ONE-SHOT"),
        transactor.redeem(Some("user-1"), "ONE-SHOT"),
    );

    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one winner");
    let loser = if first.is_ok() { second } else { first };
    assert!(matches!(
        loser.expect_err("loser"),
        SessionError::UsageLimitReached
    ));

    let code = store
        .get_document(collections::GIFT_CODES, "ONE-SHOT")
        .await
        .expect("get")
        .expect("gift code");
    assert_eq!(code["usedCount"], serde_json::json!(1), "never 2");

    let profile = store
        .get_document(collections::USERS, "user-1")
        .await
        .expect("get")
        .expect("profile");
    assert_eq!(profile["points"], serde_json::json!(50), "awarded once");

    let logs = store
        .query_where(
            collections::POINTS_LOGS,
            &[FieldFilter::eq("code", serde_json::json!("ONE-SHOT"))],
        )
        .await
        .expect("query logs");
    assert_eq!(logs.len(), 1);
}

#[tokio::test]
async fn unlimited_codes_never_exhaust() {
    let store = memory_store();
    seed_profile(&store, "user-1", 0, false).await;
    seed_gift_code(&store, "EVERGREEN", true, 10, None, 12_345).await;
    let transactor = RedemptionTransactor::new(store.clone());

    let receipt = transactor
        .redeem(Some("user-1"), "EVERGREEN")
        .await
        .expect("redeem");
    assert_eq!(receipt.points_awarded, 10);

    let code = store
        .get_document(collections::GIFT_CODES, "EVERGREEN")
        .await
        .expect("get")
        .expect("gift code");
    assert_eq!(code["usedCount"], serde_json::json!(12_346));
}
