// SPDX-License-Identifier: MIT

//! Atomic gift-code redemption.
//!
//! The code's usage counter is the one shared, limited resource in the
//! system. It is protected exclusively by the store's transaction mechanism:
//! the counter is re-read inside the transaction, so of two concurrent
//! redemptions racing for the last use, exactly one commits.

use std::sync::Arc;

use crate::db::{collections, DocumentStore, FieldFilter};
use crate::error::{Result, SessionError};
use crate::models::GiftCode;

/// Reason string recorded on every redemption log entry.
const REDEEM_REASON: &str = "Gift Code Redeem";

/// What a successful redemption awarded, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedemptionReceipt {
    pub points_awarded: u64,
}

/// Executes code redemptions against the remote store.
#[derive(Clone)]
pub struct RedemptionTransactor {
    store: Arc<dyn DocumentStore>,
}

impl RedemptionTransactor {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Redeem `code` for `identity`.
    ///
    /// All three writes (profile points, code usage counter, log entry)
    /// commit atomically or not at all. The caller refreshes the replica
    /// afterwards, optimistically or via the next snapshot push.
    pub async fn redeem(&self, identity: Option<&str>, code: &str) -> Result<RedemptionReceipt> {
        let identity = identity.ok_or(SessionError::NotAuthenticated)?;
        let code = code.trim();
        if code.is_empty() {
            return Err(SessionError::CodeNotFound);
        }

        // Existence pre-check outside the transaction; authoritative values
        // are re-read inside it.
        let matches = self
            .store
            .query_where(
                collections::GIFT_CODES,
                &[
                    FieldFilter::eq("code", serde_json::json!(code)),
                    FieldFilter::eq("active", serde_json::json!(true)),
                ],
            )
            .await
            .map_err(|e| SessionError::TransactionFailed(e.to_string()))?;
        if matches.is_empty() {
            return Err(SessionError::CodeNotFound);
        }

        let mut txn = self
            .store
            .begin_transaction()
            .await
            .map_err(|e| SessionError::TransactionFailed(e.to_string()))?;

        let gift = match txn
            .get(collections::GIFT_CODES, code)
            .await
            .map_err(|e| SessionError::TransactionFailed(e.to_string()))?
        {
            Some(doc) => serde_json::from_value::<GiftCode>(serde_json::Value::Object(doc))
                .map_err(|e| SessionError::TransactionFailed(format!("malformed gift code: {}", e)))?,
            None => {
                let _ = txn.rollback().await;
                return Err(SessionError::CodeNotFound);
            }
        };

        // The pre-check can be stale on both counts.
        if !gift.active {
            let _ = txn.rollback().await;
            return Err(SessionError::CodeNotFound);
        }
        if gift.limit_reached() {
            let _ = txn.rollback().await;
            tracing::info!(code, used = gift.used_count, "Redemption rejected, limit reached");
            return Err(SessionError::UsageLimitReached);
        }

        let current_points = match txn
            .get(collections::USERS, identity)
            .await
            .map_err(|e| SessionError::TransactionFailed(e.to_string()))?
        {
            Some(doc) => doc.get("points").and_then(|v| v.as_u64()).unwrap_or(0),
            None => {
                let _ = txn.rollback().await;
                return Err(SessionError::TransactionFailed(
                    "profile document missing".to_string(),
                ));
            }
        };

        txn.update(
            collections::USERS,
            identity,
            vec![(
                "points".to_string(),
                serde_json::json!(current_points + gift.points).into(),
            )],
        )
        .map_err(|e| SessionError::TransactionFailed(e.to_string()))?;

        txn.update(
            collections::GIFT_CODES,
            code,
            vec![(
                "usedCount".to_string(),
                serde_json::json!(gift.used_count + 1).into(),
            )],
        )
        .map_err(|e| SessionError::TransactionFailed(e.to_string()))?;

        let log_id = uuid::Uuid::new_v4().to_string();
        txn.set(
            collections::POINTS_LOGS,
            &log_id,
            vec![
                ("userId".to_string(), serde_json::json!(identity).into()),
                ("amount".to_string(), serde_json::json!(gift.points).into()),
                ("reason".to_string(), serde_json::json!(REDEEM_REASON).into()),
                ("code".to_string(), serde_json::json!(gift.code).into()),
                (
                    "timestamp".to_string(),
                    crate::db::FieldValue::ServerTimestamp,
                ),
            ],
        )
        .map_err(|e| SessionError::TransactionFailed(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| SessionError::TransactionFailed(e.to_string()))?;

        tracing::info!(
            identity,
            code,
            points = gift.points,
            "Code redeemed"
        );

        Ok(RedemptionReceipt {
            points_awarded: gift.points,
        })
    }
}
