// SPDX-License-Identifier: MIT

//! Gift code and redemption log models.

use serde::{Deserialize, Serialize};

/// A redeemable gift code. Read-only for the engine except for
/// `usedCount`, which only ever changes inside a store transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftCode {
    /// The code string, exact and case-sensitive; also the document id
    pub code: String,
    /// Inactive codes are invisible to redemption
    pub active: bool,
    /// Points awarded on redemption
    pub points: u64,
    /// Maximum number of redemptions; unlimited when absent
    #[serde(default)]
    pub usage_limit: Option<u64>,
    /// Server-authoritative redemption counter
    #[serde(default)]
    pub used_count: u64,
}

impl GiftCode {
    /// Whether the usage limit has been exhausted.
    pub fn limit_reached(&self) -> bool {
        matches!(self.usage_limit, Some(limit) if self.used_count >= limit)
    }
}

/// Append-only audit record for a points award.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionLogEntry {
    pub user_id: String,
    pub amount: u64,
    pub reason: String,
    pub code: String,
    /// Server-assigned, RFC 3339
    pub timestamp: String,
}
