// SPDX-License-Identifier: MIT

//! User profile model.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// User profile document, one per authenticated identity.
///
/// The identity itself is the document id, not a field. Field names follow
/// the store's existing camelCase schema. Every field defaults, so a
/// partially written remote document still deserializes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    /// Email address (may be absent for anonymous sign-in)
    pub email: Option<String>,
    /// Reward points balance
    pub points: u64,
    /// Ids of liked catalog apps; a set, so no duplicates by construction
    pub liked_app_ids: BTreeSet<String>,
    /// Premium entitlement flag
    pub is_premium: bool,
    /// When the profile was created (server-assigned, RFC 3339)
    pub created_at: String,
    /// Last session start (server-assigned, RFC 3339)
    pub last_login: String,
}
