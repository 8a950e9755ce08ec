// SPDX-License-Identifier: MIT

//! Session error taxonomy with user-facing messages.

use crate::db::StoreError;

/// Everything that can go wrong inside the session engine.
///
/// Nothing here is fatal: the worst outcome is stale local data that the
/// next remote snapshot corrects.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Authentication required")]
    NotAuthenticated,

    #[error("Gift code not found or inactive")]
    CodeNotFound,

    #[error("Gift code usage limit reached")]
    UsageLimitReached,

    #[error("Redemption transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Profile subscription failed: {0}")]
    Subscription(String),

    #[error("Optimistic write failed: {0}")]
    WriteFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    /// The message shown to the user.
    ///
    /// `NotAuthenticated`, `CodeNotFound` and `UsageLimitReached` are
    /// specific and recoverable with different input; everything else
    /// collapses into a generic retry prompt.
    pub fn user_message(&self) -> &'static str {
        match self {
            SessionError::NotAuthenticated => "Please sign in first.",
            SessionError::CodeNotFound => "Invalid or expired code.",
            SessionError::UsageLimitReached => "Code usage limit reached.",
            SessionError::TransactionFailed(_) => "Failed to redeem code.",
            SessionError::Subscription(_) | SessionError::WriteFailed(_) | SessionError::Store(_) => {
                "Something went wrong. Please try again."
            }
        }
    }
}

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
