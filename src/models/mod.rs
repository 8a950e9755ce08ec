// SPDX-License-Identifier: MIT

//! Data models for the session engine.

pub mod profile;
pub mod rewards;

pub use profile::UserProfile;
pub use rewards::{GiftCode, RedemptionLogEntry};
