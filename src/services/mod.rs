// SPDX-License-Identifier: MIT

//! Services module - the engine's three components.

pub mod navigation;
pub mod profile_sync;
pub mod redemption;

pub use navigation::{NavigationController, View};
pub use profile_sync::ProfileSynchronizer;
pub use redemption::{RedemptionReceipt, RedemptionTransactor};
