// SPDX-License-Identifier: MIT

//! Nexa-Session: session and view-state synchronization engine for the Nexa
//! app catalog.
//!
//! Three components over one shared document store:
//! - [`services::NavigationController`]: view state machine with a
//!   single-slot back memory and auth gating;
//! - [`services::ProfileSynchronizer`]: optimistically mutated local
//!   profile replica, reconciled last-remote-wins against snapshot pushes;
//! - [`services::RedemptionTransactor`]: atomic gift-code redemption.
//!
//! The UI layer renders whatever view the controller selects and calls back
//! into the engine on gestures; it is not part of this crate.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

use std::sync::Arc;

use db::DocumentStore;
use error::Result;
use services::{
    NavigationController, ProfileSynchronizer, RedemptionReceipt, RedemptionTransactor, View,
};

/// One user session: navigation plus profile state over a shared store.
///
/// Wires the synchronizer's derived flags into the controller at transition
/// time, so gating always sees the current authentication state.
pub struct Session {
    nav: NavigationController,
    profile: ProfileSynchronizer,
    redemption: RedemptionTransactor,
}

impl Session {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            nav: NavigationController::new(),
            profile: ProfileSynchronizer::new(Arc::clone(&store)),
            redemption: RedemptionTransactor::new(store),
        }
    }

    // ─── Navigation ──────────────────────────────────────────────

    pub fn current_view(&self) -> View {
        self.nav.current_view()
    }

    pub fn go_to(&mut self, view: View) {
        self.nav.go_to(view, self.profile.is_authenticated());
    }

    pub fn go_to_remembering(&mut self, view: View) {
        self.nav.go_to_remembering(view, self.profile.is_authenticated());
    }

    pub fn go_back(&mut self) {
        self.nav.go_back();
    }

    // ─── Identity ────────────────────────────────────────────────

    /// Authenticate and land on the home view.
    pub async fn sign_in(&mut self, identity: &str, email: Option<&str>) -> Result<()> {
        self.profile.sign_in(identity, email).await?;
        self.nav.reset();
        Ok(())
    }

    /// Sign out, clear the replica, and land on the home view.
    pub fn sign_out(&mut self) {
        self.profile.sign_out();
        self.nav.reset();
    }

    // ─── Rewards ─────────────────────────────────────────────────

    /// Redeem a gift code for the signed-in user.
    pub async fn redeem(&self, code: &str) -> Result<RedemptionReceipt> {
        self.redemption.redeem(self.profile.identity(), code).await
    }

    // ─── Component access ────────────────────────────────────────

    pub fn profile(&self) -> &ProfileSynchronizer {
        &self.profile
    }

    pub fn profile_mut(&mut self) -> &mut ProfileSynchronizer {
        &mut self.profile
    }

    pub fn navigation(&self) -> &NavigationController {
        &self.nav
    }
}
