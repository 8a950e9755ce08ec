// SPDX-License-Identifier: MIT

//! View navigation state machine.
//!
//! A fixed set of views, one current view, and a single-slot "back" memory.
//! There is deliberately no navigation stack: only one level of back exists
//! system-wide, and several views use a fixed back target instead of the
//! remembered slot. Both policies are enumerated per view below.

/// Every screen the UI layer can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Home,
    Login,
    AppDetail,
    LikedList,
    InAppBrowser,
    Profile,
    BugReport,
    Points,
    Upgrade,
    Settings,
    Support,
    LegalPrivacy,
    LegalTerms,
    LegalDisclaimer,
    RedeemCode,
}

/// What "back" does from a given view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackPolicy {
    /// Go to the remembered return view.
    Remembered,
    /// Always go to this view, regardless of where we came from.
    Fixed(View),
    /// Tab roots: back is not an action here.
    None,
}

impl View {
    fn back_policy(self) -> BackPolicy {
        match self {
            View::Home | View::LikedList | View::Profile => BackPolicy::None,
            View::Login => BackPolicy::Fixed(View::Home),
            View::Points => BackPolicy::Fixed(View::Profile),
            View::RedeemCode => BackPolicy::Fixed(View::Points),
            View::Settings => BackPolicy::Fixed(View::Profile),
            View::Support => BackPolicy::Fixed(View::Profile),
            View::LegalPrivacy | View::LegalTerms | View::LegalDisclaimer => {
                BackPolicy::Fixed(View::Settings)
            }
            View::AppDetail | View::InAppBrowser | View::BugReport | View::Upgrade => {
                BackPolicy::Remembered
            }
        }
    }

    /// Tab destinations that require a signed-in user.
    fn requires_auth(self) -> bool {
        matches!(self, View::LikedList | View::Profile | View::Points)
    }
}

/// Finite state machine over [`View`]s.
///
/// `current_view` is always a valid view by construction; there is no way to
/// reach an unrecognized state.
#[derive(Debug, Clone)]
pub struct NavigationController {
    current: View,
    return_view: View,
}

impl Default for NavigationController {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationController {
    pub fn new() -> Self {
        Self {
            current: View::Home,
            return_view: View::Home,
        }
    }

    pub fn current_view(&self) -> View {
        self.current
    }

    pub fn return_view(&self) -> View {
        self.return_view
    }

    /// Direct transition (tab bar, menu items).
    ///
    /// A gated target without authentication redirects to `Login`; the
    /// denied target never becomes current, not even transiently.
    pub fn go_to(&mut self, target: View, authenticated: bool) {
        let resolved = Self::gate(target, authenticated);
        tracing::debug!(from = ?self.current, to = ?resolved, "navigate");
        self.current = resolved;
    }

    /// Remember the origin, then transition.
    ///
    /// `AppDetail` can be entered from two list contexts, so its origin is
    /// pinned to `LikedList` or `Home` rather than the literal current view.
    /// Re-entering the view we are already on keeps the existing slot.
    pub fn go_to_remembering(&mut self, target: View, authenticated: bool) {
        let resolved = Self::gate(target, authenticated);
        if resolved != target {
            tracing::debug!(from = ?self.current, denied = ?target, "navigate gated to login");
            self.current = resolved;
            return;
        }

        if self.current != target {
            self.return_view = match target {
                View::AppDetail if self.current == View::LikedList => View::LikedList,
                View::AppDetail => View::Home,
                _ => self.current,
            };
        }
        tracing::debug!(from = ?self.current, to = ?target, remembered = ?self.return_view, "navigate remembering");
        self.current = target;
    }

    /// Back action for the current view.
    pub fn go_back(&mut self) {
        match self.current.back_policy() {
            BackPolicy::Remembered => self.current = self.return_view,
            BackPolicy::Fixed(target) => self.current = target,
            BackPolicy::None => {}
        }
    }

    /// Return to `Home` and clear the slot. Used on login success and
    /// logout.
    pub fn reset(&mut self) {
        self.current = View::Home;
        self.return_view = View::Home;
    }

    fn gate(target: View, authenticated: bool) -> View {
        if target.requires_auth() && !authenticated {
            View::Login
        } else {
            target
        }
    }
}
