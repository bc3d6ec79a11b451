//! Route guard — decides whether a destination may render for the current session.
//!
//! DESIGN
//! ======
//! `RouteGuard::evaluate` is a pure predicate over a `SessionSnapshot` and a
//! path. It is cheap and meant to be called on every navigation and again
//! on every session transition; `next_verdict` packages the latter for hosts
//! holding a `watch::Receiver`. `Navigator` adds the one piece of state the
//! predicate can't hold: the destination to return to after logging in.

use tokio::sync::watch;

use crate::session::SessionStore;
use crate::types::{Readiness, SessionSnapshot};

pub const LOGIN_PATH: &str = "/login";
pub const SIGNUP_PATH: &str = "/signup";
/// Where a fresh login lands when no destination was captured.
pub const DEFAULT_LANDING: &str = "/dashboard";

const PROTECTED_ROUTES: &[&str] = &["/dashboard", "/upload", "/scan/:scan_id", "/analytics"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Protected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Identity still resolving: render nothing yet.
    Suspend,
    Allow,
    /// Send the user to `to`, remembering `return_to` for after login.
    Redirect { to: String, return_to: String },
}

// =============================================================================
// ROUTE PATTERNS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
}

/// Path pattern such as `/scan/:scan_id`; `:name` matches one non-empty segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let segments = split_path(raw)
            .map(|seg| {
                if seg.starts_with(':') {
                    Segment::Param
                } else {
                    Segment::Literal(seg.to_owned())
                }
            })
            .collect();
        Self { raw: raw.to_owned(), segments }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let mut parts = split_path(strip_query(path));
        for segment in &self.segments {
            match (segment, parts.next()) {
                (Segment::Literal(lit), Some(part)) if lit == part => {}
                (Segment::Param, Some(_)) => {}
                _ => return false,
            }
        }
        parts.next().is_none()
    }
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or_default()
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

// =============================================================================
// GUARD
// =============================================================================

#[derive(Debug, Clone)]
pub struct RouteGuard {
    login_path: String,
    protected: Vec<RoutePattern>,
}

impl Default for RouteGuard {
    /// The scan application's route table.
    fn default() -> Self {
        Self::new(LOGIN_PATH, PROTECTED_ROUTES.iter().copied())
    }
}

impl RouteGuard {
    #[must_use]
    pub fn new<'a>(login_path: &str, protected: impl IntoIterator<Item = &'a str>) -> Self {
        Self { login_path: login_path.to_owned(), protected: protected.into_iter().map(RoutePattern::parse).collect() }
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Anything not in the protected table is public.
    #[must_use]
    pub fn access(&self, path: &str) -> Access {
        if self.protected.iter().any(|p| p.matches(path)) {
            Access::Protected
        } else {
            Access::Public
        }
    }

    #[must_use]
    pub fn evaluate(&self, snapshot: &SessionSnapshot, destination: &str) -> Verdict {
        if self.access(destination) == Access::Public {
            return Verdict::Allow;
        }
        match snapshot.readiness {
            Readiness::Pending => Verdict::Suspend,
            Readiness::Authenticated(_) => Verdict::Allow,
            Readiness::Anonymous => {
                Verdict::Redirect { to: self.login_path.clone(), return_to: destination.to_owned() }
            }
        }
    }

    /// Final verdict for `destination`, waiting out a pending resolution first.
    pub async fn navigate(&self, session: &SessionStore, destination: &str) -> Verdict {
        match self.evaluate(&session.snapshot(), destination) {
            Verdict::Suspend => {
                let resolved = session.wait_until_resolved().await;
                self.evaluate(&resolved, destination)
            }
            verdict => verdict,
        }
    }

    /// Wait for the next session transition and re-evaluate `destination`.
    /// Returns `None` once the session is gone.
    pub async fn next_verdict(&self, rx: &mut watch::Receiver<SessionSnapshot>, destination: &str) -> Option<Verdict> {
        rx.changed().await.ok()?;
        let snapshot = rx.borrow_and_update().clone();
        Some(self.evaluate(&snapshot, destination))
    }
}

// =============================================================================
// NAVIGATOR
// =============================================================================

/// Guarded navigation with a remembered return target.
#[derive(Debug)]
pub struct Navigator {
    guard: RouteGuard,
    session: SessionStore,
    return_to: Option<String>,
}

impl Navigator {
    #[must_use]
    pub fn new(guard: RouteGuard, session: SessionStore) -> Self {
        Self { guard, session, return_to: None }
    }

    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Navigate to `destination`; a redirect captures it as the return target.
    pub async fn visit(&mut self, destination: &str) -> Verdict {
        let verdict = self.guard.navigate(&self.session, destination).await;
        if let Verdict::Redirect { return_to, .. } = &verdict {
            tracing::debug!(%return_to, "guard redirect");
            self.return_to = Some(return_to.clone());
        }
        verdict
    }

    #[must_use]
    pub fn pending_return(&self) -> Option<&str> {
        self.return_to.as_deref()
    }

    /// Where to go after a successful login. Consumes the captured target.
    pub fn take_return_target(&mut self) -> String {
        self.return_to.take().unwrap_or_else(|| DEFAULT_LANDING.to_owned())
    }
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
