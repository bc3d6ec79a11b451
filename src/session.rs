//! Session store — single source of truth for who the current user is.
//!
//! DESIGN
//! ======
//! `SessionStore` is a cheap-to-clone handle. Consumers receive it
//! explicitly; there is no global. The credential and readiness are
//! published together as a `SessionSnapshot` through a `watch` channel, so
//! readers never see one without the other and can subscribe to every
//! transition.
//!
//! SUPERSEDE DISCIPLINE
//! ====================
//! Every operation draws a ticket from a monotonic counter when it is
//! issued. A result is committed only if no later-issued operation has
//! committed first. Failed operations commit nothing, so they never strand
//! an earlier in-flight bootstrap in `Pending`. Storage writes happen inside
//! the commit, under the ticket lock, so a superseded result never touches
//! the persisted credential.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::api::{ApiError, HttpIdentityApi, IdentityApi, Registration};
use crate::config::SessionConfig;
use crate::storage::{CredentialStore, FileCredentialStore};
use crate::types::{Credential, Identity, Readiness, SessionSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Login failed: bad credentials, service error, or unreachable service.
    #[error("invalid credentials")]
    Rejected,
    /// Registration or the automatic login after it failed.
    #[error("registration failed")]
    RegistrationFailed,
    /// A later operation committed first; this result was discarded.
    #[error("superseded by a later session operation")]
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Ticket(u64);

#[derive(Debug, Default)]
struct Tickets {
    issued: u64,
    committed: u64,
}

/// What a commit does to the persisted credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Persist {
    Save,
    Clear,
    Keep,
}

struct Inner {
    api: Arc<dyn IdentityApi>,
    storage: Arc<dyn CredentialStore>,
    tickets: Mutex<Tickets>,
    state: watch::Sender<SessionSnapshot>,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// New store in the `Pending` state. Call [`SessionStore::bootstrap`] once
    /// at startup to resolve it.
    #[must_use]
    pub fn new(api: Arc<dyn IdentityApi>, storage: Arc<dyn CredentialStore>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::pending());
        Self { inner: Arc::new(Inner { api, storage, tickets: Mutex::new(Tickets::default()), state }) }
    }

    /// HTTP identity API plus a file-backed credential under `config.state_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_config(config: &SessionConfig) -> Result<Self, ApiError> {
        let api = HttpIdentityApi::new(config.clone())?;
        let storage = FileCredentialStore::in_dir(&config.state_dir);
        Ok(Self::new(Arc::new(api), Arc::new(storage)))
    }

    // =========================================================================
    // READERS
    // =========================================================================

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    #[must_use]
    pub fn readiness(&self) -> Readiness {
        self.inner.state.borrow().readiness.clone()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.inner.state.borrow().identity().cloned()
    }

    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.inner.state.borrow().credential.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// Receiver notified on every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    /// Wait until readiness leaves `Pending` and return that snapshot.
    pub async fn wait_until_resolved(&self) -> SessionSnapshot {
        let mut rx = self.subscribe();
        match rx.wait_for(|snap| !snap.readiness.is_pending()).await {
            Ok(snap) => snap.clone(),
            Err(_) => self.snapshot(),
        }
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Rebuild the session from the persisted credential, once per startup.
    ///
    /// No stored credential resolves straight to `Anonymous` without touching
    /// the network. A stored credential that fails to resolve for any reason
    /// is removed from storage. Failures are logged, never returned.
    pub async fn bootstrap(&self) -> Readiness {
        let ticket = self.issue();

        let stored = match self.inner.storage.load() {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(error = %e, "credential load failed; starting anonymous");
                None
            }
        };

        let Some(credential) = stored else {
            self.commit(ticket, SessionSnapshot::anonymous(), Persist::Keep);
            return self.readiness();
        };

        self.mark_pending(ticket, credential.clone());

        match self.inner.api.resolve_identity(&credential).await {
            Ok(identity) => {
                let username = identity.username.clone();
                if self.commit(ticket, SessionSnapshot::authenticated(credential, identity), Persist::Keep) {
                    tracing::info!(%username, "session restored");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "stored credential did not resolve; discarding");
                self.commit(ticket, SessionSnapshot::anonymous(), Persist::Clear);
            }
        }

        self.readiness()
    }

    /// Exchange a username and password for a credential and resolve it.
    ///
    /// On success the credential is persisted and the session becomes
    /// `Authenticated`. On any failure the prior state and persisted value
    /// are left exactly as they were.
    ///
    /// # Errors
    ///
    /// `Rejected` for any login or resolution failure; `Superseded` if a
    /// later operation committed while this one was in flight.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Identity, SessionError> {
        let ticket = self.issue();

        let credential = self.inner.api.login(username, password).await.map_err(|e| {
            tracing::warn!(%username, error = %e, "login failed");
            SessionError::Rejected
        })?;

        if self.is_superseded(ticket) {
            tracing::debug!(ticket = ticket.0, "login superseded before identity resolution");
            return Err(SessionError::Superseded);
        }

        let identity = self.inner.api.resolve_identity(&credential).await.map_err(|e| {
            tracing::warn!(%username, error = %e, "new credential did not resolve");
            SessionError::Rejected
        })?;

        let next = SessionSnapshot::authenticated(credential, identity.clone());
        if !self.commit(ticket, next, Persist::Save) {
            return Err(SessionError::Superseded);
        }

        tracing::info!(username = %identity.username, "session authenticated");
        Ok(identity)
    }

    /// Create an account, then log in with the same username and password.
    ///
    /// # Errors
    ///
    /// `RegistrationFailed` if either step fails; `Superseded` if the login
    /// step was overtaken by a later operation.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Identity, SessionError> {
        let registration = Registration {
            username: username.to_owned(),
            email: email.to_owned(),
            password: password.to_owned(),
            full_name: display_name.to_owned(),
        };

        self.inner.api.register(&registration).await.map_err(|e| {
            tracing::warn!(%username, error = %e, "registration failed");
            SessionError::RegistrationFailed
        })?;
        tracing::info!(%username, "account registered");

        match self.authenticate(username, password).await {
            Err(SessionError::Rejected) => Err(SessionError::RegistrationFailed),
            other => other,
        }
    }

    /// Drop the identity and credential and remove the persisted value.
    /// Safe to call from any state, any number of times.
    pub fn terminate(&self) {
        let mut tickets = self.lock_tickets();
        tickets.issued += 1;
        tickets.committed = tickets.issued;
        let was = self.inner.state.borrow().readiness.label();
        self.apply(SessionSnapshot::anonymous(), Persist::Clear);
        drop(tickets);
        tracing::info!(from = was, "session terminated");
    }

    // =========================================================================
    // TICKETS
    // =========================================================================

    fn lock_tickets(&self) -> MutexGuard<'_, Tickets> {
        self.inner.tickets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn issue(&self) -> Ticket {
        let mut tickets = self.lock_tickets();
        tickets.issued += 1;
        Ticket(tickets.issued)
    }

    fn is_superseded(&self, ticket: Ticket) -> bool {
        ticket.0 <= self.lock_tickets().committed
    }

    /// Publish `Pending` with the credential under resolution, unless a later
    /// operation has already committed.
    fn mark_pending(&self, ticket: Ticket, credential: Credential) {
        let tickets = self.lock_tickets();
        if ticket.0 <= tickets.committed {
            return;
        }
        self.inner.state.send_replace(SessionSnapshot { credential: Some(credential), readiness: Readiness::Pending });
    }

    /// Apply `next` if `ticket` has not been superseded. Returns whether it was applied.
    fn commit(&self, ticket: Ticket, next: SessionSnapshot, persist: Persist) -> bool {
        let mut tickets = self.lock_tickets();
        if ticket.0 <= tickets.committed {
            tracing::debug!(ticket = ticket.0, committed = tickets.committed, "discarding superseded result");
            return false;
        }
        tickets.committed = ticket.0;
        tracing::debug!(ticket = ticket.0, state = next.readiness.label(), "session commit");
        self.apply(next, persist);
        true
    }

    /// Caller must hold the ticket lock.
    fn apply(&self, next: SessionSnapshot, persist: Persist) {
        let stored = match (persist, next.credential.as_ref()) {
            (Persist::Save, Some(credential)) => self.inner.storage.save(credential),
            (Persist::Clear, _) => self.inner.storage.clear(),
            (Persist::Save, None) | (Persist::Keep, _) => Ok(()),
        };
        if let Err(e) = stored {
            tracing::warn!(error = %e, ?persist, "credential storage update failed");
        }

        self.inner.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
