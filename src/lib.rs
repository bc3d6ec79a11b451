//! Client session and route guard for the vulnerability-scan service.
//!
//! ARCHITECTURE
//! ============
//! `SessionStore` owns the bearer credential and the resolved identity and
//! publishes both as one snapshot. `RouteGuard` reads that snapshot to gate
//! protected destinations. The remote auth endpoints sit behind
//! `IdentityApi`, and credential persistence behind `CredentialStore`, so
//! either can be swapped without touching session logic.

pub mod api;
pub mod config;
pub mod guard;
pub mod session;
pub mod storage;
pub mod types;

pub use api::{ApiError, AuthorizedClient, HttpIdentityApi, IdentityApi, Registration};
pub use config::SessionConfig;
pub use guard::{Access, Navigator, RouteGuard, Verdict};
pub use session::{SessionError, SessionStore};
pub use storage::{CredentialStore, FileCredentialStore, MemoryCredentialStore, StorageError};
pub use types::{Credential, Identity, Readiness, SessionSnapshot};
