//! Session types — credential, identity, readiness, and the published snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// CREDENTIAL
// =============================================================================

/// Opaque bearer token issued by the login endpoint.
///
/// `Debug` is redacted so a credential never ends up in log output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

// =============================================================================
// IDENTITY
// =============================================================================

/// Profile of the current user as returned by `GET /api/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable identifier, also shown as the display name.
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

impl Identity {
    /// Human-readable name: the full name when set, otherwise the username.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self.full_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => &self.username,
        }
    }
}

// =============================================================================
// READINESS
// =============================================================================

/// Lifecycle of the session. Exactly one variant holds at any instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Resolution in flight or not yet attempted.
    Pending,
    /// Credential resolved to an identity.
    Authenticated(Identity),
    /// No credential, or the credential failed to resolve.
    Anonymous,
}

impl Readiness {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            Self::Pending | Self::Anonymous => None,
        }
    }

    /// Short label used in log fields.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authenticated(_) => "authenticated",
            Self::Anonymous => "anonymous",
        }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// The credential/readiness pair, always published as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub credential: Option<Credential>,
    pub readiness: Readiness,
}

impl SessionSnapshot {
    /// Initial state before bootstrap has run.
    #[must_use]
    pub fn pending() -> Self {
        Self { credential: None, readiness: Readiness::Pending }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self { credential: None, readiness: Readiness::Anonymous }
    }

    #[must_use]
    pub fn authenticated(credential: Credential, identity: Identity) -> Self {
        Self { credential: Some(credential), readiness: Readiness::Authenticated(identity) }
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.readiness.identity()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.identity().is_some()
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self::pending()
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
