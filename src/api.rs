//! HTTP boundary to the scan service's auth endpoints.
//!
//! ARCHITECTURE
//! ============
//! `IdentityApi` is the seam the session store talks through: resolve a
//! credential to an identity, exchange a username/password for a credential,
//! register an account. `HttpIdentityApi` is the reqwest implementation;
//! tests substitute their own.
//!
//! `AuthorizedClient` is for everything downstream of the session: it reads
//! the current credential from the store and attaches it as a bearer header.
//!
//! ERROR HANDLING
//! ==============
//! Every failure maps onto `ApiError`. Callers inside the session collapse
//! these to a single opaque outcome; the detail is only for logs.

use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::session::SessionStore;
use crate::types::{Credential, Identity};

pub const IDENTITY_PATH: &str = "/api/me";
pub const LOGIN_PATH: &str = "/api/login";
pub const REGISTER_PATH: &str = "/api/register";

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response (connect, timeout, TLS).
    #[error("request failed: {0}")]
    Request(String),

    /// The service answered with a non-success status.
    #[error("service returned status {status}")]
    Status { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("response parse failed: {0}")]
    Parse(String),

    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// A bearer call was attempted with no credential held.
    #[error("not authenticated")]
    NotAuthenticated,
}

impl ApiError {
    /// True when the service itself said no (as opposed to being unreachable).
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Status { status: 400..=499, .. })
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

/// Body for `POST /api/register`.
#[derive(Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("full_name", &self.full_name)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct LoginForm<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

// =============================================================================
// IDENTITY API
// =============================================================================

#[async_trait::async_trait]
pub trait IdentityApi: Send + Sync {
    /// `GET /api/me` with the credential as bearer.
    async fn resolve_identity(&self, credential: &Credential) -> Result<Identity, ApiError>;

    /// `POST /api/login` with a form-encoded username and password.
    async fn login(&self, username: &str, password: &str) -> Result<Credential, ApiError>;

    /// `POST /api/register`. The response body is ignored.
    async fn register(&self, registration: &Registration) -> Result<(), ApiError>;
}

/// reqwest-backed implementation of [`IdentityApi`].
#[derive(Debug, Clone)]
pub struct HttpIdentityApi {
    http: reqwest::Client,
    config: SessionConfig,
}

impl HttpIdentityApi {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: SessionConfig) -> Result<Self, ApiError> {
        let http = build_http_client(&config)?;
        Ok(Self { http, config })
    }

    #[must_use]
    pub fn with_client(http: reqwest::Client, config: SessionConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait::async_trait]
impl IdentityApi for HttpIdentityApi {
    async fn resolve_identity(&self, credential: &Credential) -> Result<Identity, ApiError> {
        let resp = self
            .http
            .get(self.config.endpoint(IDENTITY_PATH))
            .header(AUTHORIZATION, credential.bearer())
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;
        let resp = ensure_success(resp).await?;
        resp.json::<Identity>()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    async fn login(&self, username: &str, password: &str) -> Result<Credential, ApiError> {
        let resp = self
            .http
            .post(self.config.endpoint(LOGIN_PATH))
            .form(&LoginForm { username, password })
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;
        let resp = ensure_success(resp).await?;
        let body: TokenResponse = resp.json().await.map_err(|e| ApiError::Parse(e.to_string()))?;
        if body.access_token.is_empty() {
            return Err(ApiError::Parse("empty access_token".into()));
        }
        Ok(Credential::new(body.access_token))
    }

    async fn register(&self, registration: &Registration) -> Result<(), ApiError> {
        let resp = self
            .http
            .post(self.config.endpoint(REGISTER_PATH))
            .json(registration)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;
        ensure_success(resp).await?;
        Ok(())
    }
}

fn build_http_client(config: &SessionConfig) -> Result<reqwest::Client, ApiError> {
    reqwest::Client::builder()
        .timeout(config.timeouts.request())
        .connect_timeout(config.timeouts.connect())
        .build()
        .map_err(|e| ApiError::HttpClientBuild(e.to_string()))
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::Status { status, body })
}

// =============================================================================
// AUTHORIZED CLIENT
// =============================================================================

/// Issues API calls on behalf of the current session.
#[derive(Clone)]
pub struct AuthorizedClient {
    http: reqwest::Client,
    config: SessionConfig,
    session: SessionStore,
}

impl AuthorizedClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: SessionConfig, session: SessionStore) -> Result<Self, ApiError> {
        let http = build_http_client(&config)?;
        Ok(Self { http, config, session })
    }

    /// `GET path` with the session's bearer credential, decoding a JSON body.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` when the session holds no credential; otherwise
    /// the transport, status, or parse failure.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let credential = self.session.credential().ok_or(ApiError::NotAuthenticated)?;
        let resp = self
            .http
            .get(self.config.endpoint(path))
            .header(AUTHORIZATION, credential.bearer())
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;
        let resp = ensure_success(resp).await?;
        resp.json::<T>().await.map_err(|e| ApiError::Parse(e.to_string()))
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
