//! Authentication client.
//!
//! [`AuthClient`] is the seam between the session store and the hosted auth
//! API. [`GoTrueClient`] talks to the real endpoints; every storage access it
//! makes goes through a [`StorageLock`] that may stall, which is what the
//! session store's fallback logic is built around.

pub mod claims;
mod gotrue;
mod lock;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::models::auth::Session;
use crate::storage::StorageError;

pub use gotrue::GoTrueClient;
pub use lock::StorageLock;

/// Errors raised by the auth client.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Timed out after {0:?} waiting for the auth storage lock")]
    LockTimeout(Duration),

    #[error("Auth operation aborted")]
    Aborted,

    #[error("Auth request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Auth API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Invalid auth payload: {0}")]
    Serde(#[from] serde_json::Error),
}

impl AuthError {
    /// Lock contention, aborts and timeouts; these are retried and may be
    /// recovered from the persisted token.
    pub fn is_lock_related(&self) -> bool {
        matches!(self, AuthError::LockTimeout(_) | AuthError::Aborted)
    }
}

/// Kind of auth state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// Auth state change broadcast to subscribers.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

/// Auth API as consumed by the session store.
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Current session, refreshing it if it is about to expire.
    async fn get_session(&self, cancel: &CancellationToken) -> Result<Option<Session>, AuthError>;

    /// Establish a session from an access/refresh token pair.
    async fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
        cancel: &CancellationToken,
    ) -> Result<Session, AuthError>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    /// Revoke the session and clear it from storage.
    async fn sign_out(&self, cancel: &CancellationToken) -> Result<(), AuthError>;

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Run `fut` until it completes or `cancel` fires; a cancelled future is
/// dropped and its result discarded.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, AuthError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AuthError::Aborted),
        result = fut => result,
    }
}
