//! Client for the hosted auth API (`/auth/v1`).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{AuthClient, AuthError, AuthEvent, AuthEventKind, StorageLock, cancellable, claims};
use crate::models::auth::{AuthUser, Session};
use crate::storage::SessionStorage;

/// Sessions expiring within this window are refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 60;

const EVENT_CAPACITY: usize = 16;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self, now: i64) -> Session {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| now + secs));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Auth client backed by the hosted auth API and a [`SessionStorage`].
pub struct GoTrueClient {
    http: Client,
    auth_url: String,
    anon_key: String,
    storage: Arc<dyn SessionStorage>,
    storage_key: String,
    lock: StorageLock,
    events: broadcast::Sender<AuthEvent>,
    announced: AtomicBool,
}

impl GoTrueClient {
    pub fn new(
        http: Client,
        backend_url: &str,
        anon_key: impl Into<String>,
        storage: Arc<dyn SessionStorage>,
        storage_key: impl Into<String>,
        lock_wait: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            http,
            auth_url: format!("{}/auth/v1", backend_url.trim_end_matches('/')),
            anon_key: anon_key.into(),
            storage,
            storage_key: storage_key.into(),
            lock: StorageLock::new(lock_wait),
            events,
            announced: AtomicBool::new(false),
        }
    }

    fn emit(&self, kind: AuthEventKind, session: Option<Session>) {
        if self.events.send(AuthEvent { kind, session }).is_err() {
            debug!(?kind, "auth event dropped, no subscribers");
        }
    }

    fn load(&self) -> Result<Option<Session>, AuthError> {
        let Some(raw) = self.storage.get(&self.storage_key)? else {
            return Ok(None);
        };
        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Ok(Some(session)),
            // another process may be mid-write; leave the blob for it
            Err(e) => {
                warn!(key = %self.storage_key, error = %e, "ignoring unreadable session blob");
                Ok(None)
            }
        }
    }

    fn persist(&self, session: &Session) -> Result<(), AuthError> {
        let blob = serde_json::to_string(session)?;
        self.storage.set(&self.storage_key, &blob)?;
        Ok(())
    }

    async fn check(resp: Response) -> Result<Response, AuthError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                ["error_description", "msg", "message", "error"]
                    .iter()
                    .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
            })
            .unwrap_or_else(|| {
                if body.is_empty() {
                    status.to_string()
                } else {
                    body
                }
            });
        Err(AuthError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn token_grant(&self, grant_type: &str, body: Value) -> Result<Session, AuthError> {
        let resp = self
            .http
            .post(format!("{}/token", self.auth_url))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;
        let token: TokenResponse = Self::check(resp).await?.json().await?;
        Ok(token.into_session(chrono::Utc::now().timestamp()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        debug!("refreshing access token");
        self.token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn fetch_user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        let resp = self
            .http
            .get(format!("{}/user", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }
}

#[async_trait]
impl AuthClient for GoTrueClient {
    async fn get_session(&self, cancel: &CancellationToken) -> Result<Option<Session>, AuthError> {
        let _guard = self.lock.acquire(cancel).await?;
        let Some(session) = self.load()? else {
            return Ok(None);
        };

        let now = chrono::Utc::now().timestamp();
        let session = if session.expires_within(now, REFRESH_MARGIN_SECS)
            && !session.refresh_token.is_empty()
        {
            let refreshed = cancellable(cancel, self.refresh(&session.refresh_token)).await?;
            self.persist(&refreshed)?;
            self.emit(AuthEventKind::TokenRefreshed, Some(refreshed.clone()));
            refreshed
        } else {
            session
        };

        if !self.announced.swap(true, Ordering::SeqCst) {
            self.emit(AuthEventKind::InitialSession, Some(session.clone()));
        }
        Ok(Some(session))
    }

    async fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
        cancel: &CancellationToken,
    ) -> Result<Session, AuthError> {
        if access_token.is_empty() {
            return Err(AuthError::InvalidSession("empty access token".into()));
        }
        let claims = claims::peek(access_token)?;
        let now = chrono::Utc::now().timestamp();
        let expired = claims.exp.is_some_and(|exp| exp <= now);

        let _guard = self.lock.acquire(cancel).await?;
        let session = if expired {
            if refresh_token.is_empty() {
                return Err(AuthError::InvalidSession(
                    "access token expired and no refresh token given".into(),
                ));
            }
            cancellable(cancel, self.refresh(refresh_token)).await?
        } else {
            let user = cancellable(cancel, self.fetch_user(access_token)).await?;
            Session {
                access_token: access_token.to_string(),
                refresh_token: refresh_token.to_string(),
                expires_at: claims.exp,
                user,
            }
        };
        self.persist(&session)?;
        info!(user_id = %session.user.id, "session established from tokens");
        self.emit(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let session = self
            .token_grant("password", json!({ "email": email, "password": password }))
            .await?;
        let cancel = CancellationToken::new();
        let _guard = self.lock.acquire(&cancel).await?;
        self.persist(&session)?;
        info!(user_id = %session.user.id, "signed in");
        self.emit(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, cancel: &CancellationToken) -> Result<(), AuthError> {
        let _guard = self.lock.acquire(cancel).await?;
        if let Some(session) = self.load()? {
            let revoke = async {
                let resp = self
                    .http
                    .post(format!("{}/logout", self.auth_url))
                    .header("apikey", &self.anon_key)
                    .bearer_auth(&session.access_token)
                    .send()
                    .await?;
                Self::check(resp).await.map(|_| ())
            };
            match cancellable(cancel, revoke).await {
                Ok(()) => {}
                Err(AuthError::Aborted) => return Err(AuthError::Aborted),
                Err(e) => warn!(error = %e, "remote sign-out failed, clearing local session"),
            }
        }
        self.storage.remove(&self.storage_key)?;
        self.emit(AuthEventKind::SignedOut, None);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStorage, MemoryStorage};

    fn client(storage: Arc<dyn SessionStorage>) -> GoTrueClient {
        GoTrueClient::new(
            Client::new(),
            "http://127.0.0.1:9/",
            "anon",
            storage,
            "sb-test-auth-token",
            Duration::from_millis(100),
        )
    }

    #[test]
    fn token_response_derives_expiry() {
        let token: TokenResponse = serde_json::from_value(json!({
            "access_token": "at",
            "refresh_token": "rt",
            "expires_in": 3600,
            "user": { "id": "u1" }
        }))
        .unwrap();
        let session = token.into_session(1_000);
        assert_eq!(session.expires_at, Some(4_600));
    }

    #[tokio::test]
    async fn empty_storage_has_no_session() {
        let auth = client(Arc::new(MemoryStorage::new()));
        let cancel = CancellationToken::new();
        assert!(auth.get_session(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fresh_stored_session_is_returned_and_announced() {
        let storage = Arc::new(MemoryStorage::new());
        let session = Session {
            access_token: "at".into(),
            refresh_token: "rt".into(),
            expires_at: Some(chrono::Utc::now().timestamp() + 3_600),
            user: AuthUser {
                id: "u1".into(),
                email: None,
            },
        };
        storage
            .set("sb-test-auth-token", &serde_json::to_string(&session).unwrap())
            .unwrap();
        let auth = client(storage);
        let mut events = auth.subscribe();

        let cancel = CancellationToken::new();
        let got = auth.get_session(&cancel).await.unwrap().unwrap();
        assert_eq!(got, session);
        let event = events.try_recv().unwrap();
        assert_eq!(event.kind, AuthEventKind::InitialSession);

        auth.get_session(&cancel).await.unwrap();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn unreadable_blob_is_left_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
        let truncated = r#"{"access_token":"at","refresh_tok"#;
        storage.set("sb-test-auth-token", truncated).unwrap();
        let auth = client(storage.clone());
        let cancel = CancellationToken::new();
        assert!(auth.get_session(&cancel).await.unwrap().is_none());
        assert_eq!(
            storage.get("sb-test-auth-token").unwrap().as_deref(),
            Some(truncated)
        );
    }

    #[tokio::test]
    async fn sign_out_without_session_clears_and_emits() {
        let storage = Arc::new(MemoryStorage::new());
        let auth = client(storage);
        let mut events = auth.subscribe();
        auth.sign_out(&CancellationToken::new()).await.unwrap();
        assert_eq!(events.try_recv().unwrap().kind, AuthEventKind::SignedOut);
    }

    #[tokio::test]
    async fn set_session_rejects_empty_token() {
        let auth = client(Arc::new(MemoryStorage::new()));
        let err = auth
            .set_session("", "rt", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidSession(_)));
    }
}
