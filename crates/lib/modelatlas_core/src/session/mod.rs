//! Session store.
//!
//! Resolves who the user is as quickly as possible and exposes the result to
//! every other component. The auth client's storage lock can stall a session
//! lookup for many seconds, so lookups are raced against a short deadline and
//! a stalled lookup falls back to reading the persisted token directly. In
//! that case every later call goes through a raw transport pinned to the
//! recovered token until the auth client reports a real session again.

mod handoff;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::auth::{AuthClient, AuthError, AuthEvent, AuthEventKind};
use crate::config::AtlasConfig;
use crate::error::{AppError, AppResult, Redirect};
use crate::models::auth::{AuthUser, LoadingState, Session, SessionSnapshot};
use crate::models::catalog::{LIKES_TABLE, ROLES_TABLE};
use crate::storage::{self, SessionStorage};
use crate::transport::{Query, Returning, Transport, TransportMode};

pub use handoff::Handoff;

/// Builds a transport pinned to a recovered access token.
pub type RawTransportFactory = Arc<dyn Fn(String) -> Arc<dyn Transport> + Send + Sync>;

/// Collaborators of a [`SessionStore`].
pub struct SessionStoreParts {
    pub config: AtlasConfig,
    pub auth: Arc<dyn AuthClient>,
    /// Persistent storage holding the shared token blob.
    pub storage: Arc<dyn SessionStorage>,
    pub token_key: String,
    pub primary: Arc<dyn Transport>,
    pub raw_factory: RawTransportFactory,
}

/// Result of [`SessionStore::init`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitOutcome {
    /// Page URL without handoff tokens, when a handoff was adopted.
    pub scrubbed_url: Option<String>,
}

struct State {
    session: Option<Session>,
    is_admin: bool,
    likes: HashSet<String>,
    mode: TransportMode,
    raw: Option<Arc<dyn Transport>>,
}

/// Owner of the current identity, token, admin flag and liked set.
pub struct SessionStore {
    config: AtlasConfig,
    auth: Arc<dyn AuthClient>,
    storage: Arc<dyn SessionStorage>,
    token_key: String,
    primary: Arc<dyn Transport>,
    raw_factory: RawTransportFactory,
    state: RwLock<State>,
    ready: watch::Sender<LoadingState>,
    user: watch::Sender<Option<String>>,
    like_gates: DashMap<String, Arc<Mutex<()>>>,
}

/// Race `fut` against `limit`; on expiry the future is dropped and `cancel`
/// is fired.
async fn with_deadline<T, F>(limit: Duration, cancel: CancellationToken, fut: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, AuthError>>,
{
    tokio::select! {
        result = fut => result,
        _ = tokio::time::sleep(limit) => {
            cancel.cancel();
            Err(AuthError::LockTimeout(limit))
        }
    }
}

impl SessionStore {
    pub fn new(parts: SessionStoreParts) -> Self {
        let (ready, _) = watch::channel(LoadingState::Loading);
        let (user, _) = watch::channel(None);
        Self {
            config: parts.config,
            auth: parts.auth,
            storage: parts.storage,
            token_key: parts.token_key,
            primary: parts.primary,
            raw_factory: parts.raw_factory,
            state: RwLock::new(State {
                session: None,
                is_admin: false,
                likes: HashSet::new(),
                mode: TransportMode::Primary,
                raw: None,
            }),
            ready,
            user,
            like_gates: DashMap::new(),
        }
    }

    /// Resolve the session, derive admin status and likes, then signal
    /// readiness. Never fails: an unresolved session leaves the store signed
    /// out.
    pub async fn init(&self, handoff: Option<&Handoff>) -> InitOutcome {
        let mut outcome = InitOutcome::default();

        if let Some(handoff) = handoff {
            info!("adopting session from handoff tokens");
            let cancel = CancellationToken::new();
            match self
                .auth
                .set_session(&handoff.access_token, &handoff.refresh_token, &cancel)
                .await
            {
                Ok(session) => {
                    info!(user_id = %session.user.id, "session restored via handoff");
                    self.adopt(Some(session), None).await;
                    outcome.scrubbed_url = Some(handoff.scrubbed_url());
                }
                Err(e) => warn!(error = %e, "token handoff failed"),
            }
        }

        if self.user_id().await.is_none() {
            self.resolve().await;
        }

        self.refresh_derived().await;
        self.ready.send_replace(LoadingState::Ready);
        let user_id = self.user_id().await;
        let mode = self.mode().await;
        info!(user_id = user_id.as_deref().unwrap_or("-"), ?mode, "session store ready");
        outcome
    }

    async fn resolve(&self) {
        let attempts = self.config.session_attempts.max(1);
        for attempt in 1..=attempts {
            let started = Instant::now();
            let cancel = CancellationToken::new();
            let result = with_deadline(
                self.config.session_timeout,
                cancel.clone(),
                self.auth.get_session(&cancel),
            )
            .await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(session) => {
                    debug!(attempt, elapsed_ms, found = session.is_some(), "session lookup finished");
                    self.adopt(session, None).await;
                    return;
                }
                Err(e) if e.is_lock_related() => {
                    warn!(attempt, elapsed_ms, error = %e, "session lookup stalled on storage lock");
                    if self.recover_from_storage().await {
                        return;
                    }
                    if attempt < attempts {
                        tokio::time::sleep(self.config.lock_retry_delay).await;
                    }
                }
                Err(e) => {
                    error!(attempt, error = %e, "session lookup failed");
                    self.adopt(None, None).await;
                    return;
                }
            }
        }
        warn!(attempts, "session unresolved, continuing signed out");
    }

    /// Read the persisted token blob directly and switch to the raw
    /// transport. Returns whether a session was recovered.
    async fn recover_from_storage(&self) -> bool {
        let Some(session) = storage::read_session(self.storage.as_ref(), &self.token_key) else {
            debug!(key = %self.token_key, "no persisted session to recover");
            return false;
        };
        info!(user_id = %session.user.id, "recovered persisted session, switching to raw transport");
        let raw = (self.raw_factory)(session.access_token.clone());
        self.adopt(Some(session), Some(raw)).await;
        true
    }

    /// Replace the session. `raw` selects the raw transport; `None` returns
    /// to the primary one.
    async fn adopt(&self, session: Option<Session>, raw: Option<Arc<dyn Transport>>) {
        let user_id = session.as_ref().map(|s| s.user.id.clone());
        {
            let mut state = self.state.write().await;
            state.session = session;
            state.mode = if raw.is_some() {
                TransportMode::Raw
            } else {
                TransportMode::Primary
            };
            state.raw = raw;
        }
        self.user.send_if_modified(|current| {
            if *current == user_id {
                false
            } else {
                *current = user_id;
                true
            }
        });
    }

    /// Re-derive admin status and the liked set. Failures keep prior state.
    pub async fn refresh_derived(&self) {
        self.update_admin_status().await;
        self.fetch_likes().await;
    }

    async fn update_admin_status(&self) {
        let Some(user_id) = self.user_id().await else {
            self.state.write().await.is_admin = false;
            return;
        };
        let query = Query::new().select("role").eq("id", &user_id);
        match self.transport().await.select_one(ROLES_TABLE, &query).await {
            Ok(row) => {
                let is_admin = row
                    .as_ref()
                    .and_then(|r| r.get("role"))
                    .and_then(Value::as_str)
                    == Some("admin");
                self.state.write().await.is_admin = is_admin;
            }
            Err(e) => warn!(%user_id, error = %e, "failed to update admin status, keeping previous"),
        }
    }

    async fn fetch_likes(&self) {
        let Some(user_id) = self.user_id().await else {
            self.state.write().await.likes.clear();
            return;
        };
        let query = Query::new().select("model_id").eq("user_id", &user_id);
        match self.transport().await.select(LIKES_TABLE, &query).await {
            Ok(rows) => {
                let likes: HashSet<String> = rows
                    .iter()
                    .filter_map(|r| match r.get("model_id")? {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect();
                debug!(%user_id, count = likes.len(), "fetched likes");
                self.state.write().await.likes = likes;
            }
            Err(e) => warn!(%user_id, error = %e, "failed to fetch likes, keeping previous"),
        }
    }

    /// Apply an auth state change.
    ///
    /// A null session is ignored while the persisted token still exists and
    /// the event is a sign-out or initial-session report; those are emitted
    /// spuriously by a lock-stalled auth client.
    pub async fn handle_auth_event(&self, event: AuthEvent) {
        debug!(
            kind = ?event.kind,
            user_id = event.session.as_ref().map(|s| s.user.id.as_str()).unwrap_or("-"),
            "auth state change"
        );
        match event.session {
            Some(session) => self.adopt(Some(session), None).await,
            None => {
                let spurious_kind =
                    matches!(event.kind, AuthEventKind::SignedOut | AuthEventKind::InitialSession);
                if spurious_kind && storage::has_token(self.storage.as_ref(), &self.token_key) {
                    warn!(kind = ?event.kind, "ignoring null session while a token is persisted");
                    return;
                }
                self.adopt(None, None).await;
                if event.kind == AuthEventKind::SignedOut {
                    info!("signed out");
                }
            }
        }
        self.refresh_derived().await;
    }

    /// Forward auth client events to [`Self::handle_auth_event`].
    pub fn spawn_auth_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.auth.subscribe();
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => store.handle_auth_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "auth listener lagged, events dropped")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Like or unlike a model; returns whether it is now liked.
    ///
    /// The local set is updated first and reverted if the backend call
    /// fails. Toggles of the same model are serialized.
    pub async fn toggle_like(&self, model_id: &str) -> AppResult<bool> {
        let user_id = self.user_id().await.ok_or(AppError::NotAuthenticated)?;
        let gate = Arc::clone(&self.like_gates.entry(model_id.to_string()).or_default());
        let _turn = gate.lock().await;

        let was_liked = {
            let mut state = self.state.write().await;
            let was_liked = state.likes.contains(model_id);
            if was_liked {
                state.likes.remove(model_id);
            } else {
                state.likes.insert(model_id.to_string());
            }
            was_liked
        };

        let transport = self.transport().await;
        let result = if was_liked {
            let query = Query::new().eq("user_id", &user_id).eq("model_id", model_id);
            transport.delete(LIKES_TABLE, &query).await
        } else {
            transport
                .insert(
                    LIKES_TABLE,
                    json!({ "user_id": user_id, "model_id": model_id }),
                    Returning::Minimal,
                )
                .await
                .map(|_| ())
        };

        match result {
            Ok(()) => Ok(!was_liked),
            Err(e) => {
                let mut state = self.state.write().await;
                if was_liked {
                    state.likes.insert(model_id.to_string());
                } else {
                    state.likes.remove(model_id);
                }
                error!(%model_id, error = %e, "like toggle failed, reverted");
                Err(e.into())
            }
        }
    }

    /// Sign in with email and password.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<AuthUser> {
        let session = self.auth.sign_in_with_password(email, password).await?;
        let user = session.user.clone();
        self.adopt(Some(session), None).await;
        self.refresh_derived().await;
        Ok(user)
    }

    /// Sign out. The remote call is bounded by the sign-out timeout; local
    /// state and the persisted token are cleared regardless of its outcome.
    pub async fn logout(&self) -> Redirect {
        let cancel = CancellationToken::new();
        let result = with_deadline(
            self.config.signout_timeout,
            cancel.clone(),
            self.auth.sign_out(&cancel),
        )
        .await;
        if let Err(e) = result {
            warn!(error = %e, "sign-out failed or timed out, forcing local logout");
        }
        if let Err(e) = self.storage.remove(&self.token_key) {
            warn!(error = %e, "failed to clear persisted token");
        }
        self.adopt(None, None).await;
        {
            let mut state = self.state.write().await;
            state.is_admin = false;
            state.likes.clear();
        }
        Redirect::Home
    }

    /// Wait until [`Self::init`] has finished.
    pub async fn wait_ready(&self) {
        let mut ready = self.ready.subscribe();
        // The sender lives as long as the store.
        let _ = ready.wait_for(|s| *s == LoadingState::Ready).await;
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow() == LoadingState::Ready
    }

    /// Watch the current user id.
    pub fn subscribe_user(&self) -> watch::Receiver<Option<String>> {
        self.user.subscribe()
    }

    /// Transport for the current mode.
    pub async fn transport(&self) -> Arc<dyn Transport> {
        let state = self.state.read().await;
        match (&state.mode, &state.raw) {
            (TransportMode::Raw, Some(raw)) => Arc::clone(raw),
            _ => Arc::clone(&self.primary),
        }
    }

    pub async fn mode(&self) -> TransportMode {
        self.state.read().await.mode
    }

    pub async fn user(&self) -> Option<AuthUser> {
        self.state.read().await.session.as_ref().map(|s| s.user.clone())
    }

    pub async fn user_id(&self) -> Option<String> {
        self.state
            .read()
            .await
            .session
            .as_ref()
            .map(|s| s.user.id.clone())
    }

    pub async fn is_admin(&self) -> bool {
        self.state.read().await.is_admin
    }

    pub async fn is_liked(&self, model_id: &str) -> bool {
        self.state.read().await.likes.contains(model_id)
    }

    pub async fn likes(&self) -> HashSet<String> {
        self.state.read().await.likes.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().await;
        SessionSnapshot {
            user_id: state.session.as_ref().map(|s| s.user.id.clone()),
            email: state.session.as_ref().and_then(|s| s.user.email.clone()),
            access_token: state.session.as_ref().map(|s| s.access_token.clone()),
            refresh_token: state.session.as_ref().map(|s| s.refresh_token.clone()),
            is_admin: state.is_admin,
            loading_state: *self.ready.borrow(),
            mode: state.mode,
            liked_count: state.likes.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::{
        FakeAuth, FakeTransport, SessionScript, TOKEN_KEY, harness, harness_with, persist_token,
        ready_harness, session_for,
    };

    fn roles(user_id: &str, role: &str) -> Vec<Value> {
        vec![json!({ "id": user_id, "role": role })]
    }

    #[tokio::test]
    async fn resolves_session_and_derived_state() {
        let primary = FakeTransport::new(TransportMode::Primary)
            .with_rows(ROLES_TABLE, roles("u1", "admin"))
            .with_rows(
                LIKES_TABLE,
                vec![
                    json!({ "user_id": "u1", "model_id": 7 }),
                    json!({ "user_id": "u2", "model_id": 8 }),
                ],
            );
        let h = ready_harness(Some("u1"), primary).await;

        let snap = h.store.snapshot().await;
        assert_eq!(snap.user_id.as_deref(), Some("u1"));
        assert_eq!(snap.loading_state, LoadingState::Ready);
        assert_eq!(snap.mode, TransportMode::Primary);
        assert!(snap.is_admin);
        assert_eq!(h.store.likes().await, HashSet::from(["7".to_string()]));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_lookup_recovers_token_and_switches_to_raw() {
        let raw = FakeTransport::new(TransportMode::Raw).with_rows(ROLES_TABLE, roles("u1", "admin"));
        let h = harness_with(
            FakeAuth::new(vec![SessionScript::Hang, SessionScript::Hang]),
            FakeTransport::new(TransportMode::Primary),
            raw,
        );
        persist_token(h.storage.as_ref(), &session_for("u1", None));

        let started = tokio::time::Instant::now();
        h.store.init(None).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(h.store.is_ready());
        assert_eq!(h.store.user_id().await.as_deref(), Some("u1"));
        assert_eq!(h.store.mode().await, TransportMode::Raw);
        assert_eq!(h.store.transport().await.mode(), TransportMode::Raw);
        // derived state came through the raw transport
        assert!(h.store.is_admin().await);
        assert!(h.primary.calls().is_empty());
        assert!(!h.raw.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_lookup_without_token_becomes_ready_signed_out() {
        let h = harness(FakeAuth::new(vec![SessionScript::Hang, SessionScript::Hang]));
        let started = tokio::time::Instant::now();
        h.store.init(None).await;
        // two 2s attempts plus one 500ms pause
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(4_500) && elapsed < Duration::from_millis(4_600));
        assert!(h.store.is_ready());
        assert_eq!(h.store.user_id().await, None);
        assert_eq!(h.store.mode().await, TransportMode::Primary);
    }

    #[tokio::test(start_paused = true)]
    async fn lock_error_is_retried() {
        let h = harness(
            FakeAuth::new(vec![SessionScript::LockError])
                .with_fallback(Some(session_for("u2", None))),
        );
        h.store.init(None).await;
        assert_eq!(h.store.user_id().await.as_deref(), Some("u2"));
        assert_eq!(h.store.mode().await, TransportMode::Primary);
    }

    #[tokio::test]
    async fn fatal_error_is_not_retried() {
        let h = harness(
            FakeAuth::new(vec![SessionScript::Fatal])
                .with_fallback(Some(session_for("u3", None))),
        );
        persist_token(h.storage.as_ref(), &session_for("u3", None));
        h.store.init(None).await;
        assert!(h.store.is_ready());
        assert_eq!(h.store.user_id().await, None);
    }

    #[tokio::test]
    async fn handoff_is_adopted_and_url_scrubbed() {
        let session = session_for("u9", None);
        let h = harness(FakeAuth::new(vec![]).accept_handoff(session.clone()));
        let handoff = Handoff::from_url(&format!(
            "https://atlas.example/details.html?id=5&at={}&rt=r",
            session.access_token
        ))
        .unwrap()
        .unwrap();

        let outcome = h.store.init(Some(&handoff)).await;
        assert_eq!(
            outcome.scrubbed_url.as_deref(),
            Some("https://atlas.example/details.html?id=5")
        );
        assert_eq!(h.store.user_id().await.as_deref(), Some("u9"));
    }

    #[tokio::test]
    async fn failed_handoff_falls_back_to_lookup() {
        let h = harness(FakeAuth::new(vec![SessionScript::Found(Some(session_for("u1", None)))]));
        let handoff = Handoff::from_url("https://atlas.example/?at=bogus").unwrap().unwrap();
        let outcome = h.store.init(Some(&handoff)).await;
        assert_eq!(outcome.scrubbed_url, None);
        assert_eq!(h.store.user_id().await.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn spurious_sign_out_is_ignored_while_token_persisted() {
        let h = ready_harness(Some("u1"), FakeTransport::new(TransportMode::Primary)).await;
        persist_token(h.storage.as_ref(), &session_for("u1", None));

        h.store
            .handle_auth_event(AuthEvent {
                kind: AuthEventKind::SignedOut,
                session: None,
            })
            .await;
        assert_eq!(h.store.user_id().await.as_deref(), Some("u1"));

        h.storage.remove(TOKEN_KEY).unwrap();
        h.store
            .handle_auth_event(AuthEvent {
                kind: AuthEventKind::SignedOut,
                session: None,
            })
            .await;
        assert_eq!(h.store.user_id().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn real_session_event_restores_primary_mode() {
        let h = harness(FakeAuth::new(vec![SessionScript::Hang, SessionScript::Hang]));
        persist_token(h.storage.as_ref(), &session_for("u1", None));
        h.store.init(None).await;
        assert_eq!(h.store.mode().await, TransportMode::Raw);

        h.store
            .handle_auth_event(AuthEvent {
                kind: AuthEventKind::TokenRefreshed,
                session: Some(session_for("u1", None)),
            })
            .await;
        assert_eq!(h.store.mode().await, TransportMode::Primary);
    }

    #[tokio::test]
    async fn listener_forwards_events() {
        let h = ready_harness(None, FakeTransport::new(TransportMode::Primary)).await;
        let mut users = h.store.subscribe_user();
        let listener = h.store.spawn_auth_listener();

        h.auth
            .emit(AuthEventKind::SignedIn, Some(session_for("u5", None)));
        users.changed().await.unwrap();
        assert_eq!(users.borrow().as_deref(), Some("u5"));
        listener.abort();
    }

    #[tokio::test]
    async fn toggle_like_applies_and_reverts() {
        let h = ready_harness(Some("u1"), FakeTransport::new(TransportMode::Primary)).await;

        assert!(h.store.toggle_like("m1").await.unwrap());
        assert!(h.store.is_liked("m1").await);
        assert_eq!(h.primary.rows(LIKES_TABLE).len(), 1);

        h.primary.fail(LIKES_TABLE);
        let err = h.store.toggle_like("m1").await.unwrap_err();
        assert!(matches!(err, AppError::Transport(_)));
        assert!(h.store.is_liked("m1").await, "failed unlike must be reverted");

        h.primary.recover(LIKES_TABLE);
        assert!(!h.store.toggle_like("m1").await.unwrap());
        assert!(!h.store.is_liked("m1").await);
        assert!(h.primary.rows(LIKES_TABLE).is_empty());
    }

    #[tokio::test]
    async fn toggle_like_requires_user() {
        let h = ready_harness(None, FakeTransport::new(TransportMode::Primary)).await;
        assert!(matches!(
            h.store.toggle_like("m1").await,
            Err(AppError::NotAuthenticated)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_toggles_of_one_model_stay_consistent() {
        let primary = FakeTransport::new(TransportMode::Primary);
        primary.set_delay(Duration::from_millis(5));
        let h = ready_harness(Some("u1"), primary).await;

        let a = h.store.clone();
        let b = h.store.clone();
        let (ra, rb) = tokio::join!(
            async move { a.toggle_like("m1").await },
            async move { b.toggle_like("m1").await }
        );
        // one like followed by one unlike
        let mut outcomes = vec![ra.unwrap(), rb.unwrap()];
        outcomes.sort();
        assert_eq!(outcomes, vec![false, true]);
        assert!(!h.store.is_liked("m1").await);
        assert!(h.primary.rows(LIKES_TABLE).is_empty());
    }

    #[tokio::test]
    async fn derived_state_survives_transient_failures() {
        let primary = FakeTransport::new(TransportMode::Primary)
            .with_rows(ROLES_TABLE, roles("u1", "admin"))
            .with_rows(LIKES_TABLE, vec![json!({ "user_id": "u1", "model_id": "m1" })]);
        let h = ready_harness(Some("u1"), primary).await;
        assert!(h.store.is_admin().await);

        h.primary.fail(ROLES_TABLE);
        h.primary.fail(LIKES_TABLE);
        h.store.refresh_derived().await;
        assert!(h.store.is_admin().await);
        assert!(h.store.is_liked("m1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn logout_is_bounded_and_clears_everything() {
        let h = harness_with(
            FakeAuth::new(vec![SessionScript::Found(Some(session_for("u1", None)))])
                .hanging_sign_out(),
            FakeTransport::new(TransportMode::Primary).with_rows(ROLES_TABLE, roles("u1", "admin")),
            FakeTransport::new(TransportMode::Raw),
        );
        h.store.init(None).await;
        persist_token(h.storage.as_ref(), &session_for("u1", None));

        let started = tokio::time::Instant::now();
        assert_eq!(h.store.logout().await, Redirect::Home);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(2_000) && elapsed < Duration::from_millis(2_100));
        assert_eq!(h.storage.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(h.store.user_id().await, None);
        assert!(!h.store.is_admin().await);
    }

    #[tokio::test]
    async fn wait_ready_unblocks_after_init() {
        let h = harness(FakeAuth::new(vec![SessionScript::Found(None)]));
        let store = h.store.clone();
        let waiter = tokio::spawn(async move { store.wait_ready().await });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        h.store.init(None).await;
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn login_adopts_session() {
        let h = ready_harness(None, FakeTransport::new(TransportMode::Primary)).await;
        let user = h.store.login("a@b.org", "pw").await.unwrap();
        assert_eq!(user.id, "u-login");
        assert_eq!(h.store.user_id().await.as_deref(), Some("u-login"));
    }
}
