//! In-memory fakes for the transport and auth seams.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthClient, AuthError, AuthEvent, AuthEventKind};
use crate::config::AtlasConfig;
use crate::models::auth::{AuthUser, Session};
use crate::session::{SessionStore, SessionStoreParts};
use crate::storage::{MemoryStorage, SessionStorage};
use crate::transport::{Query, Returning, Transport, TransportError, TransportMode};

pub(crate) const TOKEN_KEY: &str = "sb-test-auth-token";

type RpcHandler = Box<dyn Fn(&Value) -> Result<Value, TransportError> + Send + Sync>;

/// A recorded transport call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Select(String, Vec<(String, String)>),
    Insert(String, Value),
    Update(String, Value, Vec<(String, String)>),
    Delete(String, Vec<(String, String)>),
    Rpc(String, Value),
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches(row: &Value, filters: &[(String, String)]) -> bool {
    filters
        .iter()
        .all(|(column, expected)| row.get(column).map(cell_text).as_deref() == Some(expected))
}

fn refused(target: &str) -> TransportError {
    TransportError::Status {
        status: 500,
        message: format!("injected failure on {target}"),
        code: None,
    }
}

/// Table store with filtering by equality, a call log and failure injection.
pub(crate) struct FakeTransport {
    mode: TransportMode,
    tables: Mutex<HashMap<String, Vec<Value>>>,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<String>>,
    rpcs: Mutex<HashMap<String, RpcHandler>>,
    next_id: AtomicU64,
    delay: Mutex<Option<Duration>>,
}

impl FakeTransport {
    pub(crate) fn new(mode: TransportMode) -> Self {
        Self {
            mode,
            tables: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            rpcs: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            delay: Mutex::new(None),
        }
    }

    pub(crate) fn with_rows(self, table: &str, rows: Vec<Value>) -> Self {
        self.tables.lock().unwrap().insert(table.to_string(), rows);
        self
    }

    pub(crate) fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Fail every call touching `target` (a table name or `rpc:<name>`).
    pub(crate) fn fail(&self, target: &str) {
        self.failing.lock().unwrap().insert(target.to_string());
    }

    pub(crate) fn recover(&self, target: &str) {
        self.failing.lock().unwrap().remove(target);
    }

    pub(crate) fn on_rpc<F>(&self, function: &str, handler: F)
    where
        F: Fn(&Value) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        self.rpcs
            .lock()
            .unwrap()
            .insert(function.to_string(), Box::new(handler));
    }

    /// Sleep this long inside every call.
    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn rpc_calls(&self, function: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Rpc(name, args) if name == function => Some(args),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    async fn enter(&self, call: Call, target: &str) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(call);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(target) {
            return Err(refused(target));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn mode(&self) -> TransportMode {
        self.mode
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, TransportError> {
        self.enter(Call::Select(table.into(), query.filters().to_vec()), table)
            .await?;
        let tables = self.tables.lock().unwrap();
        let rows = tables.get(table).map(Vec::as_slice).unwrap_or_default();
        let limit = query.max_rows().unwrap_or(usize::MAX);
        Ok(rows
            .iter()
            .filter(|row| matches(row, query.filters()))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert(
        &self,
        table: &str,
        mut row: Value,
        returning: Returning,
    ) -> Result<Vec<Value>, TransportError> {
        self.enter(Call::Insert(table.into(), row.clone()), table).await?;
        if let Value::Object(map) = &mut row
            && !map.contains_key("id")
        {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            map.insert("id".into(), json!(format!("{table}-{id}")));
        }
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(match returning {
            Returning::Representation => vec![row],
            Returning::Minimal => Vec::new(),
        })
    }

    async fn update(&self, table: &str, patch: Value, query: &Query) -> Result<Vec<Value>, TransportError> {
        self.enter(
            Call::Update(table.into(), patch.clone(), query.filters().to_vec()),
            table,
        )
        .await?;
        let mut tables = self.tables.lock().unwrap();
        let mut updated = Vec::new();
        for row in tables.entry(table.to_string()).or_default().iter_mut() {
            if !matches(row, query.filters()) {
                continue;
            }
            if let (Value::Object(target), Value::Object(fields)) = (&mut *row, &patch) {
                for (k, v) in fields {
                    target.insert(k.clone(), v.clone());
                }
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<(), TransportError> {
        self.enter(Call::Delete(table.into(), query.filters().to_vec()), table)
            .await?;
        if let Some(rows) = self.tables.lock().unwrap().get_mut(table) {
            rows.retain(|row| !matches(row, query.filters()));
        }
        Ok(())
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, TransportError> {
        let target = format!("rpc:{function}");
        self.enter(Call::Rpc(function.into(), args.clone()), &target)
            .await?;
        let rpcs = self.rpcs.lock().unwrap();
        match rpcs.get(function) {
            Some(handler) => handler(&args),
            None => Ok(Value::Null),
        }
    }
}

/// Scripted outcome of one `get_session` call.
#[derive(Debug, Clone)]
pub(crate) enum SessionScript {
    Found(Option<Session>),
    /// Never completes until cancelled.
    Hang,
    LockError,
    Fatal,
}

/// Auth client driven by a script of `get_session` outcomes.
pub(crate) struct FakeAuth {
    script: Mutex<VecDeque<SessionScript>>,
    fallback: Mutex<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
    hang_sign_out: bool,
    pub(crate) sign_outs: AtomicU64,
    set_session_result: Mutex<Option<Session>>,
}

impl FakeAuth {
    pub(crate) fn new(script: Vec<SessionScript>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            script: Mutex::new(script.into()),
            fallback: Mutex::new(None),
            events,
            hang_sign_out: false,
            sign_outs: AtomicU64::new(0),
            set_session_result: Mutex::new(None),
        }
    }

    /// Returned by `get_session` once the script is exhausted.
    pub(crate) fn with_fallback(self, session: Option<Session>) -> Self {
        *self.fallback.lock().unwrap() = session;
        self
    }

    pub(crate) fn hanging_sign_out(mut self) -> Self {
        self.hang_sign_out = true;
        self
    }

    pub(crate) fn accept_handoff(self, session: Session) -> Self {
        *self.set_session_result.lock().unwrap() = Some(session);
        self
    }

    pub(crate) fn emit(&self, kind: AuthEventKind, session: Option<Session>) {
        let _ = self.events.send(AuthEvent { kind, session });
    }
}

#[async_trait]
impl AuthClient for FakeAuth {
    async fn get_session(&self, cancel: &CancellationToken) -> Result<Option<Session>, AuthError> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(SessionScript::Found(session)) => Ok(session),
            Some(SessionScript::Hang) => {
                cancel.cancelled().await;
                Err(AuthError::Aborted)
            }
            Some(SessionScript::LockError) => Err(AuthError::LockTimeout(Duration::from_secs(10))),
            Some(SessionScript::Fatal) => Err(AuthError::Api {
                status: 500,
                message: "boom".into(),
            }),
            None => Ok(self.fallback.lock().unwrap().clone()),
        }
    }

    async fn set_session(
        &self,
        access_token: &str,
        _refresh_token: &str,
        _cancel: &CancellationToken,
    ) -> Result<Session, AuthError> {
        let accepted = self.set_session_result.lock().unwrap().clone();
        match accepted {
            Some(session) if session.access_token == access_token => Ok(session),
            _ => Err(AuthError::InvalidSession("rejected handoff".into())),
        }
    }

    async fn sign_in_with_password(&self, email: &str, _password: &str) -> Result<Session, AuthError> {
        let session = session_for("u-login", Some(email));
        self.emit(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, cancel: &CancellationToken) -> Result<(), AuthError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        if self.hang_sign_out {
            cancel.cancelled().await;
            return Err(AuthError::Aborted);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

pub(crate) fn session_for(user_id: &str, email: Option<&str>) -> Session {
    Session {
        access_token: format!("at-{user_id}"),
        refresh_token: format!("rt-{user_id}"),
        expires_at: None,
        user: AuthUser {
            id: user_id.to_string(),
            email: email.map(str::to_string),
        },
    }
}

pub(crate) fn persist_token(storage: &dyn SessionStorage, session: &Session) {
    storage
        .set(TOKEN_KEY, &serde_json::to_string(session).unwrap())
        .unwrap();
}

/// Everything a session-store test needs to poke at.
pub(crate) struct Harness {
    pub(crate) store: Arc<SessionStore>,
    pub(crate) auth: Arc<FakeAuth>,
    pub(crate) storage: Arc<MemoryStorage>,
    pub(crate) primary: Arc<FakeTransport>,
    /// Transport handed out for raw mode, shared so tests can inspect it.
    pub(crate) raw: Arc<FakeTransport>,
}

pub(crate) fn test_config() -> AtlasConfig {
    AtlasConfig {
        backend_url: "http://127.0.0.1:9".into(),
        anon_key: "anon".into(),
        state_dir: std::env::temp_dir(),
        session_timeout: Duration::from_millis(2_000),
        session_attempts: 2,
        lock_retry_delay: Duration::from_millis(500),
        signout_timeout: Duration::from_millis(2_000),
        lock_wait: Duration::from_millis(10_000),
    }
}

pub(crate) fn harness_with(auth: FakeAuth, primary: FakeTransport, raw: FakeTransport) -> Harness {
    let auth = Arc::new(auth);
    let storage = Arc::new(MemoryStorage::new());
    let primary = Arc::new(primary);
    let raw = Arc::new(raw);
    let raw_for_factory = raw.clone();
    let store = Arc::new(SessionStore::new(SessionStoreParts {
        config: test_config(),
        auth: auth.clone(),
        storage: storage.clone(),
        token_key: TOKEN_KEY.to_string(),
        primary: primary.clone(),
        raw_factory: Arc::new(move |_token: String| raw_for_factory.clone() as Arc<dyn Transport>),
    }));
    Harness {
        store,
        auth,
        storage,
        primary,
        raw,
    }
}

pub(crate) fn harness(auth: FakeAuth) -> Harness {
    harness_with(
        auth,
        FakeTransport::new(TransportMode::Primary),
        FakeTransport::new(TransportMode::Raw),
    )
}

/// A store that resolved to `user_id` through the primary transport.
pub(crate) async fn ready_harness(user_id: Option<&str>, primary: FakeTransport) -> Harness {
    let session = user_id.map(|id| session_for(id, None));
    let h = harness_with(
        FakeAuth::new(vec![SessionScript::Found(session)]),
        primary,
        FakeTransport::new(TransportMode::Raw),
    );
    h.store.init(None).await;
    h
}
