//! Application context.
//!
//! Built once at startup; owns the HTTP client, the auth client and the
//! session store, and hands out the page components.

use std::sync::Arc;

use reqwest::Client;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::auth::{AuthClient, GoTrueClient};
use crate::catalog::CatalogBrowser;
use crate::config::{AtlasConfig, HANDOFF_STORAGE_KEY};
use crate::details::DetailView;
use crate::error::{AppError, AppResult};
use crate::session::{Handoff, InitOutcome, SessionStore, SessionStoreParts};
use crate::stats::StatsAggregator;
use crate::storage::{self, FileStorage, MemoryStorage, SessionStorage, Theme};
use crate::submission::SubmissionPage;
use crate::transport::{RestClient, RestTransport, SdkTransport, Transport};

/// Shared handles for every component.
pub struct AppContext {
    config: AtlasConfig,
    /// Persistent state shared by every process (token blob, theme).
    preferences: Arc<FileStorage>,
    session: Arc<SessionStore>,
    listener: Option<JoinHandle<()>>,
}

impl AppContext {
    /// Wire up the clients without touching the network.
    ///
    /// With a handoff the auth client keeps its token in process-local
    /// storage under a separate key, so it never contends with the shared
    /// persisted token.
    pub fn build(config: AtlasConfig, handoff: Option<&Handoff>) -> AppResult<Self> {
        let preferences = Arc::new(FileStorage::open(config.state_dir.clone())?);
        let http = Client::builder()
            .user_agent(concat!("modelatlas/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Config(format!("HTTP client: {e}")))?;

        let (token_storage, token_key): (Arc<dyn SessionStorage>, String) = match handoff {
            Some(_) => (
                Arc::new(MemoryStorage::new()) as Arc<dyn SessionStorage>,
                HANDOFF_STORAGE_KEY.to_string(),
            ),
            None => (
                preferences.clone() as Arc<dyn SessionStorage>,
                config.token_storage_key(),
            ),
        };
        debug!(key = %token_key, handoff = handoff.is_some(), "token storage selected");

        let auth: Arc<dyn AuthClient> = Arc::new(GoTrueClient::new(
            http.clone(),
            &config.backend_url,
            config.anon_key.clone(),
            token_storage.clone(),
            token_key.clone(),
            config.lock_wait,
        ));
        let rest = RestClient::new(http, &config.backend_url, config.anon_key.clone());
        let primary: Arc<dyn Transport> = Arc::new(SdkTransport::new(rest.clone(), auth.clone()));
        let raw_rest = rest;
        let session = Arc::new(SessionStore::new(SessionStoreParts {
            config: config.clone(),
            auth,
            storage: token_storage,
            token_key,
            primary,
            raw_factory: Arc::new(move |token: String| {
                Arc::new(RestTransport::new(raw_rest.clone(), token)) as Arc<dyn Transport>
            }),
        }));

        Ok(Self {
            config,
            preferences,
            session,
            listener: None,
        })
    }

    /// Build, resolve the session and start listening for auth events.
    pub async fn start(
        config: AtlasConfig,
        handoff: Option<Handoff>,
    ) -> AppResult<(Arc<Self>, InitOutcome)> {
        let mut ctx = Self::build(config, handoff.as_ref())?;
        let outcome = ctx.session.init(handoff.as_ref()).await;
        ctx.listener = Some(ctx.session.spawn_auth_listener());
        info!(backend = %ctx.config.backend_url, "application context started");
        Ok((Arc::new(ctx), outcome))
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn catalog(&self) -> Arc<CatalogBrowser> {
        Arc::new(CatalogBrowser::new(self.session.clone()))
    }

    pub fn stats(&self) -> Arc<StatsAggregator> {
        Arc::new(StatsAggregator::new(self.session.clone()))
    }

    pub async fn detail(&self, id: Option<&str>) -> AppResult<DetailView> {
        DetailView::load(self.session.clone(), id).await
    }

    pub async fn submission(&self, edit_id: Option<&str>) -> AppResult<SubmissionPage> {
        SubmissionPage::open(self.session.clone(), edit_id).await
    }

    pub fn theme(&self) -> Theme {
        storage::load_theme(self.preferences.as_ref())
    }

    pub fn toggle_theme(&self) -> AppResult<Theme> {
        Ok(storage::toggle_theme(self.preferences.as_ref())?)
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::LoadingState;

    fn config_in(dir: &std::path::Path) -> AtlasConfig {
        AtlasConfig {
            backend_url: "http://127.0.0.1:9".into(),
            state_dir: dir.to_path_buf(),
            ..AtlasConfig::default()
        }
    }

    #[tokio::test]
    async fn start_without_persisted_token_is_signed_out_and_ready() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, outcome) = AppContext::start(config_in(dir.path()), None).await.unwrap();
        assert_eq!(outcome, InitOutcome::default());
        assert!(ctx.session().is_ready());
        let snapshot = ctx.session().snapshot().await;
        assert_eq!(snapshot.user_id, None);
        assert_eq!(snapshot.loading_state, LoadingState::Ready);
    }

    #[tokio::test]
    async fn rejected_handoff_still_becomes_ready() {
        let dir = tempfile::tempdir().unwrap();
        let handoff = Handoff::from_url("https://atlas.example/details.html?id=1&at=garbage&rt=r")
            .unwrap()
            .unwrap();
        let (ctx, outcome) = AppContext::start(config_in(dir.path()), Some(handoff))
            .await
            .unwrap();
        assert_eq!(outcome.scrubbed_url, None);
        assert!(ctx.session().is_ready());
        assert_eq!(ctx.session().user_id().await, None);
    }

    #[tokio::test]
    async fn theme_persists_in_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::build(config_in(dir.path()), None).unwrap();
        assert_eq!(ctx.theme(), Theme::Light);
        assert_eq!(ctx.toggle_theme().unwrap(), Theme::Dark);

        let again = AppContext::build(config_in(dir.path()), None).unwrap();
        assert_eq!(again.theme(), Theme::Dark);
        assert!(!again.session().is_ready());
    }
}
