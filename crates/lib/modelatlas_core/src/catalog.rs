//! Catalog browser.
//!
//! Paginated, filtered and sorted listing backed by the `get_model_previews`
//! RPC. Pages are appended as the user scrolls; any filter or sort change
//! starts over from page one. Each reset bumps an epoch so that a page
//! requested under an older filter set is discarded when it arrives.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::AppResult;
use crate::models::catalog::{ModelPreview, PreviewRow};
use crate::session::SessionStore;
use crate::transport::{TransportError, decode_rows};

/// Rows per page (a multiple of 1, 2 and 3 for the grid).
pub const PAGE_SIZE: usize = 18;

/// Quiet period before a search or identity change triggers a refetch.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Distance from the bottom at which the next page is requested.
pub const SCROLL_THRESHOLD_PX: f64 = 500.0;

pub const PREVIEWS_RPC: &str = "get_model_previews";

/// Sort order understood by the previews RPC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Likes,
    Newest,
    Name,
}

impl SortKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Likes => "likes",
            SortKey::Newest => "newest",
            SortKey::Name => "name",
        }
    }
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "likes" => Ok(SortKey::Likes),
            "newest" => Ok(SortKey::Newest),
            "name" => Ok(SortKey::Name),
            other => Err(format!("unknown sort key: {other}")),
        }
    }
}

/// Which multi-select filter a code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSet {
    Modalities,
    Specialties,
    Uses,
}

/// Everything that shapes the server-side query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub search_query: String,
    pub verified: bool,
    pub demo: bool,
    pub weights: bool,
    pub atlas: bool,
    /// Only models the current user liked.
    pub liked_only: bool,
    pub modalities: BTreeSet<String>,
    pub specialties: BTreeSet<String>,
    pub uses: BTreeSet<String>,
    pub sort: SortKey,
}

impl FilterState {
    /// Whether anything besides the sort order narrows the listing.
    pub fn is_filtered(&self) -> bool {
        !self.search_query.is_empty()
            || self.verified
            || self.demo
            || self.weights
            || self.atlas
            || self.liked_only
            || !self.modalities.is_empty()
            || !self.specialties.is_empty()
            || !self.uses.is_empty()
    }

    pub fn codes_mut(&mut self, set: CodeSet) -> &mut BTreeSet<String> {
        match set {
            CodeSet::Modalities => &mut self.modalities,
            CodeSet::Specialties => &mut self.specialties,
            CodeSet::Uses => &mut self.uses,
        }
    }

    /// RPC arguments for `page`.
    pub fn rpc_args(&self, page: usize, liked_by: Option<&str>) -> Value {
        json!({
            "p_page": page,
            "p_page_size": PAGE_SIZE,
            "p_search": self.search_query,
            "p_filters": {
                "verified": self.verified,
                "weights": self.weights,
                "demo": self.demo,
                "atlas": self.atlas,
                "modalities": self.modalities,
                "specialties": self.specialties,
                "uses": self.uses,
            },
            "p_sort": self.sort.as_str(),
            "p_liked_by_user": liked_by,
        })
    }
}

/// Pagination state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Fetching,
    /// The last page was short; nothing more to load.
    Exhausted,
}

/// What a fetch request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Loaded { added: usize, exhausted: bool },
    /// Another fetch is in flight or the listing is exhausted.
    Skipped,
    /// A reset happened while the page was in flight; it was discarded.
    Stale,
    /// A newer debounced request replaced this one.
    Superseded,
}

/// Viewport position reported by the front end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub viewport_height: f64,
    pub scroll_y: f64,
    pub document_height: f64,
}

impl ScrollMetrics {
    pub fn near_bottom(&self) -> bool {
        self.viewport_height + self.scroll_y >= self.document_height - SCROLL_THRESHOLD_PX
    }
}

struct Listing {
    filters: FilterState,
    models: Vec<ModelPreview>,
    /// Last page loaded (1-based); 0 before the first load.
    page: usize,
    total: i64,
    state: FetchState,
    epoch: u64,
}

/// Paginated model listing.
pub struct CatalogBrowser {
    session: Arc<SessionStore>,
    listing: Mutex<Listing>,
    debounce: AtomicU64,
}

fn preview_rows(value: Value) -> Result<Vec<PreviewRow>, TransportError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(rows) => decode_rows(rows),
        other => decode_rows(vec![other]),
    }
}

impl CatalogBrowser {
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self {
            session,
            listing: Mutex::new(Listing {
                filters: FilterState::default(),
                models: Vec::new(),
                page: 0,
                total: 0,
                state: FetchState::Idle,
                epoch: 0,
            }),
            debounce: AtomicU64::new(0),
        }
    }

    /// Load a page. With `reset` the listing starts over from page one;
    /// otherwise the next page is appended.
    ///
    /// Waits for the session store to become ready first.
    pub async fn fetch_models(&self, reset: bool) -> AppResult<FetchOutcome> {
        self.session.wait_ready().await;

        let (epoch, page, filters) = {
            let mut listing = self.listing.lock().await;
            if reset {
                listing.epoch += 1;
                listing.page = 0;
                listing.models.clear();
            } else if listing.state != FetchState::Idle {
                return Ok(FetchOutcome::Skipped);
            }
            listing.state = FetchState::Fetching;
            (listing.epoch, listing.page + 1, listing.filters.clone())
        };

        let liked_by = if filters.liked_only {
            self.session.user_id().await
        } else {
            None
        };
        let args = filters.rpc_args(page, liked_by.as_deref());
        debug!(page, epoch, "fetching previews");
        let transport = self.session.transport().await;
        let result = match transport.rpc(PREVIEWS_RPC, args).await {
            Ok(value) => preview_rows(value),
            Err(e) => Err(e),
        };

        let mut listing = self.listing.lock().await;
        if listing.epoch != epoch {
            debug!(page, epoch, current = listing.epoch, "discarding page from superseded query");
            return Ok(FetchOutcome::Stale);
        }

        let rows = match result {
            Ok(rows) => rows,
            Err(e) => {
                listing.state = FetchState::Idle;
                error!(page, error = %e, "failed to fetch previews");
                return Err(e.into());
            }
        };

        let raw_count = rows.len();
        if reset {
            listing.total = rows.first().map(|r| r.total_count).unwrap_or(0);
        }
        let mut seen: HashSet<String> = listing.models.iter().map(|m| m.id.clone()).collect();
        let mut added = 0;
        for row in rows {
            if !seen.insert(row.id.clone()) {
                continue;
            }
            let id = row.id.clone();
            match ModelPreview::from_row(row) {
                Ok(preview) if preview.card.deleted => {}
                Ok(preview) => {
                    listing.models.push(preview);
                    added += 1;
                }
                Err(e) => warn!(%id, error = %e, "skipping preview with unreadable card"),
            }
        }

        listing.page = page;
        let exhausted = raw_count < PAGE_SIZE;
        listing.state = if exhausted {
            FetchState::Exhausted
        } else {
            FetchState::Idle
        };
        debug!(page, added, exhausted, "previews loaded");
        Ok(FetchOutcome::Loaded { added, exhausted })
    }

    /// Apply `change` to the filters and reload if anything changed.
    pub async fn update_filters<F>(&self, change: F) -> AppResult<FetchOutcome>
    where
        F: FnOnce(&mut FilterState),
    {
        let changed = {
            let mut listing = self.listing.lock().await;
            let before = listing.filters.clone();
            change(&mut listing.filters);
            listing.filters != before
        };
        if !changed {
            return Ok(FetchOutcome::Skipped);
        }
        self.fetch_models(true).await
    }

    /// Add `code` to a multi-select filter, or remove it if present.
    pub async fn toggle_code(&self, set: CodeSet, code: &str) -> AppResult<FetchOutcome> {
        self.update_filters(|filters| {
            let codes = filters.codes_mut(set);
            if !codes.remove(code) {
                codes.insert(code.to_string());
            }
        })
        .await
    }

    /// Clear every filter (sort order is kept) and reload.
    pub async fn reset_filters(&self) -> AppResult<FetchOutcome> {
        self.debounce.fetch_add(1, Ordering::SeqCst);
        self.update_filters(|filters| {
            *filters = FilterState {
                sort: filters.sort,
                ..FilterState::default()
            };
        })
        .await
    }

    /// Update the search text; the reload happens after [`SEARCH_DEBOUNCE`]
    /// unless another search or identity change arrives first.
    pub async fn set_search_query(&self, query: &str) -> AppResult<FetchOutcome> {
        self.listing.lock().await.filters.search_query = query.to_string();
        self.debounced_reload().await
    }

    async fn debounced_reload(&self) -> AppResult<FetchOutcome> {
        let generation = self.debounce.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(SEARCH_DEBOUNCE).await;
        if self.debounce.load(Ordering::SeqCst) != generation {
            return Ok(FetchOutcome::Superseded);
        }
        self.fetch_models(true).await
    }

    /// Whether a scroll position should request the next page.
    pub async fn should_load_more(&self, metrics: ScrollMetrics) -> bool {
        metrics.near_bottom() && self.listing.lock().await.state == FetchState::Idle
    }

    pub async fn handle_scroll(&self, metrics: ScrollMetrics) -> AppResult<FetchOutcome> {
        if !self.should_load_more(metrics).await {
            return Ok(FetchOutcome::Skipped);
        }
        self.fetch_models(false).await
    }

    /// Reload (debounced) whenever the signed-in user changes after the
    /// session store became ready.
    pub fn spawn_identity_watch(self: &Arc<Self>) -> JoinHandle<()> {
        let browser = Arc::clone(self);
        let mut users = self.session.subscribe_user();
        tokio::spawn(async move {
            browser.session.wait_ready().await;
            let _ = users.borrow_and_update();
            while users.changed().await.is_ok() {
                let user_id = users.borrow_and_update().clone();
                debug!(user_id = user_id.as_deref().unwrap_or("-"), "identity changed, reloading catalog");
                if let Err(e) = browser.debounced_reload().await {
                    warn!(error = %e, "catalog reload after identity change failed");
                }
            }
        })
    }

    pub async fn models(&self) -> Vec<ModelPreview> {
        self.listing.lock().await.models.clone()
    }

    pub async fn total(&self) -> i64 {
        self.listing.lock().await.total
    }

    pub async fn state(&self) -> FetchState {
        self.listing.lock().await.state
    }

    /// Last page loaded; the next fetch requests the one after it.
    pub async fn current_page(&self) -> usize {
        self.listing.lock().await.page
    }

    pub async fn filters(&self) -> FilterState {
        self.listing.lock().await.filters.clone()
    }

    pub async fn is_filtered(&self) -> bool {
        self.listing.lock().await.filters.is_filtered()
    }
}
