//! Dashboard statistics.
//!
//! One RPC returns every count the dashboard needs; nothing is aggregated
//! client-side.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::AppResult;
use crate::models::stats::DashboardStats;
use crate::session::SessionStore;
use crate::transport::TransportError;

pub const STATS_RPC: &str = "get_dashboard_stats";

/// Category of a filter badge count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountKind {
    Modality,
    Subspecialty,
    UseCase,
}

impl std::str::FromStr for CountKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Modality" => Ok(CountKind::Modality),
            "Subspecialty" => Ok(CountKind::Subspecialty),
            "Use Case" => Ok(CountKind::UseCase),
            other => Err(format!("unknown count kind: {other}")),
        }
    }
}

/// Holds the latest dashboard summary.
pub struct StatsAggregator {
    session: Arc<SessionStore>,
    stats: RwLock<Option<DashboardStats>>,
}

impl StatsAggregator {
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self {
            session,
            stats: RwLock::new(None),
        }
    }

    /// Fetch the summary once the session store is ready. On failure the
    /// previous summary is kept.
    pub async fn fetch(&self) -> AppResult<DashboardStats> {
        self.session.wait_ready().await;
        let transport = self.session.transport().await;
        let stats = match transport.rpc(STATS_RPC, json!({})).await {
            Ok(Value::Null) => DashboardStats::default(),
            Ok(value) => serde_json::from_value(value).map_err(TransportError::from)?,
            Err(e) => {
                error!(error = %e, "failed to fetch dashboard stats");
                return Err(e.into());
            }
        };
        debug!(
            modalities = stats.modalities.len(),
            specialties = stats.specialties.len(),
            "dashboard stats loaded"
        );
        *self.stats.write().await = Some(stats.clone());
        Ok(stats)
    }

    pub async fn stats(&self) -> Option<DashboardStats> {
        self.stats.read().await.clone()
    }

    /// Count shown next to a filter option; 0 when unknown.
    pub async fn count(&self, kind: CountKind, key: &str) -> u64 {
        let stats = self.stats.read().await;
        let Some(stats) = stats.as_ref() else {
            return 0;
        };
        let map = match kind {
            CountKind::Modality => &stats.modalities,
            CountKind::Subspecialty => &stats.specialties,
            CountKind::UseCase => &stats.uses,
        };
        map.get(key).copied().unwrap_or(0)
    }

    /// Refetch whenever the signed-in user changes after readiness; the
    /// admin-only figures differ per user.
    pub fn spawn_identity_watch(self: &Arc<Self>) -> JoinHandle<()> {
        let aggregator = Arc::clone(self);
        let mut users = self.session.subscribe_user();
        tokio::spawn(async move {
            aggregator.session.wait_ready().await;
            let _ = users.borrow_and_update();
            while users.changed().await.is_ok() {
                if let Err(e) = aggregator.fetch().await {
                    warn!(error = %e, "stats refetch after identity change failed");
                }
            }
        })
    }
}
