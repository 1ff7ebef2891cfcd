//! Dashboard summary returned by `get_dashboard_stats`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Precomputed counts keyed by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(default)]
    pub modalities: BTreeMap<String, u64>,
    #[serde(default)]
    pub specialties: BTreeMap<String, u64>,
    #[serde(default)]
    pub uses: BTreeMap<String, u64>,
    #[serde(default)]
    pub validation: BTreeMap<String, u64>,
    /// Keyed by `"Available"` / `"Not Available"`.
    #[serde(default)]
    pub weights: BTreeMap<String, u64>,
}
