//! Chart series for the statistics tab.
//!
//! Only the data is produced here; rendering is up to the front end.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::card::codes;
use crate::models::stats::DashboardStats;

/// Colours cycled across the segments of every chart.
pub const PALETTE: &[&str] = &[
    "#3b82f6", "#10b981", "#f59e0b", "#ef4444", "#8b5cf6", "#ec4899", "#6366f1",
];

const VALIDATION_KEYS: &[&str] = &["n/a", "internal", "external"];
const WEIGHT_KEYS: &[&str] = &["Available", "Not Available"];
const EXCLUDED_SPECIALTIES: &[&str] = &["QI"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Doughnut,
    Bar,
    Pie,
}

/// One chart: raw keys, display labels and values, index-aligned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartSeries {
    pub id: &'static str,
    pub kind: ChartKind,
    pub keys: Vec<String>,
    pub labels: Vec<String>,
    pub values: Vec<u64>,
}

impl ChartSeries {
    /// Colour of segment `i`.
    pub fn color(&self, i: usize) -> &'static str {
        PALETTE[i % PALETTE.len()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSeries {
    pub modality: ChartSeries,
    pub specialty: ChartSeries,
    pub validation: ChartSeries,
    pub weights: ChartSeries,
}

/// Entries sorted by count, largest first; ties keep key order.
fn by_count_desc<'a>(
    counts: &'a BTreeMap<String, u64>,
    skip: &[&str],
) -> Vec<(&'a String, u64)> {
    let mut entries: Vec<_> = counts
        .iter()
        .filter(|(k, _)| !skip.contains(&k.as_str()))
        .map(|(k, v)| (k, *v))
        .collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries
}

fn coded(id: &'static str, kind: ChartKind, entries: Vec<(&String, u64)>) -> ChartSeries {
    ChartSeries {
        id,
        kind,
        keys: entries.iter().map(|(k, _)| (*k).clone()).collect(),
        labels: entries.iter().map(|(k, _)| codes::label(k).to_string()).collect(),
        values: entries.iter().map(|(_, v)| *v).collect(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn dashboard_series(stats: &DashboardStats) -> DashboardSeries {
    let modality = coded(
        "modalityChart",
        ChartKind::Doughnut,
        by_count_desc(&stats.modalities, &[]),
    );
    let specialty = coded(
        "specialtyChart",
        ChartKind::Bar,
        by_count_desc(&stats.specialties, EXCLUDED_SPECIALTIES),
    );

    let present: Vec<&str> = VALIDATION_KEYS
        .iter()
        .copied()
        .filter(|k| stats.validation.contains_key(*k))
        .collect();
    let validation = ChartSeries {
        id: "validationChart",
        kind: ChartKind::Pie,
        keys: present.iter().map(|k| k.to_string()).collect(),
        labels: present.iter().map(|k| capitalize(k)).collect(),
        values: present
            .iter()
            .map(|k| stats.validation.get(*k).copied().unwrap_or(0))
            .collect(),
    };

    let weights = ChartSeries {
        id: "weightsChart",
        kind: ChartKind::Doughnut,
        keys: WEIGHT_KEYS.iter().map(|k| k.to_string()).collect(),
        labels: WEIGHT_KEYS.iter().map(|k| k.to_string()).collect(),
        values: WEIGHT_KEYS
            .iter()
            .map(|k| stats.weights.get(*k).copied().unwrap_or(0))
            .collect(),
    };

    DashboardSeries {
        modality,
        specialty,
        validation,
        weights,
    }
}
