//! Catalog records, audit entries and submissions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{de_id, de_null_false};
use crate::card::{self, CardData, CardError};

/// Table holding published model records.
pub const MODELS_TABLE: &str = "models";
/// Table holding field-level audit entries and flags.
pub const EDITS_TABLE: &str = "model_edits";
/// Table holding `(user_id, model_id)` like associations.
pub const LIKES_TABLE: &str = "model_likes";
/// Table holding pending submissions.
pub const SUBMISSIONS_TABLE: &str = "model_submissions";
/// Table holding user roles.
pub const ROLES_TABLE: &str = "user_roles";

/// `field_path` value marking a flag entry rather than a field edit.
pub const FLAG_FIELD_PATH: &str = "__FLAG__";

/// Row of the `models` table as returned by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelRow {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Card document, possibly string-encoded one or more times.
    #[serde(default)]
    pub card_data: Value,
    #[serde(default, deserialize_with = "de_null_false")]
    pub is_verified: bool,
    #[serde(default)]
    pub verified_by: Option<String>,
    #[serde(default)]
    pub verification_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_null_false")]
    pub is_flagged: bool,
    #[serde(default)]
    pub flag_reason: Option<String>,
    /// Denormalized like count; absent on older deployments.
    #[serde(default)]
    pub likes_count: i64,
}

/// A model record with its card normalized.
#[derive(Debug, Clone, Serialize)]
pub struct ModelRecord {
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub is_verified: bool,
    pub verified_by: Option<String>,
    pub verification_date: Option<DateTime<Utc>>,
    pub is_flagged: bool,
    pub flag_reason: Option<String>,
    pub likes_count: i64,
    pub card: CardData,
}

impl ModelRecord {
    pub fn from_row(row: ModelRow) -> Result<Self, CardError> {
        let card = card::normalize(row.card_data)?;
        Ok(Self {
            id: row.id,
            created_at: row.created_at,
            is_verified: row.is_verified,
            verified_by: row.verified_by,
            verification_date: row.verification_date,
            is_flagged: row.is_flagged,
            flag_reason: row.flag_reason,
            likes_count: row.likes_count,
            card,
        })
    }
}

/// Row returned by the `get_model_previews` RPC.
#[derive(Debug, Clone, Deserialize)]
pub struct PreviewRow {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_null_false")]
    pub is_verified: bool,
    #[serde(default)]
    pub likes_count: i64,
    #[serde(default)]
    pub preview_data: Value,
    #[serde(default)]
    pub total_count: i64,
}

/// A catalog entry shown in the browse grid.
#[derive(Debug, Clone, Serialize)]
pub struct ModelPreview {
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub is_verified: bool,
    pub likes_count: i64,
    pub card: CardData,
}

impl ModelPreview {
    pub fn from_row(row: PreviewRow) -> Result<Self, CardError> {
        let card = card::normalize(row.preview_data)?;
        Ok(Self {
            id: row.id,
            created_at: row.created_at,
            is_verified: row.is_verified,
            likes_count: row.likes_count,
            card,
        })
    }
}

/// Severity tag of an audit entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Minor,
    Major,
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minor" => Ok(Severity::Minor),
            "major" => Ok(Severity::Major),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// One row of the `model_edits` audit table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub model_id: String,
    pub user_id: String,
    pub field_path: String,
    pub old_value: String,
    pub new_value: String,
    pub severity: Severity,
}

/// Body of a flag entry's `new_value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagPayload {
    pub reason: String,
    pub comment: String,
}

/// Review state of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
    /// Any status this client does not know about.
    #[serde(other)]
    Other,
}

/// Row of the `model_submissions` table.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionRow {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub card_data: Value,
    pub status: SubmissionStatus,
}
