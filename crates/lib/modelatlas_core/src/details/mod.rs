//! Detail and edit view of one model record.
//!
//! Loading resolves the record and, when it is flagged, the current user's
//! own flag entry so they can withdraw it. Saving writes one audit entry per
//! changed tracked field, then the record itself. The writes are independent
//! requests; a failure midway leaves the earlier ones in place.

mod draft;
mod export;

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::catalog::{
    AuditEntry, EDITS_TABLE, FLAG_FIELD_PATH, FlagPayload, MODELS_TABLE, ModelRecord, ModelRow,
    Severity,
};
use crate::session::SessionStore;
use crate::transport::{Query, Returning, TransportError};

pub use draft::{EditDraft, FieldChange, TRACKED_FIELDS, diff};
pub use export::{clean_summary, download_filename, export_json};

/// Reason preselected in the flag dialog.
pub const DEFAULT_FLAG_REASON: &str = "Irrelevant/ Spam";

/// Result of [`DetailView::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub audit_entries: Vec<AuditEntry>,
    pub verified: bool,
    /// Verification was requested but the record is flagged.
    pub verification_downgraded: bool,
}

fn row_id(row: &Value) -> Option<String> {
    match row.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// One loaded record plus the viewer's flag state.
pub struct DetailView {
    session: Arc<SessionStore>,
    record: ModelRecord,
    flag_id: Option<String>,
}

impl DetailView {
    /// Load record `id`. A missing id, an unknown or unreadable record and a
    /// soft-deleted card all end in an error that redirects home.
    pub async fn load(session: Arc<SessionStore>, id: Option<&str>) -> AppResult<Self> {
        let id = id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(AppError::MissingIdentifier("id"))?;
        session.wait_ready().await;
        let transport = session.transport().await;

        let row = match transport
            .select_one(MODELS_TABLE, &Query::new().eq("id", id))
            .await
        {
            Ok(Some(row)) => row,
            Ok(None) => return Err(AppError::NotFound(format!("model {id}"))),
            Err(e) => {
                warn!(%id, error = %e, "failed to load model");
                return Err(AppError::NotFound(format!("model {id}")));
            }
        };
        let row: ModelRow = serde_json::from_value(row).map_err(|e| {
            warn!(%id, error = %e, "model row did not decode");
            AppError::NotFound(format!("model {id}"))
        })?;
        let record = ModelRecord::from_row(row).map_err(|e| {
            warn!(%id, error = %e, "model card is unreadable");
            AppError::NotFound(format!("model {id}"))
        })?;
        if record.card.deleted {
            debug!(%id, "model is soft-deleted");
            return Err(AppError::NotFound(format!("model {id}")));
        }

        let mut view = Self {
            session,
            record,
            flag_id: None,
        };
        view.flag_id = view.own_flag_id().await;
        Ok(view)
    }

    async fn own_flag_id(&self) -> Option<String> {
        if !self.record.is_flagged {
            return None;
        }
        let user_id = self.session.user_id().await?;
        let query = Query::new()
            .select("id")
            .eq("model_id", &self.record.id)
            .eq("user_id", &user_id)
            .eq("field_path", FLAG_FIELD_PATH);
        match self.session.transport().await.select_one(EDITS_TABLE, &query).await {
            Ok(row) => row.as_ref().and_then(row_id),
            Err(e) => {
                warn!(model_id = %self.record.id, error = %e, "failed to look up own flag");
                None
            }
        }
    }

    async fn require_user(&self) -> AppResult<String> {
        self.session
            .user_id()
            .await
            .ok_or(AppError::NotAuthenticated)
    }

    pub fn record(&self) -> &ModelRecord {
        &self.record
    }

    pub fn is_flagged(&self) -> bool {
        self.record.is_flagged
    }

    /// Id of the current user's flag entry, if they flagged this record.
    pub fn flag_id(&self) -> Option<&str> {
        self.flag_id.as_deref()
    }

    /// Flagged records are read-only except for admins.
    pub async fn can_edit(&self) -> bool {
        !self.record.is_flagged || self.session.is_admin().await
    }

    /// Start editing.
    pub async fn begin_edit(&self) -> AppResult<EditDraft> {
        if !self.can_edit().await {
            return Err(AppError::Forbidden("cannot edit a flagged model".into()));
        }
        Ok(EditDraft::from_card(&self.record.card))
    }

    /// Persist `draft`. Invalid drafts are rejected before any request.
    pub async fn save(&mut self, draft: EditDraft, should_verify: bool) -> AppResult<SaveOutcome> {
        let user_id = self.require_user().await?;
        let errors = draft.validation_errors();
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }
        if !self.can_edit().await {
            return Err(AppError::Forbidden("cannot edit a flagged model".into()));
        }

        let model_id = self.record.id.clone();
        let transport = self.session.transport().await;
        let mut audit_entries = Vec::new();
        for change in diff(&self.record.card, &draft)? {
            let entry = AuditEntry {
                model_id: model_id.clone(),
                user_id: user_id.clone(),
                field_path: change.path,
                old_value: change.old_value,
                new_value: change.new_value,
                severity: change.severity,
            };
            let row = serde_json::to_value(&entry).map_err(TransportError::from)?;
            transport.insert(EDITS_TABLE, row, Returning::Minimal).await?;
            audit_entries.push(entry);
        }

        let verification_downgraded = should_verify && self.record.is_flagged;
        let verified = should_verify && !verification_downgraded;
        let card_value = draft.card().to_value()?;
        let mut patch = json!({ "card_data": card_value });
        let now = Utc::now();
        if verified {
            patch["is_verified"] = json!(true);
            patch["verified_by"] = json!(user_id);
            patch["verification_date"] = json!(now);
        }
        transport
            .update(MODELS_TABLE, patch, &Query::new().eq("id", &model_id))
            .await?;

        self.record.card = draft.into_card();
        if verified {
            self.record.is_verified = true;
            self.record.verified_by = Some(user_id);
            self.record.verification_date = Some(now);
        }
        info!(
            %model_id,
            changes = audit_entries.len(),
            verified,
            verification_downgraded,
            "model saved"
        );
        Ok(SaveOutcome {
            audit_entries,
            verified,
            verification_downgraded,
        })
    }

    /// Flag the record and mark it flagged for every viewer. Returns the id
    /// of the flag entry.
    pub async fn submit_flag(&mut self, reason: &str, comment: &str) -> AppResult<String> {
        let user_id = self.require_user().await?;
        if self.record.is_flagged {
            return Err(AppError::Forbidden("model is already flagged".into()));
        }
        let payload = FlagPayload {
            reason: reason.to_string(),
            comment: comment.to_string(),
        };
        let entry = AuditEntry {
            model_id: self.record.id.clone(),
            user_id,
            field_path: FLAG_FIELD_PATH.to_string(),
            old_value: String::new(),
            new_value: serde_json::to_string(&payload)
                .map_err(TransportError::from)?,
            severity: Severity::Major,
        };
        let transport = self.session.transport().await;
        let rows = transport
            .insert(
                EDITS_TABLE,
                serde_json::to_value(&entry).map_err(TransportError::from)?,
                Returning::Representation,
            )
            .await?;
        let flag_id = rows
            .first()
            .and_then(row_id)
            .ok_or_else(|| AppError::NotFound("flag entry id".into()))?;

        transport
            .update(
                MODELS_TABLE,
                json!({ "is_flagged": true, "flag_reason": reason }),
                &Query::new().eq("id", &self.record.id),
            )
            .await?;

        self.record.is_flagged = true;
        self.record.flag_reason = Some(reason.to_string());
        self.flag_id = Some(flag_id.clone());
        info!(model_id = %self.record.id, %flag_id, "model flagged");
        Ok(flag_id)
    }

    /// Withdraw the current user's flag.
    pub async fn unflag(&mut self) -> AppResult<()> {
        self.require_user().await?;
        let Some(flag_id) = self.flag_id.clone() else {
            return Err(AppError::Forbidden(
                "only the user who flagged this model can unflag it".into(),
            ));
        };
        let transport = self.session.transport().await;
        transport
            .delete(EDITS_TABLE, &Query::new().eq("id", &flag_id))
            .await?;
        transport
            .update(
                MODELS_TABLE,
                json!({ "is_flagged": false, "flag_reason": null }),
                &Query::new().eq("id", &self.record.id),
            )
            .await?;

        self.record.is_flagged = false;
        self.record.flag_reason = None;
        self.flag_id = None;
        info!(model_id = %self.record.id, %flag_id, "flag withdrawn");
        Ok(())
    }

    pub fn export_json(&self) -> AppResult<String> {
        Ok(export_json(&self.record.card)?)
    }

    pub fn download_filename(&self) -> String {
        download_filename(&self.record.card)
    }

    pub fn clean_summary(&self) -> AppResult<String> {
        Ok(clean_summary(&self.record.card)?)
    }
}
