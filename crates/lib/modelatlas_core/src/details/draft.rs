//! Edit drafts and field-level diffs.

use std::collections::HashMap;

use serde_json::Value;

use crate::card::{CardData, CardError, Reference, codes, links};
use crate::models::catalog::Severity;

/// Paths compared when saving an edit, in audit order.
pub const TRACKED_FIELDS: &[&str] = &[
    "Model.Name",
    "Model.Link",
    "Model.Model properties.repository_analysis.demo_link",
    "Model.Model properties.repository_analysis.contains_weights",
    "Model.Descriptors.References.0.PaperLink",
    "Model.Model properties.Architecture",
    "Model.Model properties.Dataset",
    "Model.Model properties.Indications for use",
    "Model.Model performance.Comments",
    "Model.Model properties.Limitations",
    "Model.Model properties.Use",
    "Model.Model properties.Validation",
    "Model.Model properties.Regulatory information.Comment",
];

/// One changed tracked field, values in their JSON text form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub path: String,
    pub old_value: String,
    pub new_value: String,
    pub severity: Severity,
}

/// A mutable copy of a card being edited.
#[derive(Debug, Clone, PartialEq)]
pub struct EditDraft {
    card: CardData,
    severities: HashMap<String, Severity>,
}

fn stringify(value: Option<Value>) -> Result<Option<String>, CardError> {
    value.map(|v| serde_json::to_string(&v)).transpose().map_err(CardError::from)
}

impl EditDraft {
    /// Deep copy of `card` prepared for the edit form: unknown use cases
    /// are dropped and an empty paper link is filled from the derived one.
    pub fn from_card(card: &CardData) -> Self {
        let derived_paper_link = card.paper_link();
        let mut card = card.clone();

        let props = &mut card.model.properties;
        props.uses.retain(|u| codes::is_use_category(u));
        if props.repository.contains_weights.is_none() {
            props.repository.contains_weights = Some("n/a".into());
        }

        let references = &mut card.model.descriptors.references;
        if references.is_empty() {
            references.push(Reference::default());
        }
        if let Some(first) = references.first_mut()
            && !links::has_text(first.paper_link.as_deref())
        {
            first.paper_link = Some(derived_paper_link.unwrap_or_default());
        }

        Self {
            card,
            severities: HashMap::new(),
        }
    }

    pub fn card(&self) -> &CardData {
        &self.card
    }

    pub fn card_mut(&mut self) -> &mut CardData {
        &mut self.card
    }

    pub fn into_card(self) -> CardData {
        self.card
    }

    /// Write `value` at a dotted path.
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), CardError> {
        self.card.set_value_at(path, value)
    }

    pub fn set_severity(&mut self, path: &str, severity: Severity) {
        self.severities.insert(path.to_string(), severity);
    }

    /// Severity recorded for `path`, `Minor` unless overridden.
    pub fn severity(&self, path: &str) -> Severity {
        self.severities.get(path).copied().unwrap_or_default()
    }

    fn paper_link(&self) -> Option<&str> {
        self.card
            .model
            .descriptors
            .references
            .first()
            .and_then(|r| r.paper_link.as_deref())
    }

    /// Reasons the draft cannot be saved; empty when it is valid.
    ///
    /// A paper link is required, as is a repository or demo link, and every
    /// link present must be an absolute http(s) URL.
    pub fn validation_errors(&self) -> Vec<String> {
        let repo = self.card.model.link.as_deref();
        let demo = self.card.model.properties.repository.demo_link.as_deref();
        let paper = self.paper_link();

        let mut errors = Vec::new();
        if !links::has_text(paper) {
            errors.push("paper link is required".to_string());
        }
        if !links::has_text(repo) && !links::has_text(demo) {
            errors.push("repository or demo link is required".to_string());
        }
        for (name, link) in [("paper link", paper), ("repository link", repo), ("demo link", demo)] {
            if let Some(link) = link
                && links::has_text(Some(link))
                && !links::is_valid_http_url(link)
            {
                errors.push(format!("{name} must be an http(s) URL"));
            }
        }
        errors
    }

    pub fn is_valid(&self) -> bool {
        self.validation_errors().is_empty()
    }

    /// Tracked fields whose JSON text differs from `baseline`. Absent
    /// values compare unequal to `null` and are recorded as an empty string.
    pub fn changes_from(&self, baseline: &CardData) -> Result<Vec<FieldChange>, CardError> {
        let mut changes = Vec::new();
        for path in TRACKED_FIELDS {
            let old = stringify(baseline.value_at(path)?)?;
            let new = stringify(self.card.value_at(path)?)?;
            if old != new {
                changes.push(FieldChange {
                    path: (*path).to_string(),
                    old_value: old.unwrap_or_default(),
                    new_value: new.unwrap_or_default(),
                    severity: self.severity(path),
                });
            }
        }
        Ok(changes)
    }
}

/// Tracked fields that differ between the stored `original` and `draft`.
///
/// Everything the draft would write back is reported, including the
/// preparation done by [`EditDraft::from_card`].
pub fn diff(original: &CardData, draft: &EditDraft) -> Result<Vec<FieldChange>, CardError> {
    draft.changes_from(original)
}
