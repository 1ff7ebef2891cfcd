//! Submission form.
//!
//! Flat form fields mapped to and from the nested card document. New
//! submissions are stored as pending rows owned by the submitter; opening the
//! page with an existing submission id edits that row instead.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::card::{self, CARD_SCHEMA_URL, CardData, CardError, codes, links};
use crate::error::{AppError, AppResult};
use crate::models::catalog::{SUBMISSIONS_TABLE, SubmissionRow, SubmissionStatus};
use crate::session::SessionStore;
use crate::transport::{Query, Returning, TransportError};

/// Fields that must be non-blank before submitting.
pub const REQUIRED_FIELDS: &[&str] = &[
    "name",
    "link",
    "paper_title",
    "doi",
    "authors",
    "organizations",
    "funding",
    "ethical_review",
    "architecture",
    "dataset",
    "indications",
    "limitations",
    "regulatory",
    "validation",
    "performance_metrics",
];

/// Flat representation of a card as edited in the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionForm {
    pub name: String,
    pub link: String,
    pub demo_link: String,
    pub paper_link: String,
    pub paper_title: String,
    pub doi: String,

    pub architecture: String,
    pub dataset: String,
    pub indications: String,
    pub limitations: String,
    pub sustainability: String,
    pub availability: String,

    /// Separated by newlines or commas.
    pub authors: String,
    /// Separated by newlines or semicolons.
    pub organizations: String,
    pub funding: String,
    pub ethical_review: String,
    /// Separated by newlines or commas.
    pub imaging_procedures: String,
    pub imaging_comments: String,

    pub use_cases: Vec<String>,
    pub modalities: Vec<String>,
    pub specialties: Vec<String>,

    pub regulatory: String,
    pub validation: String,
    pub contains_weights: String,
    pub demo_available: String,

    pub performance_metrics: String,
}

impl Default for SubmissionForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            link: String::new(),
            demo_link: String::new(),
            paper_link: String::new(),
            paper_title: String::new(),
            doi: String::new(),
            architecture: String::new(),
            dataset: String::new(),
            indications: String::new(),
            limitations: String::new(),
            sustainability: String::new(),
            availability: String::new(),
            authors: String::new(),
            organizations: String::new(),
            funding: String::new(),
            ethical_review: String::new(),
            imaging_procedures: String::new(),
            imaging_comments: String::new(),
            use_cases: Vec::new(),
            modalities: Vec::new(),
            specialties: Vec::new(),
            regulatory: String::new(),
            validation: String::new(),
            contains_weights: "n/a".into(),
            demo_available: "no".into(),
            performance_metrics: String::new(),
        }
    }
}

/// Split on any run of `separators`, trimming and dropping empty items.
fn split_list(text: &str, separators: &[char]) -> Vec<String> {
    text.split(|c| separators.contains(&c))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

const LIST_SEPARATORS: &[char] = &['\n', ','];
const ORG_SEPARATORS: &[char] = &['\n', ';'];

fn text(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

impl SubmissionForm {
    /// Fill the form from an existing card.
    pub fn from_card(card: &CardData) -> Self {
        let model = &card.model;
        let desc = &model.descriptors;
        let props = &model.properties;
        let repo = &props.repository;
        let reference = desc.references.first();
        let perf = &model.performance;

        let performance_metrics = match perf.comments.as_deref() {
            Some(c) if !c.trim().is_empty() => c.to_string(),
            _ => perf
                .metrics
                .iter()
                .map(|m| match m {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        };

        Self {
            name: text(model.name.as_deref()),
            link: text(model.link.as_deref()),
            demo_link: text(repo.demo_link.as_deref()),
            paper_link: text(reference.and_then(|r| r.paper_link.as_deref())),
            paper_title: text(reference.and_then(|r| r.title.as_deref())),
            doi: text(reference.and_then(|r| r.doi.as_deref())),
            architecture: text(props.architecture.as_deref()),
            dataset: text(props.dataset.as_deref()),
            indications: text(props.indications.as_deref()),
            limitations: text(props.limitations.as_deref()),
            sustainability: text(props.sustainability.as_deref()),
            availability: text(props.availability.as_deref()),
            authors: desc.authors.join(", "),
            organizations: desc.organizations.join("; "),
            funding: text(desc.funding.as_deref()),
            ethical_review: text(desc.ethical_review.as_deref()),
            imaging_procedures: model.imaging.procedures.join(", "),
            imaging_comments: text(model.imaging.comments.as_deref()),
            use_cases: props.uses.clone(),
            modalities: model
                .indexing
                .content
                .iter()
                .filter(|c| codes::is_modality(c))
                .cloned()
                .collect(),
            specialties: model
                .indexing
                .content
                .iter()
                .filter(|c| codes::is_subspecialty(c))
                .cloned()
                .collect(),
            regulatory: text(props.regulatory.comment.as_deref()),
            validation: text(props.validation.as_deref()),
            contains_weights: repo
                .contains_weights
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "n/a".into()),
            demo_available: repo
                .demo_available
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "no".into()),
            performance_metrics,
        }
    }

    /// Build the card document stored with the submission.
    pub fn to_card(&self) -> Result<CardData, CardError> {
        let content: Vec<&String> = self.modalities.iter().chain(&self.specialties).collect();
        let paper_title = if self.paper_title.is_empty() {
            "Paper"
        } else {
            self.paper_title.as_str()
        };
        let demo_link = (!self.demo_link.is_empty()).then_some(self.demo_link.as_str());
        let value = json!({
            "$schema": CARD_SCHEMA_URL,
            "Model": {
                "Name": self.name,
                "Link": self.link,
                "Indexing": { "Content": content },
                "Descriptors": {
                    "Authors": split_list(&self.authors, LIST_SEPARATORS),
                    "Organizations": split_list(&self.organizations, ORG_SEPARATORS),
                    "Funding": self.funding,
                    "Ethical review": self.ethical_review,
                    "References": [{
                        "Title": paper_title,
                        "DOI": self.doi,
                        "PaperLink": self.paper_link,
                    }],
                },
                "Imaging": {
                    "Modalities": [],
                    "Procedures": split_list(&self.imaging_procedures, LIST_SEPARATORS),
                    "Comments": self.imaging_comments,
                },
                "Model properties": {
                    "Architecture": self.architecture,
                    "Sustainability": self.sustainability,
                    "Limitations": self.limitations,
                    "Indications for use": self.indications,
                    "Regulatory information": { "Comment": self.regulatory },
                    "Use": self.use_cases,
                    "Availability": self.availability,
                    "Dataset": self.dataset,
                    "Validation": self.validation,
                    "repository_analysis": {
                        "contains_weights": self.contains_weights,
                        "demo_available": self.demo_available,
                        "demo_link": demo_link,
                    },
                },
                "Model performance": {
                    "Metrics": [],
                    "Comments": self.performance_metrics,
                },
            },
        });
        card::normalize(value)
    }

    fn field(&self, name: &str) -> &str {
        match name {
            "name" => &self.name,
            "link" => &self.link,
            "paper_title" => &self.paper_title,
            "doi" => &self.doi,
            "authors" => &self.authors,
            "organizations" => &self.organizations,
            "funding" => &self.funding,
            "ethical_review" => &self.ethical_review,
            "architecture" => &self.architecture,
            "dataset" => &self.dataset,
            "indications" => &self.indications,
            "limitations" => &self.limitations,
            "regulatory" => &self.regulatory,
            "validation" => &self.validation,
            "performance_metrics" => &self.performance_metrics,
            _ => "",
        }
    }

    /// Names of the fields that fail validation; empty when submittable.
    pub fn validate(&self) -> Vec<String> {
        let mut failing: Vec<String> = REQUIRED_FIELDS
            .iter()
            .filter(|f| self.field(f).trim().is_empty())
            .map(|f| (*f).to_string())
            .collect();
        for (name, selected) in [
            ("use_cases", &self.use_cases),
            ("modalities", &self.modalities),
            ("specialties", &self.specialties),
        ] {
            if selected.is_empty() {
                failing.push(name.to_string());
            }
        }
        for (name, link) in [
            ("link", &self.link),
            ("demo_link", &self.demo_link),
            ("paper_link", &self.paper_link),
        ] {
            if links::has_text(Some(link)) && !links::is_valid_http_url(link) {
                failing.push(name.to_string());
            }
        }
        failing
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

/// What [`SubmissionPage::submit`] wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created,
    Updated,
}

/// The submission page: a form bound to the signed-in user and, in edit
/// mode, to an existing submission.
pub struct SubmissionPage {
    session: Arc<SessionStore>,
    user_id: String,
    submission_id: Option<String>,
    form: SubmissionForm,
}

impl SubmissionPage {
    /// Open the page. Requires a signed-in user; with `edit_id` the form is
    /// filled from that submission.
    pub async fn open(session: Arc<SessionStore>, edit_id: Option<&str>) -> AppResult<Self> {
        session.wait_ready().await;
        let user_id = session.user_id().await.ok_or(AppError::NotAuthenticated)?;

        let edit_id = edit_id.map(str::trim).filter(|s| !s.is_empty());
        let form = match edit_id {
            None => SubmissionForm::default(),
            Some(id) => {
                let row = session
                    .transport()
                    .await
                    .select_one(SUBMISSIONS_TABLE, &Query::new().eq("id", id))
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("submission {id}")))?;
                let row: SubmissionRow = serde_json::from_value(row).map_err(|e| {
                    warn!(%id, error = %e, "submission row did not decode");
                    AppError::NotFound(format!("submission {id}"))
                })?;
                SubmissionForm::from_card(&card::normalize(row.card_data)?)
            }
        };

        Ok(Self {
            session,
            user_id,
            submission_id: edit_id.map(str::to_string),
            form,
        })
    }

    pub fn is_edit(&self) -> bool {
        self.submission_id.is_some()
    }

    pub fn form(&self) -> &SubmissionForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut SubmissionForm {
        &mut self.form
    }

    /// Store the form. Invalid forms are rejected before any request.
    pub async fn submit(&self) -> AppResult<SubmitOutcome> {
        let failing = self.form.validate();
        if !failing.is_empty() {
            return Err(AppError::Validation(failing));
        }
        let card_data = self.form.to_card()?.to_value()?;
        let transport = self.session.transport().await;

        match &self.submission_id {
            Some(id) => {
                transport
                    .update(
                        SUBMISSIONS_TABLE,
                        json!({ "card_data": card_data }),
                        &Query::new().eq("id", id),
                    )
                    .await?;
                info!(submission_id = %id, "submission updated");
                Ok(SubmitOutcome::Updated)
            }
            None => {
                let row = json!({
                    "user_id": self.user_id,
                    "card_data": card_data,
                    "status": serde_json::to_value(SubmissionStatus::Pending)
                        .map_err(TransportError::from)?,
                });
                transport
                    .insert(SUBMISSIONS_TABLE, row, Returning::Minimal)
                    .await?;
                info!(user_id = %self.user_id, "submission created");
                Ok(SubmitOutcome::Created)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use serde_json::Value;

    use super::*;
    use crate::details::EditDraft;
    use crate::testing::{FakeTransport, ready_harness};
    use crate::transport::TransportMode;

    fn filled() -> SubmissionForm {
        SubmissionForm {
            name: "LungNet".into(),
            link: "https://github.com/example/lungnet".into(),
            paper_title: "Lung segmentation".into(),
            doi: "10.1000/xyz".into(),
            authors: "Ada Lovelace,\nAlan Turing, ".into(),
            organizations: "RSNA; MIT\nNIH".into(),
            funding: "NIH".into(),
            ethical_review: "IRB approved".into(),
            architecture: "U-Net".into(),
            dataset: "LIDC".into(),
            indications: "Screening".into(),
            limitations: "Adults only".into(),
            regulatory: "None".into(),
            validation: "internal".into(),
            performance_metrics: "Dice 0.91".into(),
            use_cases: vec!["Segmentation".into()],
            modalities: vec!["CT".into()],
            specialties: vec!["CH".into()],
            ..SubmissionForm::default()
        }
    }

    #[test]
    fn lists_are_split_on_their_separators() {
        let card = filled().to_card().unwrap();
        let desc = &card.model.descriptors;
        assert_eq!(desc.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(desc.organizations, vec!["RSNA", "MIT", "NIH"]);
    }

    #[test]
    fn card_shape() {
        let card = filled().to_card().unwrap();
        assert_eq!(card.schema.as_deref(), Some(CARD_SCHEMA_URL));
        assert_eq!(card.model.indexing.content, vec!["CT", "CH"]);
        assert!(card.model.imaging.modalities.is_empty());
        assert!(card.model.performance.metrics.is_empty());
        assert_eq!(card.model.performance.comments.as_deref(), Some("Dice 0.91"));
        assert_eq!(card.model.properties.repository.demo_link, None);
        assert_eq!(card.model.properties.repository.contains_weights.as_deref(), Some("n/a"));

        let untitled = SubmissionForm {
            paper_title: String::new(),
            ..filled()
        };
        let card = untitled.to_card().unwrap();
        assert_eq!(card.model.descriptors.references[0].title.as_deref(), Some("Paper"));
    }

    #[test]
    fn validation_lists_failing_fields() {
        assert!(filled().is_valid());

        let form = SubmissionForm {
            funding: "  ".into(),
            modalities: vec![],
            demo_link: "not a url".into(),
            ..filled()
        };
        assert_eq!(form.validate(), vec!["funding", "modalities", "demo_link"]);

        assert!(SubmissionForm::default().validate().contains(&"name".to_string()));
    }

    #[test]
    fn from_card_prefers_comments_over_metrics() {
        let card = card::normalize(json!({
            "Model": { "Model performance": { "Metrics": ["AUC 0.9", "F1 0.8"], "Comments": " " } }
        }))
        .unwrap();
        assert_eq!(SubmissionForm::from_card(&card).performance_metrics, "AUC 0.9\nF1 0.8");

        let card = filled().to_card().unwrap();
        let form = SubmissionForm::from_card(&card);
        assert_eq!(form.performance_metrics, "Dice 0.91");
        assert_eq!(form.organizations, "RSNA; MIT; NIH");
        assert_eq!(form.authors, "Ada Lovelace, Alan Turing");
    }

    #[test]
    fn codes_and_uses_survive_the_edit_round_trip() {
        let original = card::normalize(json!({
            "Model": {
                "Indexing": { "Content": ["MR", "NR", "CT", "PD"] },
                "Model properties": { "Use": ["Detection", "Triage", "LLM"] }
            }
        }))
        .unwrap();

        let card = SubmissionForm::from_card(&original).to_card().unwrap();
        let draft = EditDraft::from_card(&card);

        let codes_of = |c: &CardData| -> BTreeSet<String> {
            c.model.indexing.content.iter().cloned().collect()
        };
        assert_eq!(codes_of(draft.card()), codes_of(&original));
        assert_eq!(
            draft.card().model.properties.uses,
            vec!["Detection".to_string(), "LLM".to_string()]
        );
    }

    #[tokio::test]
    async fn open_requires_user() {
        let h = ready_harness(None, FakeTransport::new(TransportMode::Primary)).await;
        assert!(matches!(
            SubmissionPage::open(h.store.clone(), None).await.err().unwrap(),
            AppError::NotAuthenticated
        ));
    }

    #[tokio::test]
    async fn create_inserts_pending_submission() {
        let h = ready_harness(Some("u1"), FakeTransport::new(TransportMode::Primary)).await;
        let mut page = SubmissionPage::open(h.store.clone(), None).await.unwrap();
        assert!(!page.is_edit());
        *page.form_mut() = filled();

        assert_eq!(page.submit().await.unwrap(), SubmitOutcome::Created);
        let rows = h.primary.rows(SUBMISSIONS_TABLE);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["user_id"], json!("u1"));
        assert_eq!(rows[0]["status"], json!("pending"));
        assert_eq!(rows[0]["card_data"]["Model"]["Name"], json!("LungNet"));
    }

    #[tokio::test]
    async fn invalid_form_issues_no_requests() {
        let h = ready_harness(Some("u1"), FakeTransport::new(TransportMode::Primary)).await;
        let page = SubmissionPage::open(h.store.clone(), None).await.unwrap();
        h.primary.clear_calls();
        assert!(matches!(page.submit().await.err().unwrap(), AppError::Validation(_)));
        assert!(h.primary.calls().is_empty());
    }

    #[tokio::test]
    async fn edit_mode_loads_and_updates() {
        let stored = filled().to_card().unwrap().to_value().unwrap();
        let transport = FakeTransport::new(TransportMode::Primary).with_rows(
            SUBMISSIONS_TABLE,
            vec![json!({
                "id": 5,
                "user_id": "u1",
                "card_data": Value::String(stored.to_string()),
                "status": "pending"
            })],
        );
        let h = ready_harness(Some("u1"), transport).await;
        let mut page = SubmissionPage::open(h.store.clone(), Some("5")).await.unwrap();
        assert!(page.is_edit());
        assert_eq!(page.form().name, "LungNet");

        page.form_mut().name = "LungNet 2".into();
        assert_eq!(page.submit().await.unwrap(), SubmitOutcome::Updated);
        let rows = h.primary.rows(SUBMISSIONS_TABLE);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["card_data"]["Model"]["Name"], json!("LungNet 2"));
    }

    #[tokio::test]
    async fn submission_with_unrecognized_status_opens() {
        let transport = FakeTransport::new(TransportMode::Primary).with_rows(
            SUBMISSIONS_TABLE,
            vec![json!({
                "id": 6,
                "user_id": "u1",
                "card_data": {"Model": {"Name": "Archived Net"}},
                "status": "archived"
            })],
        );
        let h = ready_harness(Some("u1"), transport).await;
        let page = SubmissionPage::open(h.store.clone(), Some("6")).await.unwrap();
        assert_eq!(page.form().name, "Archived Net");
    }

    #[tokio::test]
    async fn unknown_submission_is_not_found() {
        let h = ready_harness(Some("u1"), FakeTransport::new(TransportMode::Primary)).await;
        assert!(matches!(
            SubmissionPage::open(h.store.clone(), Some("9")).await.err().unwrap(),
            AppError::NotFound(_)
        ));
    }
}
