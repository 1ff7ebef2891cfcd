//! Model card schema.
//!
//! A card is a nested document describing one model. The backend stores it as
//! loosely-typed JSON (sometimes string-encoded more than once); [`normalize`]
//! turns whatever arrives into a [`CardData`] with every section present.
//! Unknown keys are carried through the `extra` maps so a round-trip never
//! loses data.

pub mod codes;
pub mod links;
mod normalize;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use normalize::{MAX_DECODE_DEPTH, SCHEMA_VERSION, decode_layers, normalize};

/// Schema URL stamped on newly submitted cards.
pub const CARD_SCHEMA_URL: &str = "https://atlas.rsna.org/schemas/2025-11/model.json";

/// Card decoding errors.
#[derive(Debug, Error)]
pub enum CardError {
    #[error("Card data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Card data is not an object")]
    NotAnObject,

    #[error("Card path not found: {0}")]
    Path(String),
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Root of a model card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardData {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(rename = "Model", default)]
    pub model: ModelSection,
    /// Soft-delete marker; deleted cards are hidden from every view.
    #[serde(rename = "_deleted", default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSection {
    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Repository link.
    #[serde(rename = "Link", default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(rename = "Indexing", default)]
    pub indexing: Indexing,
    #[serde(rename = "Descriptors", default)]
    pub descriptors: Descriptors,
    #[serde(rename = "Imaging", default)]
    pub imaging: Imaging,
    #[serde(rename = "Model properties", default)]
    pub properties: ModelProperties,
    #[serde(rename = "Model performance", default)]
    pub performance: ModelPerformance,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Indexing {
    /// Modality and subspecialty codes.
    #[serde(rename = "Content", default)]
    pub content: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Descriptors {
    #[serde(rename = "Authors", default)]
    pub authors: Vec<String>,
    #[serde(rename = "Organizations", default)]
    pub organizations: Vec<String>,
    #[serde(rename = "Funding", default, skip_serializing_if = "Option::is_none")]
    pub funding: Option<String>,
    #[serde(
        rename = "Ethical review",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ethical_review: Option<String>,
    #[serde(rename = "References", default)]
    pub references: Vec<Reference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "Title", default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "DOI", default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    /// Manual override of the derived paper link.
    #[serde(rename = "PaperLink", default, skip_serializing_if = "Option::is_none")]
    pub paper_link: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Imaging {
    #[serde(rename = "Modalities", default)]
    pub modalities: Vec<String>,
    #[serde(rename = "Procedures", default)]
    pub procedures: Vec<String>,
    #[serde(rename = "Comments", default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelProperties {
    #[serde(rename = "Architecture", default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(rename = "Dataset", default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    #[serde(rename = "Validation", default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<String>,
    #[serde(rename = "Limitations", default, skip_serializing_if = "Option::is_none")]
    pub limitations: Option<String>,
    #[serde(
        rename = "Indications for use",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub indications: Option<String>,
    #[serde(rename = "Sustainability", default, skip_serializing_if = "Option::is_none")]
    pub sustainability: Option<String>,
    #[serde(rename = "Availability", default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<String>,
    /// Use-case tags.
    #[serde(rename = "Use", default)]
    pub uses: Vec<String>,
    #[serde(rename = "Regulatory information", default)]
    pub regulatory: RegulatoryInformation,
    #[serde(rename = "repository_analysis", default)]
    pub repository: RepositoryAnalysis,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegulatoryInformation {
    #[serde(rename = "Comment", default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryAnalysis {
    /// `"yes"`, `"no"` or `"n/a"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains_weights: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demo_available: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demo_link: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPerformance {
    #[serde(rename = "Metrics", default)]
    pub metrics: Vec<Value>,
    #[serde(rename = "Comments", default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CardData {
    /// Display name, or an empty string.
    pub fn name(&self) -> &str {
        self.model.name.as_deref().unwrap_or("")
    }

    /// Modality codes present in the card's index.
    pub fn primary_modalities(&self) -> Vec<String> {
        self.model
            .indexing
            .content
            .iter()
            .filter(|c| codes::is_modality(c))
            .cloned()
            .collect()
    }

    /// Display labels of every non-modality code in the card's index.
    pub fn subspecialty_labels(&self) -> Vec<String> {
        self.model
            .indexing
            .content
            .iter()
            .filter(|c| !codes::is_modality(c))
            .map(|c| codes::label(c).to_string())
            .collect()
    }

    /// Whether the repository analysis reports downloadable weights.
    pub fn has_weights(&self) -> bool {
        self.model.properties.repository.contains_weights.as_deref() == Some("yes")
    }

    /// Demo link, if one is present and is an http(s) URL.
    pub fn demo_link(&self) -> Option<String> {
        self.model
            .properties
            .repository
            .demo_link
            .as_deref()
            .map(str::trim)
            .filter(|l| links::has_http_scheme(l))
            .map(str::to_string)
    }

    /// DOI of the first reference as stored.
    pub fn raw_doi(&self) -> Option<&str> {
        self.model
            .descriptors
            .references
            .first()
            .and_then(|r| r.doi.as_deref())
    }

    /// Resolved paper link of the first reference.
    pub fn paper_link(&self) -> Option<String> {
        self.model
            .descriptors
            .references
            .first()
            .and_then(links::paper_link)
    }

    /// Serialize to a JSON value (used for path lookups and writes).
    pub fn to_value(&self) -> Result<Value, CardError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Value at a dotted path such as `Model.Descriptors.References.0.PaperLink`.
    ///
    /// Numeric segments index into arrays. Returns `None` for absent paths.
    pub fn value_at(&self, path: &str) -> Result<Option<Value>, CardError> {
        let root = self.to_value()?;
        Ok(lookup(&root, path).cloned())
    }

    /// Replace the value at a dotted path, creating intermediate objects.
    pub fn set_value_at(&mut self, path: &str, value: Value) -> Result<(), CardError> {
        let mut root = self.to_value()?;
        let mut cursor = &mut root;
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return Err(CardError::Path(path.to_string()));
        };
        for segment in parents {
            cursor = step_mut(cursor, segment).ok_or_else(|| CardError::Path(path.to_string()))?;
        }
        match cursor {
            Value::Object(map) => {
                map.insert((*last).to_string(), value);
            }
            Value::Array(items) => {
                let idx: usize = last.parse().map_err(|_| CardError::Path(path.to_string()))?;
                let slot = items
                    .get_mut(idx)
                    .ok_or_else(|| CardError::Path(path.to_string()))?;
                *slot = value;
            }
            _ => return Err(CardError::Path(path.to_string())),
        }
        *self = serde_json::from_value(root)?;
        Ok(())
    }
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn step_mut<'a>(node: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match node {
        Value::Object(map) => Some(
            map.entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
        ),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    }
}
