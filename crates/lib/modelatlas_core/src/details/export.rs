//! Card download and copy helpers.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value, json};

use crate::card::{CardData, CardError};

fn to_pretty<T: Serialize>(value: &T) -> Result<String, CardError> {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;
    // serde_json only emits valid UTF-8
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// The full card as JSON with four-space indentation.
pub fn export_json(card: &CardData) -> Result<String, CardError> {
    to_pretty(card)
}

/// `<name>_card.json`, the name lowercased with every non-alphanumeric
/// ASCII character replaced by `_`.
pub fn download_filename(card: &CardData) -> String {
    let stem: String = card
        .name()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{stem}_card.json")
}

fn put(map: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(v) = value {
        map.insert(key.to_string(), json!(v));
    }
}

/// A trimmed-down card with the descriptive fields only, as copied to the
/// clipboard. Absent text fields are omitted; the two comment fields
/// default to an empty string.
pub fn clean_summary(card: &CardData) -> Result<String, CardError> {
    let model = &card.model;
    let props = &model.properties;

    let mut properties = Map::new();
    put(&mut properties, "Architecture", props.architecture.as_deref());
    put(&mut properties, "Dataset", props.dataset.as_deref());
    put(&mut properties, "Indications for use", props.indications.as_deref());
    put(&mut properties, "Limitations", props.limitations.as_deref());
    properties.insert("Use".into(), json!(props.uses));
    put(&mut properties, "Validation", props.validation.as_deref());
    properties.insert(
        "Regulatory information".into(),
        json!({ "Comment": props.regulatory.comment.as_deref().unwrap_or("") }),
    );

    let mut summary = Map::new();
    put(&mut summary, "Name", model.name.as_deref());
    put(&mut summary, "Link", model.link.as_deref());
    summary.insert("Model properties".into(), Value::Object(properties));
    summary.insert(
        "Model performance".into(),
        json!({ "Comments": model.performance.comments.as_deref().unwrap_or("") }),
    );

    to_pretty(&json!({ "Model": summary }))
}
