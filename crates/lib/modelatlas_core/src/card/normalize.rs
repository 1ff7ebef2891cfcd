//! One-shot normalization of raw card documents.
//!
//! Runs on load: decodes string-encoded layers, then applies the ordered
//! migrations so the typed schema can be deserialized directly.

use serde_json::{Map, Value, json};
use tracing::debug;

use super::{CardData, CardError};

/// Maximum number of string-encoding layers unwrapped.
pub const MAX_DECODE_DEPTH: usize = 3;

/// Version reached after every migration has been applied.
pub const SCHEMA_VERSION: u32 = 5;

type Migration = fn(&mut Map<String, Value>);

/// Ordered migrations, keyed by the version they produce.
const MIGRATIONS: &[(u32, Migration)] = &[
    (1, lift_legacy_demo_link),
    (2, coerce_lists),
    (3, coerce_weights_flag),
    (4, backfill_sections),
    (5, coerce_leaf_types),
];

/// Unwrap JSON that was stored as a string, up to [`MAX_DECODE_DEPTH`] times.
pub fn decode_layers(mut value: Value) -> Result<Value, CardError> {
    let mut depth = 0;
    while let Value::String(encoded) = &value {
        if depth == MAX_DECODE_DEPTH {
            break;
        }
        value = serde_json::from_str(encoded)?;
        depth += 1;
    }
    if depth > 0 {
        debug!(layers = depth, "decoded string-encoded card data");
    }
    Ok(value)
}

/// Decode and migrate a raw card document into the typed schema.
pub fn normalize(raw: Value) -> Result<CardData, CardError> {
    let decoded = decode_layers(raw)?;
    let Value::Object(mut root) = decoded else {
        return Err(CardError::NotAnObject);
    };
    for (_version, migrate) in MIGRATIONS {
        migrate(&mut root);
    }
    Ok(serde_json::from_value(Value::Object(root))?)
}

fn object_at<'a>(root: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let slot = root
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(map) => map,
        _ => unreachable!("non-object slots are replaced above"),
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Older cards kept `demo_link` at the root or directly under `Model`.
fn lift_legacy_demo_link(root: &mut Map<String, Value>) {
    let root_link = root.remove("demo_link");
    let model = object_at(root, "Model");
    let model_link = model.remove("demo_link");
    let legacy = non_empty_str(root_link.as_ref()).or_else(|| non_empty_str(model_link.as_ref()));

    let repo = object_at(object_at(model, "Model properties"), "repository_analysis");
    if non_empty_str(repo.get("demo_link")).is_none()
        && let Some(link) = legacy
    {
        repo.insert("demo_link".into(), Value::String(link));
    }
}

fn coerce_list(map: &mut Map<String, Value>, key: &str) {
    let Some(slot) = map.get_mut(key) else {
        return;
    };
    *slot = match slot.take() {
        Value::Array(items) => Value::Array(items),
        Value::Null => json!([]),
        Value::String(s) if s.trim().is_empty() => json!([]),
        other => Value::Array(vec![other]),
    };
}

/// Scalar values where the schema expects lists.
fn coerce_lists(root: &mut Map<String, Value>) {
    let model = object_at(root, "Model");
    coerce_list(object_at(model, "Indexing"), "Content");
    let descriptors = object_at(model, "Descriptors");
    coerce_list(descriptors, "Authors");
    coerce_list(descriptors, "Organizations");
    coerce_list(descriptors, "References");
    let imaging = object_at(model, "Imaging");
    coerce_list(imaging, "Modalities");
    coerce_list(imaging, "Procedures");
    coerce_list(object_at(model, "Model properties"), "Use");
    coerce_list(object_at(model, "Model performance"), "Metrics");
}

/// `contains_weights` was historically a boolean.
fn coerce_weights_flag(root: &mut Map<String, Value>) {
    let repo = object_at(
        object_at(object_at(root, "Model"), "Model properties"),
        "repository_analysis",
    );
    if let Some(Value::Bool(flag)) = repo.get("contains_weights") {
        let text = if *flag { "yes" } else { "no" };
        repo.insert("contains_weights".into(), Value::String(text.into()));
    }
}

/// Defaults for fields every view and the edit form rely on.
fn backfill_sections(root: &mut Map<String, Value>) {
    let model = object_at(root, "Model");

    let props = object_at(model, "Model properties");
    let repo = object_at(props, "repository_analysis");
    if non_empty_str(repo.get("contains_weights")).is_none() {
        repo.insert("contains_weights".into(), json!("n/a"));
    }
    let regulatory = object_at(props, "Regulatory information");
    regulatory.entry("Comment").or_insert_with(|| json!(""));

    let performance = object_at(model, "Model performance");
    performance.entry("Comments").or_insert_with(|| json!(""));

    let descriptors = object_at(model, "Descriptors");
    let references = descriptors
        .entry("References")
        .or_insert_with(|| json!([]));
    if let Value::Array(items) = references {
        items.retain(Value::is_object);
        if items.is_empty() {
            items.push(json!({}));
        }
    }
}

/// Text rendering of an off-type leaf. Arrays are joined with `", "`;
/// nulls inside them are dropped.
fn leaf_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) | Value::Object(_) => Some(value.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(leaf_text)
                .collect::<Vec<_>>()
                .join(", "),
        ),
    }
}

fn coerce_text(map: &mut Map<String, Value>, keys: &[&str]) {
    for key in keys {
        if let Some(slot) = map.get_mut(*key)
            && !matches!(slot, Value::String(_) | Value::Null)
        {
            *slot = leaf_text(slot).map_or(Value::Null, Value::String);
        }
    }
}

fn coerce_text_items(map: &mut Map<String, Value>, keys: &[&str]) {
    for key in keys {
        if let Some(Value::Array(items)) = map.get_mut(*key) {
            let texts: Vec<Value> = items
                .iter()
                .filter_map(|item| match item {
                    Value::Array(_) | Value::Object(_) => Some(item.to_string()),
                    other => leaf_text(other),
                })
                .map(Value::String)
                .collect();
            *items = texts;
        }
    }
}

/// Numbers, booleans and lists stored where the schema expects text, and
/// non-text items inside text lists.
fn coerce_leaf_types(root: &mut Map<String, Value>) {
    coerce_text(root, &["$schema"]);
    if let Some(flag) = root.get("_deleted")
        && !flag.is_boolean()
    {
        let deleted = flag.as_str().is_some_and(|s| s.eq_ignore_ascii_case("true"));
        root.insert("_deleted".into(), Value::Bool(deleted));
    }

    let model = object_at(root, "Model");
    coerce_text(model, &["Name", "Link"]);
    coerce_text_items(object_at(model, "Indexing"), &["Content"]);

    let descriptors = object_at(model, "Descriptors");
    coerce_text(descriptors, &["Funding", "Ethical review"]);
    coerce_text_items(descriptors, &["Authors", "Organizations"]);
    if let Some(Value::Array(references)) = descriptors.get_mut("References") {
        for reference in references.iter_mut() {
            if let Value::Object(reference) = reference {
                coerce_text(reference, &["Title", "DOI", "PaperLink"]);
            }
        }
    }

    let imaging = object_at(model, "Imaging");
    coerce_text(imaging, &["Comments"]);
    coerce_text_items(imaging, &["Modalities", "Procedures"]);

    let props = object_at(model, "Model properties");
    coerce_text(
        props,
        &[
            "Architecture",
            "Dataset",
            "Validation",
            "Limitations",
            "Indications for use",
            "Sustainability",
            "Availability",
        ],
    );
    coerce_text_items(props, &["Use"]);
    coerce_text(object_at(props, "Regulatory information"), &["Comment"]);
    coerce_text(
        object_at(props, "repository_analysis"),
        &["contains_weights", "demo_available", "demo_link"],
    );

    coerce_text(object_at(model, "Model performance"), &["Comments"]);
}
