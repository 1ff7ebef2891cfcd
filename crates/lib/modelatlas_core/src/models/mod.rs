//! Domain models.
//!
//! Wire rows (as returned by the backend) and the normalized records the
//! components work with.

pub mod auth;
pub mod catalog;
pub mod stats;

use serde::{Deserialize, Deserializer};

/// Accept row identifiers encoded as either JSON strings or numbers.
pub(crate) fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Int(n) => n.to_string(),
    })
}

/// Treat a JSON `null` boolean as `false`.
pub(crate) fn de_null_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}
