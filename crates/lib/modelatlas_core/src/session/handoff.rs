//! Cross-page session handoff via URL parameters.

use url::Url;

const ACCESS_PARAM: &str = "at";
const REFRESH_PARAM: &str = "rt";
const RECORD_PARAM: &str = "id";

/// Token pair (and optional record id) carried by a page URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    pub access_token: String,
    pub refresh_token: String,
    pub record_id: Option<String>,
    url: Url,
}

impl Handoff {
    /// Parse a page URL; `Ok(None)` when it carries no access token.
    pub fn from_url(raw: &str) -> Result<Option<Self>, url::ParseError> {
        let url = Url::parse(raw)?;
        let mut access_token = None;
        let mut refresh_token = String::new();
        let mut record_id = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                ACCESS_PARAM if !value.is_empty() => access_token = Some(value.into_owned()),
                REFRESH_PARAM => refresh_token = value.into_owned(),
                RECORD_PARAM if !value.is_empty() => record_id = Some(value.into_owned()),
                _ => {}
            }
        }
        Ok(access_token.map(|access_token| Self {
            access_token,
            refresh_token,
            record_id,
            url,
        }))
    }

    /// The page URL with the token parameters removed.
    pub fn scrubbed_url(&self) -> String {
        let mut url = self.url.clone();
        let kept: Vec<(String, String)> = self
            .url
            .query_pairs()
            .filter(|(k, _)| k != ACCESS_PARAM && k != REFRESH_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
        url.to_string()
    }
}
