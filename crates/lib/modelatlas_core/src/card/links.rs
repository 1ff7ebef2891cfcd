//! Link validation and paper link derivation.

use super::Reference;

/// Whether `s` has visible content.
pub fn has_text(s: Option<&str>) -> bool {
    s.is_some_and(|v| !v.trim().is_empty())
}

/// Whether `s` starts with an http(s) scheme (case-insensitive).
pub fn has_http_scheme(s: &str) -> bool {
    let lower = s.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Whether `s` parses as an absolute http or https URL.
pub fn is_valid_http_url(s: &str) -> bool {
    url::Url::parse(s.trim())
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Resolve the link to a reference's paper.
///
/// Priority: a manual `PaperLink` starting with `http`, then the `DOI`
/// field interpreted as a PMC id, a `PMID:` id, a bare DOI, or a URL.
pub fn paper_link(reference: &Reference) -> Option<String> {
    if let Some(link) = reference.paper_link.as_deref().map(str::trim)
        && link.starts_with("http")
    {
        return Some(link.to_string());
    }

    let doi = reference.doi.as_deref()?.trim();
    let upper = doi.to_ascii_uppercase();
    if upper.starts_with("PMC") {
        return Some(format!("https://www.ncbi.nlm.nih.gov/pmc/articles/{doi}/"));
    }
    if upper.starts_with("PMID:") {
        let pmid = doi.split(':').nth(1).unwrap_or_default().trim();
        return Some(format!("https://pubmed.ncbi.nlm.nih.gov/{pmid}/"));
    }
    if doi.starts_with("10.") {
        return Some(format!("https://doi.org/{doi}"));
    }
    if doi.starts_with("http") {
        return Some(doi.to_string());
    }
    None
}
