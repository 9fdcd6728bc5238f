//! Paper identifier extraction and canonicalization.
//!
//! Identifiers are pulled out of `arxiv.org/abs/...` and `arxiv.org/pdf/...`
//! links. The canonical form drops the trailing version suffix so that
//! `1234.5678v2` and `1234.5678` join to the same paper.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

/// Paper link pattern: scheme, host, `abs|pdf`, numeric id with optional version, optional `.pdf`.
static PAPER_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://arxiv\.org/(?:abs|pdf)/([0-9]+\.[0-9v]+)(?:\.pdf)?")
        .expect("paper link regex must compile")
});

/// Trailing version suffix, e.g. `v2`. Repeated groups are stripped together.
static VERSION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:v[0-9]+)+$").expect("version suffix regex must compile"));

/// Canonical paper identifier (version suffix removed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaperId(String);

impl PaperId {
    /// Canonicalize a raw identifier such as `1234.5678v3`.
    pub fn canonicalize(raw: &str) -> Self {
        PaperId(VERSION_SUFFIX.replace(raw.trim(), "").into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Abstract page URL for this paper.
    pub fn abs_url(&self) -> String {
        format!("https://arxiv.org/abs/{}", self.0)
    }
}

impl fmt::Display for PaperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PaperId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Deduplicated set of canonical identifiers.
pub type IdentifierSet = BTreeSet<PaperId>;

/// Strip a trailing version suffix from a raw identifier.
pub fn canonicalize(raw: &str) -> String {
    PaperId::canonicalize(raw).into_string()
}

/// Find the first paper link in `text` and return its identifier as written,
/// version suffix included.
pub fn find_raw_identifier(text: &str) -> Option<&str> {
    PAPER_LINK
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Return the canonical identifier of the first paper link in `text`.
pub fn extract_identifier(text: &str) -> Option<PaperId> {
    find_raw_identifier(text).map(PaperId::canonicalize)
}

/// Return every distinct canonical identifier linked from `text`.
pub fn extract_all_identifiers(text: &str) -> IdentifierSet {
    PAPER_LINK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| PaperId::canonicalize(m.as_str()))
        .collect()
}
