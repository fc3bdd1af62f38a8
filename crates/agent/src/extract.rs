use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const PREVIEW_ID_PATTERN: &str = r"(?i)preview[_\s-]?id[: ]+([A-Za-z0-9_\-]+)";
const CUSTOMER_ID_PATTERN: &str = r"\bCUST-\d+\b";
const REQUEST_ID_PATTERN: &str = r"(?i)request[_\s-]?id[: ]+([A-Za-z0-9\-]+)";

/// Identifiers surfaced in streamed text. Sets, so merging is a plain union.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedIds {
    pub preview_ids: BTreeSet<String>,
    pub customer_ids: BTreeSet<String>,
    pub request_ids: BTreeSet<String>,
}

impl ExtractedIds {
    pub fn is_empty(&self) -> bool {
        self.preview_ids.is_empty() && self.customer_ids.is_empty() && self.request_ids.is_empty()
    }

    pub fn merge(&mut self, other: &ExtractedIds) {
        self.preview_ids.extend(other.preview_ids.iter().cloned());
        self.customer_ids.extend(other.customer_ids.iter().cloned());
        self.request_ids.extend(other.request_ids.iter().cloned());
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizedChunk {
    pub text: String,
    pub ids: ExtractedIds,
}

/// Returns the chunk untouched alongside the identifiers found in it.
///
/// A match split across two chunks is not recovered. A pattern that cannot be
/// compiled contributes an empty set instead of failing the stream.
pub fn extract(chunk: &str) -> SanitizedChunk {
    let ids = ExtractedIds {
        preview_ids: captures(preview_pattern(), chunk, 1),
        customer_ids: captures(customer_pattern(), chunk, 0),
        request_ids: captures(request_pattern(), chunk, 1),
    };
    SanitizedChunk { text: chunk.to_string(), ids }
}

fn captures(pattern: Option<&Regex>, text: &str, group: usize) -> BTreeSet<String> {
    let Some(pattern) = pattern else {
        return BTreeSet::new();
    };
    pattern
        .captures_iter(text)
        .filter_map(|captures| captures.get(group))
        .map(|value| value.as_str().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn preview_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(PREVIEW_ID_PATTERN).ok()).as_ref()
}

fn customer_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(CUSTOMER_ID_PATTERN).ok()).as_ref()
}

fn request_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(REQUEST_ID_PATTERN).ok()).as_ref()
}
