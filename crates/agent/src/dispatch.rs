//! Request dispatch: decides whether an utterance is a "meta" request for a
//! short suggestion list (fast path) or a request that needs tool orchestration.

use serde::{Deserialize, Serialize};

/// Lowercase phrases that mark a request for prompt suggestions.
pub const FAST_PATH_KEYWORDS: &[&str] = &[
    "suggest",
    "suggestions",
    "prompts they might",
    "actionable prompts",
    "follow-up prompts",
    "json array",
];

pub const MAX_SUGGESTIONS: usize = 4;

pub const STARTER_SUGGESTIONS: [&str; MAX_SUGGESTIONS] = [
    "Show me available bonds",
    "View customer profiles",
    "Search market data",
    "Email customers about bonds",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchDecision {
    FastPath,
    Orchestrated,
}

impl DispatchDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FastPath => "fast_path",
            Self::Orchestrated => "orchestrated",
        }
    }
}

impl std::fmt::Display for DispatchDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any single keyword found as a substring of the lowercased utterance selects the fast path.
pub fn classify(utterance: &str) -> DispatchDecision {
    let lowered = utterance.to_lowercase();
    if FAST_PATH_KEYWORDS.iter().any(|keyword| lowered.contains(keyword)) {
        DispatchDecision::FastPath
    } else {
        DispatchDecision::Orchestrated
    }
}

/// Strips one pair of enclosing quotes, then unescapes literal `\n` and `\t`.
pub fn normalize_fast_path_response(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|quote| {
            trimmed
                .strip_prefix(*quote)
                .and_then(|rest| rest.strip_suffix(*quote))
        })
        .unwrap_or(trimmed);

    unquoted.replace("\\n", "\n").replace("\\t", "\t")
}

/// Reads up to [`MAX_SUGGESTIONS`] non-blank strings from a JSON array embedded
/// in `text`. Anything unusable yields the starter list.
pub fn parse_suggestions(text: &str) -> Vec<String> {
    let parsed = serde_json::from_str::<Vec<String>>(text.trim()).ok().or_else(|| {
        let start = text.find('[')?;
        let end = text.rfind(']')?;
        if end <= start {
            return None;
        }
        serde_json::from_str::<Vec<String>>(&text[start..=end]).ok()
    });

    let suggestions: Vec<String> = parsed
        .unwrap_or_default()
        .into_iter()
        .map(|suggestion| suggestion.trim().to_string())
        .filter(|suggestion| !suggestion.is_empty())
        .take(MAX_SUGGESTIONS)
        .collect();

    if suggestions.is_empty() {
        starter_suggestions()
    } else {
        suggestions
    }
}

pub fn starter_suggestions() -> Vec<String> {
    STARTER_SUGGESTIONS.iter().map(|suggestion| (*suggestion).to_string()).collect()
}
