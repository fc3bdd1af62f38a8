use bondline_agent::dispatch::{classify, FAST_PATH_KEYWORDS};
use serde_json::json;

use super::CommandResult;

pub fn run(utterance: &str) -> CommandResult {
    let decision = classify(utterance);
    let lowered = utterance.to_lowercase();
    let matched: Vec<&str> =
        FAST_PATH_KEYWORDS.iter().copied().filter(|keyword| lowered.contains(keyword)).collect();

    CommandResult::success_with_data(
        "classify",
        format!("utterance routes to {decision}"),
        json!({ "path": decision, "matched_keywords": matched }),
    )
}
