use serde::{Deserialize, Serialize};

/// One prior exchange supplied by the client alongside the new prompt.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }

    fn display_role(&self) -> String {
        let role = self.role.trim();
        if role.is_empty() {
            return "Unknown".to_string();
        }
        let lowered = role.to_lowercase();
        let mut chars = lowered.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => "Unknown".to_string(),
        }
    }
}

/// Prefixes the prompt with a plain-text transcript of earlier turns.
///
/// ```text
/// Previous conversation:
/// User: show me bonds
/// Assistant: here are three bonds
///
/// <prompt>
/// ```
pub fn enrich_prompt(history: &[ConversationTurn], prompt: &str) -> String {
    if history.is_empty() {
        return prompt.to_string();
    }

    let lines = history
        .iter()
        .map(|turn| format!("{}: {}", turn.display_role(), turn.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Previous conversation:\n{lines}\n\n{prompt}")
}
