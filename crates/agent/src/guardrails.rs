#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailIntent {
    Read { tool: String },
    GuardedPreview { tool: String },
    GuardedCommit { tool: String, preview_id: Option<String> },
}

impl GuardrailIntent {
    pub fn tool(&self) -> &str {
        match self {
            Self::Read { tool } | Self::GuardedPreview { tool } | Self::GuardedCommit { tool, .. } => {
                tool
            }
        }
    }

    pub fn action_key(&self) -> &'static str {
        match self {
            Self::Read { .. } => "tool.read",
            Self::GuardedPreview { .. } => "guarded.preview",
            Self::GuardedCommit { .. } => "guarded.commit",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub guarded_actions_enabled: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { guarded_actions_enabled: true }
    }
}

impl GuardrailPolicy {
    pub fn evaluate(&self, intent: &GuardrailIntent) -> GuardrailDecision {
        match intent {
            GuardrailIntent::Read { .. } => GuardrailDecision::Allow,
            GuardrailIntent::GuardedPreview { .. } | GuardrailIntent::GuardedCommit { .. }
                if !self.guarded_actions_enabled =>
            {
                GuardrailDecision::Deny {
                    reason_code: "guarded_actions_disabled",
                    user_message:
                        "Sending customer communications is disabled for this deployment."
                            .to_string(),
                    fallback_path: "read_only_assistance",
                }
            }
            GuardrailIntent::GuardedPreview { .. } => GuardrailDecision::Allow,
            GuardrailIntent::GuardedCommit { preview_id, .. }
                if preview_id.as_deref().map_or(true, |id| id.trim().is_empty()) =>
            {
                GuardrailDecision::Deny {
                    reason_code: "commit_without_preview",
                    user_message:
                        "I cannot send without a preview. Generate a preview, show it to the user, and pass its preview_id once they confirm."
                            .to_string(),
                    fallback_path: "preview_then_confirm",
                }
            }
            GuardrailIntent::GuardedCommit { .. } => GuardrailDecision::Allow,
        }
    }
}
