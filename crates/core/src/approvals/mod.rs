//! Two-phase approval for irreversible customer communications.
//!
//! `preview` validates the request and returns a content fingerprint. `commit`
//! recomputes the fingerprint over the fields it is given and only writes when
//! the caller's token matches. Nothing is stored between the two calls.

pub mod artifact;

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::ApprovalConfig;
use crate::domain::action::{ActionRequest, ApprovalOutcome, Preview, PreviewToken, Receipt, Rejection};
use crate::domain::capability::names;
use crate::domain::invocation::new_correlation_id;
use crate::errors::ErrorKind;
use crate::gateway::CapabilityGateway;
use artifact::SentArtifact;

pub const DEFAULT_MAX_SUBJECT_CHARS: usize = 200;
pub const DEFAULT_MAX_BODY_CHARS: usize = 10_000;
pub const DEFAULT_ARTIFACT_PREFIX: &str = "sent-emails";

const RECIPIENT_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

/// SHA-256 over the length-prefixed (recipient, subject, body) tuple.
pub fn fingerprint(request: &ActionRequest) -> PreviewToken {
    let mut hasher = Sha256::new();
    for field in [&request.recipient, &request.subject, &request.body] {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    PreviewToken(format!("{:x}", hasher.finalize()))
}

pub fn recipient_is_valid(recipient: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(RECIPIENT_PATTERN).ok())
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(recipient))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalLimits {
    pub max_subject_chars: usize,
    pub max_body_chars: usize,
    pub artifact_prefix: String,
}

impl Default for ApprovalLimits {
    fn default() -> Self {
        Self {
            max_subject_chars: DEFAULT_MAX_SUBJECT_CHARS,
            max_body_chars: DEFAULT_MAX_BODY_CHARS,
            artifact_prefix: DEFAULT_ARTIFACT_PREFIX.to_string(),
        }
    }
}

impl From<&ApprovalConfig> for ApprovalLimits {
    fn from(config: &ApprovalConfig) -> Self {
        Self {
            max_subject_chars: config.max_subject_chars,
            max_body_chars: config.max_body_chars,
            artifact_prefix: config.artifact_prefix.clone(),
        }
    }
}

pub struct ApprovalProtocol {
    gateway: Arc<CapabilityGateway>,
    limits: ApprovalLimits,
}

impl ApprovalProtocol {
    pub fn new(gateway: Arc<CapabilityGateway>, limits: ApprovalLimits) -> Self {
        Self { gateway, limits }
    }

    pub fn limits(&self) -> &ApprovalLimits {
        &self.limits
    }

    /// Never writes. The returned token is a pure function of the content.
    pub fn preview(&self, request: &ActionRequest) -> ApprovalOutcome {
        if let Err(rejection) = validate_fields(request) {
            return rejected("approval.preview.rejected", request, rejection);
        }

        let token = fingerprint(request);
        info!(
            event_name = "approval.preview.issued",
            recipient = %request.recipient,
            preview_id = %token,
            "preview issued for guarded communication"
        );
        ApprovalOutcome::Previewed(Preview { token, request: request.clone() })
    }

    /// Writes exactly once when `supplied_token` matches the content supplied now.
    pub async fn commit(&self, request: &ActionRequest, supplied_token: &str) -> ApprovalOutcome {
        let expected = fingerprint(request);
        if !expected.matches(supplied_token) {
            return rejected("approval.commit.rejected", request, Rejection::token_mismatch());
        }

        if let Err(rejection) = validate_fields(request).and_then(|()| self.validate_size(request)) {
            return rejected("approval.commit.rejected", request, rejection);
        }

        let committed_at = Utc::now();
        let artifact = SentArtifact::render(request, committed_at, &self.limits.artifact_prefix);
        let correlation_id = new_correlation_id();
        let result = self
            .gateway
            .invoke_correlated(
                names::WRITE_FILE,
                json!({
                    "key": artifact.key,
                    "content": artifact.content,
                    "content_type": "text/plain",
                }),
                correlation_id,
            )
            .await;

        if !result.succeeded {
            let kind = result.error_kind.unwrap_or(ErrorKind::Remote);
            let rejection = Rejection {
                kind,
                field: None,
                reason: format!(
                    "message could not be sent ({kind}): {}; preview and confirm again to retry",
                    result.error_message()
                ),
            };
            return rejected("approval.commit.rejected", request, rejection);
        }

        info!(
            event_name = "approval.commit.sent",
            correlation_id = %result.correlation_id,
            recipient = %request.recipient,
            artifact_key = %artifact.key,
            "guarded communication committed"
        );
        ApprovalOutcome::Committed(Receipt {
            artifact_key: artifact.key,
            recipient: request.recipient.clone(),
            committed_at,
            remote_correlation_id: result.remote_correlation_id,
        })
    }

    fn validate_size(&self, request: &ActionRequest) -> Result<(), Rejection> {
        let subject_chars = request.subject.chars().count();
        if subject_chars > self.limits.max_subject_chars {
            return Err(Rejection::validation(
                "subject",
                format!(
                    "subject is {subject_chars} characters; the maximum is {}",
                    self.limits.max_subject_chars
                ),
            ));
        }

        let body_chars = request.body.chars().count();
        if body_chars > self.limits.max_body_chars {
            return Err(Rejection::validation(
                "body",
                format!(
                    "body is {body_chars} characters; the maximum is {}",
                    self.limits.max_body_chars
                ),
            ));
        }

        Ok(())
    }
}

fn validate_fields(request: &ActionRequest) -> Result<(), Rejection> {
    for (field, value) in
        [("recipient", &request.recipient), ("subject", &request.subject), ("body", &request.body)]
    {
        if value.trim().is_empty() {
            return Err(Rejection::validation(field, format!("{field} is required")));
        }
    }

    if !recipient_is_valid(&request.recipient) {
        return Err(Rejection::validation(
            "recipient",
            format!("`{}` is not a valid email address", request.recipient),
        ));
    }

    Ok(())
}

fn rejected(event_name: &'static str, request: &ActionRequest, rejection: Rejection) -> ApprovalOutcome {
    warn!(
        event_name,
        recipient = %request.recipient,
        error_kind = rejection.kind.as_str(),
        field = rejection.field.as_deref().unwrap_or("none"),
        reason = %rejection.reason,
        "guarded communication rejected"
    );
    ApprovalOutcome::Rejected(rejection)
}

#[cfg(test)]
mod tests {
    use super::{fingerprint, recipient_is_valid};
    use crate::domain::action::ActionRequest;

    #[test]
    fn fingerprint_is_deterministic() {
        let request = ActionRequest::new("a@b.com", "Offer", "Hello");
        assert_eq!(fingerprint(&request), fingerprint(&request.clone()));
        assert_eq!(fingerprint(&request).as_str().len(), 64);
    }

    #[test]
    fn fingerprint_changes_with_each_field() {
        let base = ActionRequest::new("a@b.com", "Offer", "Hello");
        let variants = [
            ActionRequest::new("c@b.com", "Offer", "Hello"),
            ActionRequest::new("a@b.com", "Offer!", "Hello"),
            ActionRequest::new("a@b.com", "Offer", "Hello!"),
        ];

        for variant in variants {
            assert_ne!(fingerprint(&base), fingerprint(&variant), "{variant:?}");
        }
    }

    #[test]
    fn fingerprint_does_not_confuse_field_boundaries() {
        let left = ActionRequest::new("a@b.com", "ab", "c");
        let right = ActionRequest::new("a@b.com", "a", "bc");
        assert_ne!(fingerprint(&left), fingerprint(&right));
    }

    #[test]
    fn recipient_grammar() {
        assert!(recipient_is_valid("a@b.com"));
        assert!(recipient_is_valid("jane.doe+bonds@bank-x.co.uk"));
        assert!(!recipient_is_valid("a@b"));
        assert!(!recipient_is_valid("not an email"));
        assert!(!recipient_is_valid("a@b.com\nBcc: x@y.com"));
    }
}
