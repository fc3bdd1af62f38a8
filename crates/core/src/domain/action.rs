use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ErrorKind;

/// The guarded action: an outbound customer communication.
///
/// A pure value. Two requests with identical fields are indistinguishable.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionRequest {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl ActionRequest {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self { recipient: recipient.into(), subject: subject.into(), body: body.into() }
    }
}

/// Content fingerprint handed out at preview time. Never stored.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreviewToken(pub String);

impl PreviewToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, supplied: &str) -> bool {
        self.0 == supplied.trim()
    }
}

impl std::fmt::Display for PreviewToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    #[serde(rename = "previewToken")]
    pub token: PreviewToken,
    #[serde(rename = "echoedFields")]
    pub request: ActionRequest,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    #[serde(rename = "receiptRef")]
    pub artifact_key: String,
    pub recipient: String,
    pub committed_at: DateTime<Utc>,
    pub remote_correlation_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub kind: ErrorKind,
    pub field: Option<String>,
    pub reason: String,
}

impl Rejection {
    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Validation, field: Some(field.to_string()), reason: reason.into() }
    }

    pub fn token_mismatch() -> Self {
        Self {
            kind: ErrorKind::TokenMismatch,
            field: None,
            reason: "content changed since preview".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalOutcome {
    #[serde(rename = "PREVIEW")]
    Previewed(Preview),
    #[serde(rename = "SENT")]
    Committed(Receipt),
    Rejected(Rejection),
}

impl ApprovalOutcome {
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Previewed(_) => "PREVIEW",
            Self::Committed(_) => "SENT",
            Self::Rejected(_) => "REJECTED",
        }
    }
}
