use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::capability::CapabilityDescriptor;
use crate::errors::ErrorKind;

pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// One call in flight. Lives only on the gateway's call stack.
#[derive(Clone, Debug)]
pub struct InvocationRequest<'a> {
    pub capability: &'a CapabilityDescriptor,
    pub payload: Value,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub succeeded: bool,
    pub capability: String,
    pub status_code: Option<u16>,
    pub data: Option<Value>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub correlation_id: String,
    pub remote_correlation_id: Option<String>,
    pub duration_ms: u64,
    pub attempts: u32,
}

impl InvocationResult {
    pub fn success(
        capability: &str,
        status_code: u16,
        data: Value,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            succeeded: true,
            capability: capability.to_string(),
            status_code: Some(status_code),
            data: Some(data),
            error_kind: None,
            error_message: None,
            correlation_id: correlation_id.into(),
            remote_correlation_id: None,
            duration_ms: 0,
            attempts: 1,
        }
    }

    pub fn failure(
        capability: &str,
        kind: ErrorKind,
        message: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            succeeded: false,
            capability: capability.to_string(),
            status_code: None,
            data: None,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            correlation_id: correlation_id.into(),
            remote_correlation_id: None,
            duration_ms: 0,
            attempts: 0,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_remote_correlation_id(mut self, remote_correlation_id: Option<String>) -> Self {
        self.remote_correlation_id = remote_correlation_id;
        self
    }

    pub fn with_timing(mut self, duration_ms: u64, attempts: u32) -> Self {
        self.duration_ms = duration_ms;
        self.attempts = attempts;
        self
    }

    pub fn error_message(&self) -> &str {
        self.error_message.as_deref().unwrap_or("")
    }

    pub fn data_field(&self, key: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|data| data.get(key))
    }
}
