use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::capability::EndpointRef;

#[derive(Clone, Debug, PartialEq)]
pub struct RemoteResponse {
    pub status_code: u16,
    pub body: Value,
    pub remote_correlation_id: Option<String>,
}

impl RemoteResponse {
    pub fn new(status_code: u16, body: Value) -> Self {
        Self { status_code, body, remote_correlation_id: None }
    }

    pub fn with_remote_correlation_id(mut self, remote_correlation_id: impl Into<String>) -> Self {
        self.remote_correlation_id = Some(remote_correlation_id.into());
        self
    }

    /// Human readable cause for a non-200 response.
    pub fn error_message(&self) -> String {
        ["error", "message"]
            .iter()
            .find_map(|key| self.body.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| format!("remote capability returned status {}", self.status_code))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("remote call timed out: {0}")]
    Timeout(String),
    #[error("remote connection failed: {0}")]
    Connect(String),
    #[error("remote response could not be decoded: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connect(_))
    }
}

#[async_trait]
pub trait CapabilityTransport: Send + Sync {
    async fn send(
        &self,
        endpoint: &EndpointRef,
        payload: &Value,
        correlation_id: &str,
    ) -> Result<RemoteResponse, TransportError>;
}

/// Decodes the `{statusCode, body}` envelope. `body` may be an object or a
/// JSON document encoded as a string.
pub fn decode_envelope(
    raw: Value,
    header_correlation_id: Option<String>,
) -> Result<RemoteResponse, TransportError> {
    let Value::Object(mut envelope) = raw else {
        return Err(TransportError::Decode("envelope is not a JSON object".to_string()));
    };

    let status_code = envelope
        .get("statusCode")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .ok_or_else(|| TransportError::Decode("envelope has no valid statusCode".to_string()))?;

    let body = match envelope.remove("body") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(Value::String(encoded)) if encoded.trim().is_empty() => Value::Object(Map::new()),
        Some(Value::String(encoded)) => serde_json::from_str(&encoded)
            .map_err(|error| TransportError::Decode(format!("body is not valid JSON: {error}")))?,
        Some(body) => body,
    };

    let remote_correlation_id = body
        .get("requestId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or(header_correlation_id);

    Ok(RemoteResponse { status_code, body, remote_correlation_id })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{decode_envelope, RemoteResponse, TransportError};

    #[test]
    fn decodes_string_encoded_body() {
        let response = decode_envelope(
            json!({ "statusCode": 200, "body": "{\"customers\":[],\"requestId\":\"r-1\"}" }),
            None,
        )
        .expect("envelope should decode");

        assert_eq!(response.status_code, 200);
        assert_eq!(response.body["customers"], json!([]));
        assert_eq!(response.remote_correlation_id.as_deref(), Some("r-1"));
    }

    #[test]
    fn header_correlation_id_is_a_fallback() {
        let response =
            decode_envelope(json!({ "statusCode": 404, "body": { "error": "nope" } }), Some("h-1".into()))
                .expect("envelope should decode");

        assert_eq!(response.remote_correlation_id.as_deref(), Some("h-1"));
        assert_eq!(response.error_message(), "nope");
    }

    #[test]
    fn missing_status_code_is_a_decode_error() {
        let error = decode_envelope(json!({ "body": {} }), None).expect_err("should fail");
        assert!(matches!(error, TransportError::Decode(_)));
        assert!(!error.is_retryable());
    }

    #[test]
    fn error_message_prefers_error_then_message_then_status() {
        assert_eq!(RemoteResponse::new(500, json!({ "message": "m" })).error_message(), "m");
        assert_eq!(
            RemoteResponse::new(500, json!({ "error": "e", "message": "m" })).error_message(),
            "e"
        );
        assert_eq!(
            RemoteResponse::new(503, json!({})).error_message(),
            "remote capability returned status 503"
        );
    }

    #[test]
    fn only_timeouts_and_connection_failures_are_retryable() {
        assert!(TransportError::Timeout("t".into()).is_retryable());
        assert!(TransportError::Connect("reset".into()).is_retryable());
        assert!(!TransportError::Decode("bad".into()).is_retryable());
    }
}
