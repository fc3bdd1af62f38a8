use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bondline_core::domain::capability::{names, EndpointRef};
use bondline_core::gateway::transport::{CapabilityTransport, RemoteResponse, TransportError};
use bondline_core::{
    ActionRequest, ApprovalLimits, ApprovalOutcome, ApprovalProtocol, CapabilityGateway,
    CapabilityRegistry, ErrorKind, RetryPolicy,
};
use serde_json::{json, Value};

#[derive(Default)]
struct RecordingStore {
    writes: Mutex<Vec<Value>>,
    fail_with: Mutex<Option<u16>>,
}

impl RecordingStore {
    fn writes(&self) -> Vec<Value> {
        self.writes.lock().expect("writes lock").clone()
    }
}

#[async_trait]
impl CapabilityTransport for RecordingStore {
    async fn send(
        &self,
        _endpoint: &EndpointRef,
        payload: &Value,
        _correlation_id: &str,
    ) -> Result<RemoteResponse, TransportError> {
        if let Some(status) = *self.fail_with.lock().expect("failure lock") {
            return Ok(RemoteResponse::new(status, json!({ "error": "bucket unavailable" })));
        }
        self.writes.lock().expect("writes lock").push(payload.clone());
        Ok(RemoteResponse::new(200, json!({ "key": payload["key"].clone() }))
            .with_remote_correlation_id("store-req-1"))
    }
}

fn protocol(store: Arc<RecordingStore>) -> ApprovalProtocol {
    let mut endpoints = BTreeMap::new();
    endpoints.insert(names::WRITE_FILE.to_string(), "http://files/write".to_string());
    let gateway = CapabilityGateway::new(
        Arc::new(CapabilityRegistry::from_endpoints(&endpoints)),
        store,
        RetryPolicy::no_delay(1),
    );
    ApprovalProtocol::new(Arc::new(gateway), ApprovalLimits::default())
}

fn preview_token(outcome: ApprovalOutcome) -> String {
    match outcome {
        ApprovalOutcome::Previewed(preview) => preview.token.as_str().to_string(),
        other => panic!("expected preview, got {other:?}"),
    }
}

#[tokio::test]
async fn preview_then_commit_sends_exactly_once() {
    let store = Arc::new(RecordingStore::default());
    let protocol = protocol(store.clone());
    let request = ActionRequest::new("a@b.com", "Offer", "Hello");

    let token = preview_token(protocol.preview(&request));
    assert!(store.writes().is_empty(), "preview must not write");

    let outcome = protocol.commit(&request, &token).await;
    let ApprovalOutcome::Committed(receipt) = outcome else {
        panic!("expected commit, got {outcome:?}");
    };

    let writes = store.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0]["key"], json!(receipt.artifact_key));
    assert!(receipt.artifact_key.starts_with("sent-emails/"));
    assert!(receipt.artifact_key.contains("_a@b.com_offer.txt"));
    assert_eq!(writes[0]["content_type"], json!("text/plain"));
    assert!(writes[0]["content"].as_str().is_some_and(|content| content.contains("Subject: Offer")));
    assert_eq!(receipt.recipient, "a@b.com");
    assert_eq!(receipt.remote_correlation_id.as_deref(), Some("store-req-1"));
}

#[tokio::test]
async fn edited_body_after_preview_is_a_token_mismatch() {
    let store = Arc::new(RecordingStore::default());
    let protocol = protocol(store.clone());

    let token = preview_token(protocol.preview(&ActionRequest::new("a@b.com", "Offer", "Hello")));
    let outcome = protocol.commit(&ActionRequest::new("a@b.com", "Offer", "Hello!"), &token).await;

    let rejection = outcome.rejection().expect("commit should be rejected");
    assert_eq!(rejection.kind, ErrorKind::TokenMismatch);
    assert_eq!(outcome.status(), "REJECTED");
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn stale_or_foreign_tokens_never_write() {
    let store = Arc::new(RecordingStore::default());
    let protocol = protocol(store.clone());
    let request = ActionRequest::new("a@b.com", "Offer", "Hello");

    let zeros = "0".repeat(64);
    for token in ["", "not-a-token", zeros.as_str()] {
        let outcome = protocol.commit(&request, token).await;
        assert_eq!(outcome.rejection().map(|r| r.kind), Some(ErrorKind::TokenMismatch));
    }
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn same_content_always_yields_the_same_token() {
    let protocol = protocol(Arc::new(RecordingStore::default()));
    let request = ActionRequest::new("a@b.com", "Offer", "Hello");
    assert_eq!(preview_token(protocol.preview(&request)), preview_token(protocol.preview(&request)));
}

#[tokio::test]
async fn preview_rejects_invalid_recipient_and_missing_fields() {
    let store = Arc::new(RecordingStore::default());
    let protocol = protocol(store.clone());

    let bad_recipient = protocol.preview(&ActionRequest::new("a@b", "Offer", "Hello"));
    let rejection = bad_recipient.rejection().expect("invalid recipient");
    assert_eq!(rejection.kind, ErrorKind::Validation);
    assert_eq!(rejection.field.as_deref(), Some("recipient"));

    let blank_subject = protocol.preview(&ActionRequest::new("a@b.com", "  ", "Hello"));
    assert_eq!(blank_subject.rejection().and_then(|r| r.field.as_deref()), Some("subject"));
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn oversized_content_is_a_validation_rejection_not_a_mismatch() {
    let store = Arc::new(RecordingStore::default());
    let protocol = protocol(store.clone());

    let long_subject = ActionRequest::new("a@b.com", "s".repeat(201), "Hello");
    let token = preview_token(protocol.preview(&long_subject));
    let outcome = protocol.commit(&long_subject, &token).await;
    let rejection = outcome.rejection().expect("subject over bound");
    assert_eq!(rejection.kind, ErrorKind::Validation);
    assert_eq!(rejection.field.as_deref(), Some("subject"));

    let long_body = ActionRequest::new("a@b.com", "Offer", "b".repeat(10_001));
    let token = preview_token(protocol.preview(&long_body));
    let outcome = protocol.commit(&long_body, &token).await;
    assert_eq!(outcome.rejection().and_then(|r| r.field.as_deref()), Some("body"));

    let at_bound = ActionRequest::new("a@b.com", "s".repeat(200), "b".repeat(10_000));
    let token = preview_token(protocol.preview(&at_bound));
    assert!(matches!(protocol.commit(&at_bound, &token).await, ApprovalOutcome::Committed(_)));

    assert_eq!(store.writes().len(), 1);
}

#[tokio::test]
async fn concurrent_commits_of_identical_content_write_distinct_artifacts() {
    let store = Arc::new(RecordingStore::default());
    let protocol = protocol(store.clone());
    let request = ActionRequest::new("a@b.com", "Offer", "Hello");
    let token = preview_token(protocol.preview(&request));

    let (left, right) = tokio::join!(protocol.commit(&request, &token), protocol.commit(&request, &token));

    let (ApprovalOutcome::Committed(left), ApprovalOutcome::Committed(right)) = (left, right) else {
        panic!("both commits should succeed");
    };
    assert_ne!(left.artifact_key, right.artifact_key);
    assert_eq!(store.writes().len(), 2);
}

#[tokio::test]
async fn failed_write_is_reported_and_can_be_retried_with_a_fresh_preview() {
    let store = Arc::new(RecordingStore::default());
    *store.fail_with.lock().expect("failure lock") = Some(503);
    let protocol = protocol(store.clone());
    let request = ActionRequest::new("a@b.com", "Offer", "Hello");

    let token = preview_token(protocol.preview(&request));
    let outcome = protocol.commit(&request, &token).await;
    let rejection = outcome.rejection().expect("write failure");
    assert_eq!(rejection.kind, ErrorKind::Remote);
    assert!(rejection.reason.contains("bucket unavailable"));

    *store.fail_with.lock().expect("failure lock") = None;
    let token = preview_token(protocol.preview(&request));
    assert!(matches!(protocol.commit(&request, &token).await, ApprovalOutcome::Committed(_)));
    assert_eq!(store.writes().len(), 1);
}
