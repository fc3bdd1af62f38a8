use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use bondline_core::domain::capability::{CapabilityRegistry, IdempotencyClass};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    registry: Arc<CapabilityRegistry>,
    model_configured: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CapabilityCheck {
    pub name: String,
    pub wired: bool,
    pub idempotency: IdempotencyClass,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub model: HealthCheck,
    pub capabilities: Vec<CapabilityCheck>,
    pub checked_at: String,
}

pub fn router(registry: Arc<CapabilityRegistry>, model_configured: bool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { registry, model_configured })
}

/// Ready only when the model endpoint and every capability are wired.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let capabilities: Vec<CapabilityCheck> = state
        .registry
        .iter()
        .map(|descriptor| CapabilityCheck {
            name: descriptor.name.clone(),
            wired: descriptor.endpoint.is_some(),
            idempotency: descriptor.idempotency,
        })
        .collect();
    let unwired: Vec<&str> =
        capabilities.iter().filter(|check| !check.wired).map(|check| check.name.as_str()).collect();

    let model = if state.model_configured {
        HealthCheck { status: "ready", detail: "model endpoint configured".to_string() }
    } else {
        HealthCheck { status: "degraded", detail: "llm.base_url is not set".to_string() }
    };
    let ready = unwired.is_empty() && state.model_configured;

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: if unwired.is_empty() { "ready" } else { "degraded" },
            detail: if unwired.is_empty() {
                "all capabilities wired".to_string()
            } else {
                format!("unwired capabilities: {}", unwired.join(", "))
            },
        },
        model,
        capabilities,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}
