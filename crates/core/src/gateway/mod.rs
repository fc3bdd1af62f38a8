//! Remote capability gateway.
//!
//! Every out-of-process read or write goes through [`CapabilityGateway::invoke`]:
//! local schema validation, endpoint resolution, bounded retries for transport
//! failures only, and outcome classification into an [`InvocationResult`].

pub mod http;
pub mod transport;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::domain::capability::CapabilityRegistry;
use crate::domain::invocation::{new_correlation_id, InvocationRequest, InvocationResult};
use crate::errors::ErrorKind;
use transport::{CapabilityTransport, RemoteResponse};

const SUCCESS_STATUS: u16 = 200;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 100, max_delay_ms: 2_000 }
    }
}

impl RetryPolicy {
    pub fn no_delay(max_attempts: u32) -> Self {
        Self { max_attempts, base_delay_ms: 0, max_delay_ms: 0 }
    }

    fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewaySettings {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub retry: RetryPolicy,
}

impl From<&GatewayConfig> for GatewaySettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                base_delay_ms: config.base_backoff_ms,
                max_delay_ms: config.max_backoff_ms,
            },
        }
    }
}

pub struct CapabilityGateway {
    registry: Arc<CapabilityRegistry>,
    transport: Arc<dyn CapabilityTransport>,
    retry: RetryPolicy,
}

impl CapabilityGateway {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        transport: Arc<dyn CapabilityTransport>,
        retry: RetryPolicy,
    ) -> Self {
        Self { registry, transport, retry }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub async fn invoke(&self, capability: &str, payload: Value) -> InvocationResult {
        self.invoke_correlated(capability, payload, new_correlation_id()).await
    }

    /// Issues a fresh remote call; identical concurrent calls are not coalesced.
    pub async fn invoke_correlated(
        &self,
        capability: &str,
        payload: Value,
        correlation_id: impl Into<String>,
    ) -> InvocationResult {
        let correlation_id = correlation_id.into();
        let started = Instant::now();

        let Some(descriptor) = self.registry.get(capability) else {
            return self.reject_locally(
                capability,
                ErrorKind::Configuration,
                format!("capability `{capability}` is not registered"),
                correlation_id,
            );
        };

        if let Err(violation) = descriptor.input_schema.validate(&payload) {
            return self.reject_locally(
                capability,
                ErrorKind::Validation,
                format!("invalid payload for `{capability}`: {violation}"),
                correlation_id,
            );
        }

        let Some(endpoint) = descriptor.endpoint.as_ref() else {
            return self.reject_locally(
                capability,
                ErrorKind::Configuration,
                format!("capability `{capability}` has no endpoint configured"),
                correlation_id,
            );
        };

        let request = InvocationRequest { capability: descriptor, payload, correlation_id };
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.transport.send(endpoint, &request.payload, &request.correlation_id).await {
                Ok(response) => return classify(&request, response, started, attempt),
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.backoff(attempt - 1);
                    debug!(
                        event_name = "gateway.invoke.retry",
                        correlation_id = %request.correlation_id,
                        capability = %request.capability.name,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "retrying capability call after transport failure"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(error) => {
                    let duration_ms = elapsed_ms(started);
                    warn!(
                        event_name = "gateway.invoke.failure",
                        correlation_id = %request.correlation_id,
                        capability = %request.capability.name,
                        error_kind = ErrorKind::Transport.as_str(),
                        attempts = attempt,
                        duration_ms,
                        error = %error,
                        "capability call failed in transport"
                    );
                    return InvocationResult::failure(
                        capability,
                        ErrorKind::Transport,
                        error.to_string(),
                        request.correlation_id,
                    )
                    .with_timing(duration_ms, attempt);
                }
            }
        }
    }

    fn reject_locally(
        &self,
        capability: &str,
        kind: ErrorKind,
        message: String,
        correlation_id: String,
    ) -> InvocationResult {
        warn!(
            event_name = "gateway.invoke.failure",
            correlation_id = %correlation_id,
            capability,
            error_kind = kind.as_str(),
            attempts = 0,
            error = %message,
            "capability call rejected before any remote attempt"
        );
        InvocationResult::failure(capability, kind, message, correlation_id)
    }
}

fn classify(
    request: &InvocationRequest<'_>,
    response: RemoteResponse,
    started: Instant,
    attempts: u32,
) -> InvocationResult {
    let duration_ms = elapsed_ms(started);
    let capability = request.capability.name.as_str();

    if response.status_code == SUCCESS_STATUS {
        info!(
            event_name = "gateway.invoke.success",
            correlation_id = %request.correlation_id,
            capability,
            remote_correlation_id = response.remote_correlation_id.as_deref().unwrap_or("unknown"),
            duration_ms,
            attempts,
            "capability call succeeded"
        );
        return InvocationResult::success(
            capability,
            response.status_code,
            response.body,
            request.correlation_id.clone(),
        )
        .with_remote_correlation_id(response.remote_correlation_id)
        .with_timing(duration_ms, attempts);
    }

    let message = response.error_message();
    warn!(
        event_name = "gateway.invoke.failure",
        correlation_id = %request.correlation_id,
        capability,
        error_kind = ErrorKind::Remote.as_str(),
        status_code = response.status_code,
        remote_correlation_id = response.remote_correlation_id.as_deref().unwrap_or("unknown"),
        attempts,
        duration_ms,
        error = %message,
        "capability reported an application failure"
    );
    InvocationResult::failure(capability, ErrorKind::Remote, message, request.correlation_id.clone())
        .with_status(response.status_code)
        .with_remote_correlation_id(response.remote_correlation_id)
        .with_timing(duration_ms, attempts)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
