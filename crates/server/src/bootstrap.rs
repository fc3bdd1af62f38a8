use std::sync::Arc;

use axum::Router;
use bondline_agent::guardrails::GuardrailPolicy;
use bondline_agent::llm::{HttpModelClient, ModelClient, ModelError};
use bondline_agent::runtime::AgentRuntime;
use bondline_agent::tools::builtin_tools;
use bondline_core::config::{AppConfig, ConfigError};
use bondline_core::domain::capability::CapabilityRegistry;
use bondline_core::gateway::http::HttpTransport;
use bondline_core::gateway::transport::CapabilityTransport;
use bondline_core::{ApprovalLimits, ApprovalProtocol, CapabilityGateway, GatewaySettings};
use thiserror::Error;
use tracing::info;

use crate::{health, invocations};

pub struct Application {
    pub config: AppConfig,
    pub registry: Arc<CapabilityRegistry>,
    pub agent_runtime: Arc<AgentRuntime>,
    pub model_configured: bool,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("capability http client could not be built: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("model client could not be built: {0}")]
    Model(#[source] ModelError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let settings = GatewaySettings::from(&config.gateway);
    let transport = HttpTransport::new(&settings).map_err(BootstrapError::HttpClient)?;
    let model = HttpModelClient::new(&config.llm).map_err(BootstrapError::Model)?;
    let model_configured = model.is_configured();

    Ok(assemble(config, Arc::new(transport), Arc::new(model), model_configured))
}

/// Wires registry, gateway, approval protocol, tools and runtime around the
/// given collaborators. Everything built here is shared read-only afterwards.
pub fn assemble(
    config: AppConfig,
    transport: Arc<dyn CapabilityTransport>,
    model: Arc<dyn ModelClient>,
    model_configured: bool,
) -> Application {
    let registry = Arc::new(CapabilityRegistry::from_endpoints(&config.capabilities));
    let settings = GatewaySettings::from(&config.gateway);
    let gateway = Arc::new(CapabilityGateway::new(registry.clone(), transport, settings.retry));
    let approvals =
        Arc::new(ApprovalProtocol::new(gateway.clone(), ApprovalLimits::from(&config.approval)));
    let tools = builtin_tools(gateway, approvals);

    let wired = registry.iter().filter(|descriptor| descriptor.endpoint.is_some()).count();
    info!(
        event_name = "system.bootstrap.capabilities_wired",
        correlation_id = "bootstrap",
        wired,
        registered = registry.len(),
        tools = tools.len(),
        model_configured,
        "capability registry initialized"
    );

    let agent_runtime = AgentRuntime::new(model, tools, GuardrailPolicy::default())
        .with_max_turns(config.llm.max_turns);

    Application { config, registry, agent_runtime: Arc::new(agent_runtime), model_configured }
}

impl Application {
    pub fn router(&self) -> Router {
        health::router(self.registry.clone(), self.model_configured)
            .merge(invocations::router(self.agent_runtime.clone()))
    }
}
