use std::collections::BTreeMap;
use std::sync::Arc;

use bondline_core::config::{AppConfig, LoadOptions};
use bondline_core::domain::action::{ActionRequest, ApprovalOutcome};
use bondline_core::domain::capability::CapabilityRegistry;
use bondline_core::gateway::http::HttpTransport;
use bondline_core::{ApprovalLimits, ApprovalProtocol, CapabilityGateway, GatewaySettings};
use serde_json::json;

use super::CommandResult;

/// Runs the preview phase only. No capability endpoint is wired, so nothing
/// can be written even by mistake.
pub fn run(recipient: &str, subject: &str, body: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("preview", "config_validation", error.to_string(), 2)
        }
    };

    let settings = GatewaySettings::from(&config.gateway);
    let transport = match HttpTransport::new(&settings) {
        Ok(transport) => transport,
        Err(error) => {
            return CommandResult::failure("preview", "transport_setup", error.to_string(), 1)
        }
    };
    let registry = Arc::new(CapabilityRegistry::from_endpoints(&BTreeMap::new()));
    let gateway = Arc::new(CapabilityGateway::new(registry, Arc::new(transport), settings.retry));
    let protocol = ApprovalProtocol::new(gateway, ApprovalLimits::from(&config.approval));

    let request = ActionRequest::new(recipient, subject, body);
    match protocol.preview(&request) {
        ApprovalOutcome::Previewed(preview) => CommandResult::success_with_data(
            "preview",
            "preview generated; nothing was sent",
            json!({
                "preview_id": preview.token,
                "recipient": preview.request.recipient,
                "subject": preview.request.subject,
                "body_chars": preview.request.body.chars().count(),
            }),
        ),
        ApprovalOutcome::Rejected(rejection) => {
            let message = match &rejection.field {
                Some(field) => format!("{field}: {}", rejection.reason),
                None => rejection.reason.clone(),
            };
            CommandResult::failure("preview", rejection.kind.as_str(), message, 2)
        }
        ApprovalOutcome::Committed(_) => {
            CommandResult::failure("preview", "internal", "preview unexpectedly committed", 1)
        }
    }
}
