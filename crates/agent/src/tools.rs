use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bondline_core::approvals::artifact::{parse_key, SentSummary};
use bondline_core::domain::action::{ActionRequest, ApprovalOutcome, Rejection};
use bondline_core::domain::capability::{names, FieldKind, FieldSpec, InputSchema};
use bondline_core::{ApprovalProtocol, CapabilityGateway, ErrorKind, InvocationResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::guardrails::GuardrailIntent;
use crate::llm::ToolSpec;

pub const LIST_CUSTOMERS: &str = "customer_list_customers";
pub const GET_CUSTOMER_PROFILE: &str = "customer_get_profile";
pub const LIST_BONDS: &str = "product_list_bonds";
pub const GET_PRODUCT_DETAILS: &str = "product_get_details";
pub const SEARCH_MARKET: &str = "product_search_market";
pub const SEND_EMAIL: &str = "marketing_send_email";
pub const GET_RECENT_EMAILS: &str = "marketing_get_recent_emails";
pub const GET_BOND_RECOMMENDATIONS: &str = "recommendation_get_bond_recommendations";
pub const FIND_MOST_SELLABLE_BOND: &str = "recommendation_find_most_sellable_bond";

pub const DEFAULT_RECENT_EMAILS: i64 = 10;
pub const MAX_RECENT_EMAILS: i64 = 100;

const UNRANKED_SELLABILITY: i64 = 999;

/// What the model sees after a tool call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    pub content: String,
    pub error_kind: Option<ErrorKind>,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self { content: content.into(), error_kind: None }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { content: message.into(), error_kind: Some(kind) }
    }

    pub fn is_error(&self) -> bool {
        self.error_kind.is_some()
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> InputSchema;

    fn guard_intent(&self, _input: &Value) -> GuardrailIntent {
        GuardrailIntent::Read { tool: self.name().to_string() }
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema().to_json_schema(),
            })
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

pub fn builtin_tools(gateway: Arc<CapabilityGateway>, approvals: Arc<ApprovalProtocol>) -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    registry.register(CapabilityTool::new(
        gateway.clone(),
        LIST_CUSTOMERS,
        "List all customers with id, name and email.",
        names::LIST_CUSTOMERS,
        "customers",
    ));
    registry.register(
        CapabilityTool::new(
            gateway.clone(),
            GET_CUSTOMER_PROFILE,
            "Get the full profile for one customer by id (e.g. CUST-001): portfolio, preferences, risk tolerance.",
            names::GET_CUSTOMER,
            "customer",
        )
        .with_not_found_field("customer_id"),
    );
    registry.register(CapabilityTool::new(
        gateway.clone(),
        LIST_BONDS,
        "List the available bond products.",
        names::LIST_BONDS,
        "bonds",
    ));
    registry.register(
        CapabilityTool::new(
            gateway.clone(),
            GET_PRODUCT_DETAILS,
            "Get detailed information about one bond product.",
            names::GET_PRODUCT,
            "product",
        )
        .with_not_found_field("product_name"),
    );
    registry.register(CapabilityTool::new(
        gateway.clone(),
        SEARCH_MARKET,
        "Search market data and trends for a product type.",
        names::SEARCH_MARKET,
        "marketData",
    ));
    registry.register(BondRecommendationsTool::new(gateway.clone()));
    registry.register(MostSellableBondTool::new(gateway.clone()));
    registry.register(RecentEmailsTool::new(gateway, approvals.limits().artifact_prefix.clone()));
    registry.register(SendEmailTool::new(approvals));
    registry
}

/// Read tool that forwards its input to one capability and returns one field
/// of the result.
pub struct CapabilityTool {
    gateway: Arc<CapabilityGateway>,
    name: &'static str,
    description: &'static str,
    capability: &'static str,
    result_key: &'static str,
    not_found_field: Option<&'static str>,
}

impl CapabilityTool {
    pub fn new(
        gateway: Arc<CapabilityGateway>,
        name: &'static str,
        description: &'static str,
        capability: &'static str,
        result_key: &'static str,
    ) -> Self {
        Self { gateway, name, description, capability, result_key, not_found_field: None }
    }

    /// A remote 404 becomes `NotFound` naming the value of this input field.
    pub fn with_not_found_field(mut self, field: &'static str) -> Self {
        self.not_found_field = Some(field);
        self
    }

    fn not_found(&self, input: &Value, result: &InvocationResult) -> Option<ToolOutput> {
        let field = self.not_found_field?;
        if result.status_code != Some(404) {
            return None;
        }
        let id = input.get(field).and_then(Value::as_str).unwrap_or("unknown");
        Some(not_found_output(id, result))
    }
}

#[async_trait]
impl Tool for CapabilityTool {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn input_schema(&self) -> InputSchema {
        self.gateway
            .registry()
            .get(self.capability)
            .map(|descriptor| descriptor.input_schema.clone())
            .unwrap_or_default()
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput> {
        let result = self.gateway.invoke(self.capability, input.clone()).await;
        if !result.succeeded {
            if let Some(output) = self.not_found(&input, &result) {
                return Ok(output);
            }
            return Ok(failure_output(&result));
        }

        let data = result.data_field(self.result_key).cloned().unwrap_or(Value::Null);
        let rendered = serde_json::to_string_pretty(&data)
            .with_context(|| format!("rendering `{}` from {}", self.result_key, self.capability))?;
        Ok(ToolOutput::ok(rendered))
    }
}

fn not_found_output(id: &str, result: &InvocationResult) -> ToolOutput {
    ToolOutput::failed(
        ErrorKind::NotFound,
        format!("Error: {id} was not found ({})", result.error_message()),
    )
}

fn failure_output(result: &InvocationResult) -> ToolOutput {
    let kind = result.error_kind.unwrap_or(ErrorKind::Remote);
    ToolOutput::failed(kind, format!("Error: {}", result.error_message()))
}

#[derive(Debug, Deserialize)]
struct SendEmailInput {
    customer_email: String,
    subject: String,
    body: String,
    #[serde(default)]
    approved: Option<bool>,
    #[serde(default)]
    preview_id: Option<String>,
}

/// The guarded communication. `approved=false` previews, `approved=true` commits.
pub struct SendEmailTool {
    approvals: Arc<ApprovalProtocol>,
}

impl SendEmailTool {
    pub fn new(approvals: Arc<ApprovalProtocol>) -> Self {
        Self { approvals }
    }
}

#[async_trait]
impl Tool for SendEmailTool {
    fn name(&self) -> &'static str {
        SEND_EMAIL
    }

    fn description(&self) -> &'static str {
        "Send an email to a customer in two steps: call with approved=false to get a preview and preview_id, show it to the user, then call again with identical content, approved=true and that preview_id once the user confirms."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new(vec![
            FieldSpec::required("customer_email", FieldKind::String, "recipient email address"),
            FieldSpec::required("subject", FieldKind::String, "subject line"),
            FieldSpec::required("body", FieldKind::String, "plain-text body"),
            FieldSpec::optional(
                "approved",
                FieldKind::Boolean,
                "true only after the user confirmed the preview",
            ),
            FieldSpec::optional("preview_id", FieldKind::String, "preview id from the preview call"),
        ])
    }

    fn guard_intent(&self, input: &Value) -> GuardrailIntent {
        let approved = input.get("approved").and_then(Value::as_bool).unwrap_or(false);
        if approved {
            GuardrailIntent::GuardedCommit {
                tool: SEND_EMAIL.to_string(),
                preview_id: input.get("preview_id").and_then(Value::as_str).map(str::to_string),
            }
        } else {
            GuardrailIntent::GuardedPreview { tool: SEND_EMAIL.to_string() }
        }
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput> {
        let input: SendEmailInput =
            serde_json::from_value(input).context("decoding marketing_send_email input")?;
        let request = ActionRequest::new(input.customer_email, input.subject, input.body);

        let outcome = if input.approved.unwrap_or(false) {
            self.approvals.commit(&request, input.preview_id.as_deref().unwrap_or_default()).await
        } else {
            self.approvals.preview(&request)
        };

        Ok(match outcome {
            ApprovalOutcome::Previewed(preview) => ToolOutput::ok(format!(
                "EMAIL PREVIEW GENERATED (Preview ID: {token})\n\nTo: {to}\nSubject: {subject}\n\n{body}\n\n---\nPREVIEW ID: {token}\n\nReview this email carefully. Reply \"send\" to confirm or \"cancel\" to discard.",
                token = preview.token,
                to = preview.request.recipient,
                subject = preview.request.subject,
                body = preview.request.body,
            )),
            ApprovalOutcome::Committed(receipt) => {
                let mut message = format!(
                    "Email sent successfully to {}. Reference: {}",
                    receipt.recipient, receipt.artifact_key
                );
                if let Some(request_id) = receipt.remote_correlation_id {
                    message.push_str(&format!("\nRequest ID: {request_id}"));
                }
                ToolOutput::ok(message)
            }
            ApprovalOutcome::Rejected(rejection) => rejection_output(&rejection),
        })
    }
}

fn rejection_output(rejection: &Rejection) -> ToolOutput {
    let message = match (rejection.kind, rejection.field.as_deref()) {
        (ErrorKind::TokenMismatch, _) => format!(
            "Failed to send email: {}. Generate a new preview and ask the user to confirm it.",
            rejection.reason
        ),
        (_, Some(field)) => format!("Failed to send email: {field}: {}", rejection.reason),
        (_, None) => format!("Failed to send email: {}", rejection.reason),
    };
    ToolOutput::failed(rejection.kind, message)
}

/// Lists committed communications, newest first, from the artifact keys alone.
pub struct RecentEmailsTool {
    gateway: Arc<CapabilityGateway>,
    artifact_prefix: String,
}

impl RecentEmailsTool {
    pub fn new(gateway: Arc<CapabilityGateway>, artifact_prefix: String) -> Self {
        Self { gateway, artifact_prefix }
    }
}

#[async_trait]
impl Tool for RecentEmailsTool {
    fn name(&self) -> &'static str {
        GET_RECENT_EMAILS
    }

    fn description(&self) -> &'static str {
        "Get timestamp, recipient and subject of the most recently sent emails."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new(vec![FieldSpec::optional(
            "limit",
            FieldKind::Integer,
            "maximum number of emails to return (default 10, at most 100)",
        )])
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput> {
        let limit = input
            .get("limit")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_RECENT_EMAILS)
            .clamp(1, MAX_RECENT_EMAILS);

        let result = self
            .gateway
            .invoke(names::LIST_FILES, json!({ "directory": self.artifact_prefix }))
            .await;
        if !result.succeeded {
            return Ok(failure_output(&result));
        }

        let listed = result.data_field("files").or_else(|| result.data_field("keys"));
        let mut emails: Vec<SentSummary> = listed
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(entry_key).filter_map(parse_key).collect())
            .unwrap_or_default();
        if emails.is_empty() {
            return Ok(ToolOutput::ok("No sent emails found"));
        }

        emails.sort_by(|left, right| right.sent_at.cmp(&left.sent_at));
        emails.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

        let rendered: Vec<Value> = emails
            .iter()
            .map(|email| {
                json!({
                    "timestamp": email.sent_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    "recipient": email.recipient,
                    "subject": email.subject,
                })
            })
            .collect();
        let rendered =
            serde_json::to_string_pretty(&rendered).context("rendering recent emails")?;
        Ok(ToolOutput::ok(rendered))
    }
}

/// Customer profile plus the full bond list, for the model to match.
pub struct BondRecommendationsTool {
    gateway: Arc<CapabilityGateway>,
}

impl BondRecommendationsTool {
    pub fn new(gateway: Arc<CapabilityGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for BondRecommendationsTool {
    fn name(&self) -> &'static str {
        GET_BOND_RECOMMENDATIONS
    }

    fn description(&self) -> &'static str {
        "Fetch one customer's profile together with every available bond so suitable bonds can be recommended for that customer."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new(vec![FieldSpec::required(
            "customer_id",
            FieldKind::String,
            "customer id, e.g. CUST-001",
        )])
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput> {
        let customer_id =
            input.get("customer_id").and_then(Value::as_str).unwrap_or_default().to_string();

        let customer =
            self.gateway.invoke(names::GET_CUSTOMER, json!({ "customer_id": customer_id })).await;
        if !customer.succeeded {
            if customer.status_code == Some(404) {
                return Ok(not_found_output(&customer_id, &customer));
            }
            return Ok(failure_output(&customer));
        }

        let bonds = self.gateway.invoke(names::LIST_BONDS, json!({})).await;
        if !bonds.succeeded {
            return Ok(failure_output(&bonds));
        }

        let available = bonds.data_field("bonds").cloned().unwrap_or_else(|| json!([]));
        let bond_count = available.as_array().map_or(0, Vec::len);
        let context = json!({
            "customer": customer.data_field("customer").cloned().unwrap_or(Value::Null),
            "availableBonds": available,
            "recommendationContext": {
                "timestamp": Utc::now().to_rfc3339(),
                "customerId": customer_id,
                "bondCount": bond_count,
            },
        });
        let rendered =
            serde_json::to_string_pretty(&context).context("rendering recommendation context")?;
        Ok(ToolOutput::ok(rendered))
    }
}

/// Top-demand bond alongside every customer.
pub struct MostSellableBondTool {
    gateway: Arc<CapabilityGateway>,
}

impl MostSellableBondTool {
    pub fn new(gateway: Arc<CapabilityGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for MostSellableBondTool {
    fn name(&self) -> &'static str {
        FIND_MOST_SELLABLE_BOND
    }

    fn description(&self) -> &'static str {
        "Find the most sellable bond (best sellabilityRank, highest demandScore) and return it with all customers so suitable buyers can be identified."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::default()
    }

    async fn execute(&self, _input: Value) -> Result<ToolOutput> {
        let bonds = self.gateway.invoke(names::LIST_BONDS, json!({})).await;
        if !bonds.succeeded {
            return Ok(failure_output(&bonds));
        }

        let listed: Vec<Value> = bonds
            .data_field("bonds")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let Some(top) = most_sellable(&listed) else {
            return Ok(ToolOutput::failed(ErrorKind::NotFound, "Error: no bonds available"));
        };

        // A missing customer list still leaves the bond worth reporting.
        let customers = self.gateway.invoke(names::LIST_CUSTOMERS, json!({})).await;
        let all_customers: Vec<Value> = customers
            .data_field("customers")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let analysis = json!({
            "mostSellableBond": top,
            "allCustomers": all_customers,
            "analysisContext": {
                "timestamp": Utc::now().to_rfc3339(),
                "totalBonds": listed.len(),
                "totalCustomers": all_customers.len(),
                "bondDemandScore": top.get("demandScore"),
                "bondSellabilityRank": top.get("sellabilityRank"),
                "bondDemandTrend": top.get("demandTrend"),
            },
        });
        let rendered =
            serde_json::to_string_pretty(&analysis).context("rendering sellable bond analysis")?;
        Ok(ToolOutput::ok(rendered))
    }
}

/// Lowest `sellabilityRank` wins; equal ranks fall back to the higher `demandScore`.
fn most_sellable(bonds: &[Value]) -> Option<&Value> {
    let rank = |bond: &Value| {
        bond.get("sellabilityRank").and_then(Value::as_i64).unwrap_or(UNRANKED_SELLABILITY)
    };
    let demand = |bond: &Value| bond.get("demandScore").and_then(Value::as_f64).unwrap_or(0.0);

    bonds.iter().min_by(|left, right| {
        rank(left).cmp(&rank(right)).then_with(|| demand(right).total_cmp(&demand(left)))
    })
}

fn entry_key(entry: &Value) -> Option<&str> {
    entry
        .as_str()
        .or_else(|| entry.get("key").and_then(Value::as_str))
        .or_else(|| entry.get("name").and_then(Value::as_str))
}
