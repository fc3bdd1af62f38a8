use std::sync::Arc;

use bondline_core::domain::invocation::new_correlation_id;
use bondline_core::ErrorKind;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::conversation::{enrich_prompt, ConversationTurn};
use crate::dispatch::{classify, normalize_fast_path_response, parse_suggestions, starter_suggestions, DispatchDecision};
use crate::extract::{extract, ExtractedIds, SanitizedChunk};
use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::llm::{ModelClient, ModelError, ModelRequest, ToolCall, TranscriptEntry};
use crate::tools::{ToolOutput, ToolRegistry};

pub const DEFAULT_MAX_TURNS: u32 = 8;

pub const ORCHESTRATOR_SYSTEM_PROMPT: &str = "You are the Bondline assistant for a bond sales desk. \
Use the customer tools to look up customers and profiles, the product tools for bonds and market data, \
the recommendation tools to match bonds with customers, and the marketing tools to email customers or review sent emails. \
Emails are irreversible: always call marketing_send_email with approved=false first, show the preview \
and its preview id to the user, and only call it again with approved=true, the same content and that \
preview_id after the user explicitly confirms. If the content changes, preview again.";

pub const SUGGESTION_SYSTEM_PROMPT: &str = "You generate prompt suggestions for a bond sales desk assistant. \
Respond ONLY with a JSON array of 3 or 4 short, actionable prompts (3 to 10 words each) that follow \
naturally from the conversation, referencing the specific customers or bonds mentioned. \
For a new conversation respond with [\"Show me available bonds\", \"View customer profiles\", \
\"Search market data\", \"Email customers about bonds\"].";

#[derive(Clone, Debug, Default)]
pub struct AgentRequest {
    pub prompt: String,
    pub history: Vec<ConversationTurn>,
    pub correlation_id: Option<String>,
}

impl AgentRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), ..Self::default() }
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentReply {
    pub path: DispatchDecision,
    pub text: String,
    pub metadata: ExtractedIds,
    pub turns: u32,
    pub correlation_id: String,
}

pub struct AgentRuntime {
    model: Arc<dyn ModelClient>,
    tools: ToolRegistry,
    guardrails: GuardrailPolicy,
    max_turns: u32,
}

impl AgentRuntime {
    pub fn new(model: Arc<dyn ModelClient>, tools: ToolRegistry, guardrails: GuardrailPolicy) -> Self {
        Self { model, tools, guardrails, max_turns: DEFAULT_MAX_TURNS }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Runs one request to completion. Every text delta is scanned for
    /// identifiers and forwarded to `sink` in arrival order; the sink closes
    /// when this returns.
    pub async fn handle(
        &self,
        request: AgentRequest,
        sink: mpsc::Sender<SanitizedChunk>,
    ) -> Result<AgentReply, ModelError> {
        let correlation_id = request.correlation_id.clone().unwrap_or_else(new_correlation_id);
        let path = classify(&request.prompt);
        info!(
            event_name = "agent.dispatch.decided",
            correlation_id = %correlation_id,
            path = path.as_str(),
            history_turns = request.history.len(),
            "request dispatched"
        );

        let enriched = enrich_prompt(&request.history, &request.prompt);
        let mut stream = ChunkForwarder::new(sink, &correlation_id);
        let turns = match path {
            DispatchDecision::FastPath => self.fast_path(enriched, &mut stream).await?,
            DispatchDecision::Orchestrated => {
                self.orchestrate(enriched, &mut stream, &correlation_id).await?
            }
        };

        Ok(AgentReply { path, text: stream.text, metadata: stream.metadata, turns, correlation_id })
    }

    async fn fast_path(&self, enriched: String, stream: &mut ChunkForwarder) -> Result<u32, ModelError> {
        let request = ModelRequest {
            system_prompt: SUGGESTION_SYSTEM_PROMPT.to_string(),
            transcript: vec![TranscriptEntry::User { content: enriched }],
            tools: Vec::new(),
        };

        let suggestions = match self.model.next_turn(&request).await {
            Ok(turn) => parse_suggestions(&normalize_fast_path_response(&turn.text())),
            Err(error) => {
                warn!(
                    event_name = "agent.fast_path.fallback",
                    correlation_id = %stream.correlation_id,
                    error = %error,
                    "suggestion generation failed; using starter suggestions"
                );
                starter_suggestions()
            }
        };

        let rendered = serde_json::to_string(&suggestions)
            .map_err(|error| ModelError::Decode(error.to_string()))?;
        stream.emit(&rendered).await;
        Ok(1)
    }

    async fn orchestrate(
        &self,
        enriched: String,
        stream: &mut ChunkForwarder,
        correlation_id: &str,
    ) -> Result<u32, ModelError> {
        let mut request = ModelRequest {
            system_prompt: ORCHESTRATOR_SYSTEM_PROMPT.to_string(),
            transcript: vec![TranscriptEntry::User { content: enriched }],
            tools: self.tools.specs(),
        };

        for turn_number in 1..=self.max_turns {
            let turn = self.model.next_turn(&request).await?;
            for delta in &turn.deltas {
                stream.emit(delta).await;
            }

            let finished = turn.tool_calls.is_empty();
            request.transcript.push(TranscriptEntry::Assistant {
                content: turn.text(),
                tool_calls: turn.tool_calls.clone(),
            });
            if finished {
                return Ok(turn_number);
            }

            for call in &turn.tool_calls {
                let output = self.run_tool(call, correlation_id).await;
                request.transcript.push(TranscriptEntry::ToolResult {
                    call_id: call.id.clone(),
                    is_error: output.is_error(),
                    content: output.content,
                });
            }
        }

        warn!(
            event_name = "agent.turn_limit.reached",
            correlation_id = %correlation_id,
            max_turns = self.max_turns,
            "orchestration stopped at the turn limit"
        );
        stream
            .emit(&format!(
                "\n\nI stopped after {} steps without finishing. Ask me to continue if you need more.",
                self.max_turns
            ))
            .await;
        Ok(self.max_turns)
    }

    async fn run_tool(&self, call: &ToolCall, correlation_id: &str) -> ToolOutput {
        let output = self.evaluate_tool(call).await;
        info!(
            event_name = "agent.tool.invoked",
            correlation_id = %correlation_id,
            tool = %call.name,
            call_id = %call.id,
            is_error = output.is_error(),
            error_kind = output.error_kind.map_or("none", ErrorKind::as_str),
            "tool call completed"
        );
        output
    }

    async fn evaluate_tool(&self, call: &ToolCall) -> ToolOutput {
        let Some(tool) = self.tools.get(&call.name) else {
            return ToolOutput::failed(
                ErrorKind::Validation,
                format!("Error: unknown tool `{}`", call.name),
            );
        };

        let input = match &call.input {
            Value::Null => json!({}),
            input => input.clone(),
        };
        if let Err(violation) = tool.input_schema().validate(&input) {
            return ToolOutput::failed(
                ErrorKind::Validation,
                format!("Error: invalid input for `{}`: {violation}", call.name),
            );
        }

        let intent = tool.guard_intent(&input);
        if let GuardrailDecision::Deny { reason_code, user_message, fallback_path } =
            self.guardrails.evaluate(&intent)
        {
            info!(
                event_name = "agent.guardrail.denied",
                tool = intent.tool(),
                action_key = intent.action_key(),
                reason_code,
                fallback_path,
                "tool call denied by guardrail"
            );
            return ToolOutput::failed(ErrorKind::Validation, user_message);
        }

        match tool.execute(input).await {
            Ok(output) => output,
            Err(error) => ToolOutput::failed(ErrorKind::Validation, format!("Error: {error:#}")),
        }
    }
}

/// Session-scoped view of the outgoing stream: forwards chunks in order and
/// accumulates text and identifiers.
struct ChunkForwarder {
    sink: mpsc::Sender<SanitizedChunk>,
    correlation_id: String,
    text: String,
    metadata: ExtractedIds,
    open: bool,
}

impl ChunkForwarder {
    fn new(sink: mpsc::Sender<SanitizedChunk>, correlation_id: &str) -> Self {
        Self {
            sink,
            correlation_id: correlation_id.to_string(),
            text: String::new(),
            metadata: ExtractedIds::default(),
            open: true,
        }
    }

    async fn emit(&mut self, delta: &str) {
        let chunk = extract(delta);
        self.metadata.merge(&chunk.ids);
        self.text.push_str(&chunk.text);

        if self.open && self.sink.send(chunk).await.is_err() {
            self.open = false;
            debug!(
                event_name = "agent.stream.closed",
                correlation_id = %self.correlation_id,
                "stream receiver dropped; continuing without forwarding"
            );
        }
    }
}
