use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bondline_agent::conversation::ConversationTurn;
use bondline_agent::llm::ModelError;
use bondline_agent::runtime::{AgentRequest, AgentRuntime};
use bondline_agent::{DispatchDecision, ExtractedIds, SanitizedChunk};
use bondline_core::domain::invocation::new_correlation_id;
use bondline_core::{ErrorKind, InterfaceError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{error, info};

const STREAM_BUFFER: usize = 32;

#[derive(Clone)]
pub struct InvocationState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvocationInput {
    prompt: Option<String>,
    #[serde(default)]
    conversation_history: Vec<ConversationTurn>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub path: DispatchDecision,
    pub chunks: Vec<String>,
    pub text: String,
    pub metadata: ExtractedIds,
    pub correlation_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new().route("/invocations", post(invoke)).with_state(InvocationState { runtime })
}

/// Accepts `{prompt, conversationHistory}` or the same object nested under `input`.
pub async fn invoke(State(state): State<InvocationState>, Json(payload): Json<Value>) -> Response {
    let correlation_id = new_correlation_id();

    let input = match parse_input(payload) {
        Ok(input) => input,
        Err(detail) => {
            return error_response(ErrorKind::Validation.into_interface(detail, correlation_id));
        }
    };
    let Some(prompt) = input.prompt.filter(|prompt| !prompt.trim().is_empty()) else {
        return error_response(ErrorKind::Validation.into_interface(
            "No prompt found in payload. Expected {\"prompt\": \"...\"} or {\"input\": {\"prompt\": \"...\"}}",
            correlation_id,
        ));
    };

    let request = AgentRequest::new(prompt)
        .with_history(input.conversation_history)
        .with_correlation_id(correlation_id.clone());

    let (sink, mut stream) = mpsc::channel::<SanitizedChunk>(STREAM_BUFFER);
    let collect = async move {
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.recv().await {
            chunks.push(chunk.text);
        }
        chunks
    };
    let (reply, chunks) = tokio::join!(state.runtime.handle(request, sink), collect);

    match reply {
        Ok(reply) => {
            info!(
                event_name = "server.invocation.completed",
                correlation_id = %reply.correlation_id,
                path = reply.path.as_str(),
                turns = reply.turns,
                chunks = chunks.len(),
                "invocation completed"
            );
            let body = InvocationResponse {
                path: reply.path,
                chunks,
                text: reply.text,
                metadata: reply.metadata,
                correlation_id: reply.correlation_id,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(model_error) => {
            error!(
                event_name = "server.invocation.failed",
                correlation_id = %correlation_id,
                error = %model_error,
                "invocation failed"
            );
            let kind = match model_error {
                ModelError::NotConfigured => ErrorKind::Configuration,
                _ => ErrorKind::Transport,
            };
            error_response(kind.into_interface(model_error.to_string(), correlation_id))
        }
    }
}

fn parse_input(payload: Value) -> Result<InvocationInput, String> {
    let payload = match payload {
        Value::Object(mut object) => match object.remove("input") {
            Some(nested @ Value::Object(_)) => nested,
            Some(other) => {
                object.insert("input".to_string(), other);
                Value::Object(object)
            }
            None => Value::Object(object),
        },
        _ => return Err("payload must be a JSON object".to_string()),
    };
    serde_json::from_value(payload).map_err(|error| format!("invalid payload: {error}"))
}

fn error_response(error: InterfaceError) -> Response {
    let status = match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let detail = match &error {
        InterfaceError::BadRequest { message, .. } | InterfaceError::NotFound { message, .. } => {
            message.clone()
        }
        _ => "see server logs for this correlation id".to_string(),
    };
    let body = ErrorBody {
        error: error.user_message(),
        detail,
        correlation_id: error.correlation_id().to_string(),
    };
    (status, Json(body)).into_response()
}
