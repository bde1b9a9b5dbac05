//! OpenAI-chat-compatible translation.
//!
//! The backend only understands single-shot text generation, so the
//! conversation is collapsed into one prompt/system pair, the call is forced
//! non-streaming, and tool invocations ride on a JSON convention in the
//! reply text rather than a native API feature.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::models::service::ServiceKind;
use crate::proxy;
use crate::telemetry;
use crate::AppState;

// ── Request schema ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub tool_choice: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: ToolType,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    Function,
}

#[derive(Debug, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

// ── Prompt construction ──────────────────────────────────────

const NO_TOOLS_NOTICE: &str = "You have no tools available.";

/// Deterministic tool-usage instruction block appended to the system prompt.
/// One `### Tool:` section per tool, in input order.
pub fn format_tools_for_prompt(tools: &[ToolDefinition]) -> String {
    if tools.is_empty() {
        return NO_TOOLS_NOTICE.to_string();
    }

    let sections: Vec<String> = tools
        .iter()
        .map(|tool| {
            let params = serde_json::to_string_pretty(&tool.function.parameters)
                .unwrap_or_else(|_| "{}".to_string());
            format!(
                "### Tool: {}\n- Description: {}\n- Parameters (JSON Schema):\n{}",
                tool.function.name, tool.function.description, params
            )
        })
        .collect();

    format!(
        "You have access to the following tools. To use a tool, you must respond with a JSON object with a single \"tool_call\" key.\n\
        The value of \"tool_call\" must be an object containing the \"name\" of the tool and the \"arguments\" as an object.\n\
        Do not add any other text, just the JSON object.\n\n\
        Example response for a tool call:\n\
        {{\"tool_call\": {{\"name\": \"tool_name\", \"arguments\": {{\"param1\": \"value1\", \"param2\": \"value2\"}}}}}}\n\n\
        Here are the available tools:\n{}",
        sections.join("\n\n")
    )
}

/// System prompt: any user-supplied system message first, then the tool
/// block, separated by a blank line.
pub fn build_system_prompt(messages: &[ChatMessage], tools: &[ToolDefinition]) -> String {
    let tool_section = format_tools_for_prompt(tools);
    match messages
        .iter()
        .find(|m| m.role == Role::System)
        .and_then(|m| m.content.as_deref())
    {
        Some(system) if !system.is_empty() => format!("{system}\n\n{tool_section}"),
        _ => tool_section,
    }
}

/// Single-shot prompt: non-system messages as `"<role>: <content>"` lines.
pub fn build_prompt(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            format!(
                "{}: {}",
                m.role.as_str(),
                m.content.as_deref().unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Response translation ─────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Shape the model's raw reply into an OpenAI-style chat response. A reply
/// that parses as JSON with a `tool_call` key becomes a function call; any
/// other reply is plain assistant text.
pub fn translate_response(raw: &str) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        if let Some(tool_call) = value.get("tool_call") {
            let name = tool_call
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let arguments = tool_call
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            let arguments =
                serde_json::to_string(&arguments).unwrap_or_else(|_| "{}".to_string());

            return json!({
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            // Not security-sensitive; uniqueness is enough.
                            "id": format!("call_{}", Utc::now().timestamp_millis()),
                            "type": "function",
                            "function": { "name": name, "arguments": arguments },
                        }],
                    },
                    "finish_reason": "tool_calls",
                }],
            });
        }
    }

    json!({
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": raw },
            "finish_reason": "stop",
        }],
    })
}

// ── Handler ──────────────────────────────────────────────────

pub async fn completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let key = proxy::auth::authenticate(&headers, &state.store).await?;

    telemetry::record_connection(
        state.store.clone(),
        telemetry::connection_entry(&key, "/api/v1/chat/completions", &headers),
    );

    let raw_body: Value =
        serde_json::from_slice(&body).map_err(|e| AppError::InvalidJson(e.to_string()))?;
    let req: ChatCompletionRequest = serde_json::from_value(raw_body)
        .map_err(|e| AppError::Validation(json!({ "message": e.to_string() })))?;

    let prompt = build_prompt(&req.messages);
    let system = build_system_prompt(&req.messages, &req.tools);

    tracing::debug!(
        key = %key.name,
        model = %req.model,
        tools = req.tools.len(),
        "translating chat completion"
    );

    let base = proxy::resolve_active_url(&state, ServiceKind::TextGeneration).await?;
    let url = format!("{base}/api/generate");
    let payload = json!({
        "model": req.model,
        "prompt": prompt,
        "system": system,
        "stream": false,
        // Forcing JSON output makes tool-call detection reliable.
        "format": "json",
    });
    let payload = serde_json::to_vec(&payload).map_err(|e| AppError::Internal(e.into()))?;

    let resp = state
        .upstream
        .forward(reqwest::Method::POST, &url, payload)
        .await?;
    let (_, value) = proxy::read_upstream_json(resp).await?;

    telemetry::record_usage(state.store.clone(), key.id);

    let generate: GenerateResponse = serde_json::from_value(value).map_err(|e| {
        AppError::Internal(anyhow::anyhow!("unexpected generate response shape: {e}"))
    })?;

    Ok(Json(translate_response(generate.response.trim())))
}
