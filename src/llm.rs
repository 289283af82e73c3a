//! LLM provider client
//!
//! Speaks the OpenAI-compatible chat-completions protocol, which Groq, OpenAI
//! and Ollama all serve. Uses a long-lived reqwest::Client for connection pooling.

use crate::config::{Config, LlmProvider};
use crate::error::AgentError;
use crate::Result;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

//
// ================= Conversation types =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// Function definition advertised to the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One model turn: either final content, tool calls, or both
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// Chat model seam. The agent runtime only talks to this trait.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn id(&self) -> &str;
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ModelReply>;
}

//
// ================= OpenAI-compatible client =================
//

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub provider: LlmProvider,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub temperature: f32,
}

impl ModelSettings {
    pub fn from_config(config: &Config) -> Self {
        let base_url = config.llm_base_url.clone().unwrap_or_else(|| match config.provider {
            LlmProvider::Groq => GROQ_BASE_URL.to_string(),
            LlmProvider::OpenAi => OPENAI_BASE_URL.to_string(),
            LlmProvider::Ollama => format!("{}/v1", config.ollama_host.trim_end_matches('/')),
        });

        Self {
            provider: config.provider,
            model: config.model.clone(),
            base_url,
            api_key: config.llm_api_key.clone(),
            timeout: config.request_timeout,
            temperature: 0.3,
        }
    }
}

/// Reusable chat-completions client (connection-pooled)
pub struct OpenAiCompatClient {
    client: Client,
    settings: ModelSettings,
}

impl OpenAiCompatClient {
    pub fn new(settings: ModelSettings) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AgentError::Llm(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, settings })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'))
    }

    fn build_request(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> WireRequest {
        WireRequest {
            model: self.settings.model.clone(),
            messages: messages.iter().map(WireMessage::from).collect(),
            temperature: self.settings.temperature,
            tools: (!tools.is_empty()).then(|| tools.iter().map(WireTool::from).collect()),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    fn id(&self) -> &str {
        &self.settings.model
    }

    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ModelReply> {
        let request = self.build_request(messages, tools);

        debug!(
            provider = %self.settings.provider,
            model = %request.model,
            messages = request.messages.len(),
            tools = tools.len(),
            "Calling chat completions"
        );

        let mut builder = self
            .client
            .post(self.completions_url())
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(key) = &self.settings.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.json(&request).send().await.map_err(|e| {
            error!("LLM request failed: {}", e);
            AgentError::Http(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("LLM error response ({}): {}", status, body);
            return Err(AgentError::Api {
                status: status.as_u16(),
                message: provider_error_message(&body),
            });
        }

        let body = response.text().await?;
        parse_reply(&body)
    }
}

/// Build the configured provider client
pub fn create_model(config: &Config) -> Result<std::sync::Arc<dyn ChatModel>> {
    Ok(std::sync::Arc::new(OpenAiCompatClient::new(
        ModelSettings::from_config(config),
    )?))
}

/// Prefer the provider's `error.message`, fall back to the raw body
fn provider_error_message(body: &str) -> String {
    serde_json::from_str::<WireErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

fn parse_reply(body: &str) -> Result<ModelReply> {
    let parsed: WireResponse = serde_json::from_str(body)
        .map_err(|e| AgentError::Llm(format!("Failed to parse model response: {}", e)))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AgentError::Llm("No choices in model response".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| -> Result<ToolCall> {
            // Arguments arrive as a JSON-encoded string; tolerate empty ones.
            let arguments = if call.function.arguments.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&call.function.arguments).map_err(|e| {
                    AgentError::Llm(format!(
                        "Invalid arguments for tool call {}: {}",
                        call.function.name, e
                    ))
                })?
            };
            Ok(ToolCall {
                id: call.id,
                name: call.function.name,
                arguments,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ModelReply {
        content: choice.message.content.filter(|c| !c.trim().is_empty()),
        tool_calls,
    })
}

//
// ================= Wire types =================
//

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&ChatMessage> for WireMessage {
    fn from(m: &ChatMessage) -> Self {
        let tool_calls = (!m.tool_calls.is_empty()).then(|| {
            m.tool_calls
                .iter()
                .map(|c| WireToolCall {
                    id: c.id.clone(),
                    call_type: "function".to_string(),
                    function: WireFunctionCall {
                        name: c.name.clone(),
                        arguments: c.arguments.to_string(),
                    },
                })
                .collect()
        });

        Self {
            role: m.role,
            content: m.content.clone(),
            tool_calls,
            tool_call_id: m.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: WireFunction,
}

impl From<&ToolSpec> for WireTool {
    fn from(spec: &ToolSpec) -> Self {
        Self {
            tool_type: "function",
            function: WireFunction {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireReplyMessage,
}

#[derive(Debug, Deserialize)]
struct WireReplyMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireErrorResponse {
    error: WireErrorBody,
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    message: String,
}
