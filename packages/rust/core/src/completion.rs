//! Text-completion service interface and adapters.
//!
//! Stages talk to the language model only through [`TextCompletion`]. The
//! live adapter is [`OpenRouterClient`] (OpenAI-compatible chat completions
//! with function tools); [`OfflineCompletion`] is a deterministic stand-in.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use kidplanner_shared::{KidPlannerError, OpenRouterConfig, Result};

use crate::capabilities::CapabilitySchema;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// A capability result fed back to the model.
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A request from the model to run one capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityCall {
    /// Correlates the call with its result message.
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl CapabilityCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One role-tagged message in a completion exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Invocations requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<CapabilityCall>,
    /// For tool messages, the id of the call this answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            invocations: Vec::new(),
            call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, invocations: Vec<CapabilityCall>) -> Self {
        Self {
            invocations,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: Some(call_id.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// What the service returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub invocations: Vec<CapabilityCall>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            invocations: Vec::new(),
        }
    }
}

/// The text-completion service contract.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Generate a reply to `messages`, optionally requesting invocations of
    /// any of `capabilities`.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        capabilities: &[CapabilitySchema],
    ) -> Result<Completion>;
}

// ---------------------------------------------------------------------------
// OpenRouter (OpenAI-compatible) wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded argument object.
    arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

fn function_kind() -> String {
    "function".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

impl From<&ChatMessage> for WireMessage {
    fn from(msg: &ChatMessage) -> Self {
        let tool_calls = (!msg.invocations.is_empty()).then(|| {
            msg.invocations
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: function_kind(),
                    function: WireFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect()
        });
        Self {
            role: msg.role.as_str().to_string(),
            content: Some(msg.content.clone()),
            tool_calls,
            tool_call_id: msg.call_id.clone(),
        }
    }
}

fn parse_tool_calls(calls: &[WireToolCall]) -> Result<Vec<CapabilityCall>> {
    calls
        .iter()
        .map(|call| {
            let raw = call.function.arguments.trim();
            let arguments = if raw.is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(raw).map_err(|e| {
                    KidPlannerError::Completion(format!(
                        "invalid arguments for {}: {e}",
                        call.function.name
                    ))
                })?
            };
            Ok(CapabilityCall::new(&call.id, &call.function.name, arguments))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// OpenRouterClient
// ---------------------------------------------------------------------------

/// Chat-completions client for OpenRouter.
pub struct OpenRouterClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenRouterClient {
    /// Build a client from the `[openrouter]` config section and a resolved key.
    pub fn new(config: &OpenRouterConfig, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("KidPlanner/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| KidPlannerError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.default_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// Override the model id.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextCompletion for OpenRouterClient {
    fn name(&self) -> &str {
        "openrouter"
    }

    #[instrument(skip_all, fields(model = %self.model, messages = messages.len(), tools = capabilities.len()))]
    async fn complete(
        &self,
        messages: &[ChatMessage],
        capabilities: &[CapabilitySchema],
    ) -> Result<Completion> {
        let request = WireRequest {
            model: &self.model,
            messages: messages.iter().map(WireMessage::from).collect(),
            tools: capabilities
                .iter()
                .map(|schema| WireTool {
                    kind: "function",
                    function: WireFunction {
                        name: &schema.name,
                        description: &schema.description,
                        parameters: &schema.parameters,
                    },
                })
                .collect(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-Title", "KidPlanner")
            .json(&request)
            .send()
            .await
            .map_err(|e| KidPlannerError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KidPlannerError::Completion(format!(
                "HTTP {status}: {}",
                body.trim()
            )));
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| KidPlannerError::Completion(format!("malformed response: {e}")))?;

        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| KidPlannerError::Completion("response contained no choices".into()))?;

        let invocations = match &message.tool_calls {
            Some(calls) => parse_tool_calls(calls)?,
            None => Vec::new(),
        };

        debug!(invocations = invocations.len(), "completion received");
        Ok(Completion {
            text: message.content.unwrap_or_default(),
            invocations,
        })
    }
}

// ---------------------------------------------------------------------------
// OfflineCompletion
// ---------------------------------------------------------------------------

/// Deterministic stand-in that never contacts a model.
///
/// Answers with the most recent capability output when there is one,
/// otherwise echoes the latest user message under a short notice.
/// Never requests invocations.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineCompletion;

const OFFLINE_NOTICE: &str = "Offline mode: no language model was consulted.";

#[async_trait]
impl TextCompletion for OfflineCompletion {
    fn name(&self) -> &str {
        "offline"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _capabilities: &[CapabilitySchema],
    ) -> Result<Completion> {
        if let Some(tool) = messages.iter().rev().find(|m| m.role == Role::Tool) {
            return Ok(Completion::text(tool.content.clone()));
        }
        let text = match messages.iter().rev().find(|m| m.role == Role::User) {
            Some(user) => format!("{OFFLINE_NOTICE}\n\n{}", user.content.trim()),
            None => OFFLINE_NOTICE.to_string(),
        };
        Ok(Completion::text(text))
    }
}
