#![deny(clippy::print_stdout, clippy::print_stderr)]

//! The assistant surface: a provider-agnostic LLM interface and the tool
//! loop that lets a model drive the accounting engines.
//!
//! Providers are pluggable; the loop is not. Whatever the model, the edge
//! executes at most [`MAX_TOOL_ITERATIONS`] rounds of tool calls before
//! giving up, and every tool resolves to a plain engine operation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

mod tools;

pub use tools::ToolRouter;

pub const MAX_TOOL_ITERATIONS: usize = 10;

pub type AssistantResult<T> = Result<T, AssistantError>;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("invalid tool arguments: {0}")]
    InvalidArgs(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("engine rejected the call: {0}")]
    Engine(String),
    #[error("provider failure: {0}")]
    Provider(String),
    #[error("tool iteration limit reached")]
    IterationLimit,
}

impl From<abacus_ledger::LedgerError> for AssistantError {
    fn from(err: abacus_ledger::LedgerError) -> Self {
        AssistantError::Engine(err.to_string())
    }
}

/// Provider-agnostic tool description: JSON-schema parameters plus the
/// required property names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    pub required: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub name: String,
    pub content: serde_json::Value,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl LlmMessage {
    #[must_use]
    pub fn user(content: &str) -> Self {
        Self {
            role: "user".into(),
            content: content.to_string(),
            tool_calls: Vec::new(),
        }
    }

    #[must_use]
    pub fn assistant(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.to_string(),
            tool_calls,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    EndTurn,
    ToolUse,
    Error,
}

/// What comes back from a provider: a final text, or tool calls the edge
/// must execute and feed back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    fn is_configured(&self) -> bool;

    async fn chat(
        &self,
        messages: &[LlmMessage],
        tools: &[ToolDefinition],
        system_prompt: &str,
    ) -> AssistantResult<LlmResponse>;

    async fn send_tool_results(
        &self,
        messages: &[LlmMessage],
        tool_results: &[ToolOutcome],
        tools: &[ToolDefinition],
        system_prompt: &str,
    ) -> AssistantResult<LlmResponse>;
}

/// The chat edge: hand the user's text to the provider, execute whatever
/// tools it asks for, loop the results back, and stop at the iteration
/// ceiling.
pub struct Assistant {
    provider: Arc<dyn LlmProvider>,
    router: ToolRouter,
    system_prompt: String,
}

impl Assistant {
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, router: ToolRouter) -> Self {
        Self {
            provider,
            router,
            system_prompt: "You are a bookkeeping assistant. Use the tools to read and write \
                            the user's ledgers; never invent balances."
                .into(),
        }
    }

    pub async fn handle(
        &self,
        user_id: abacus_model::UserId,
        text: &str,
    ) -> AssistantResult<String> {
        if !self.provider.is_configured() {
            return Err(AssistantError::Provider(format!(
                "{} is not configured",
                self.provider.provider_name()
            )));
        }

        let tools = self.router.definitions();
        let mut messages = vec![LlmMessage::user(text)];
        let mut response = self
            .provider
            .chat(&messages, &tools, &self.system_prompt)
            .await?;

        for iteration in 0..MAX_TOOL_ITERATIONS {
            if response.tool_calls.is_empty() {
                return Ok(response.text);
            }
            debug!(iteration, calls = response.tool_calls.len(), "executing tool round");

            let mut outcomes = Vec::new();
            for call in &response.tool_calls {
                let outcome = match self.router.execute(user_id, call).await {
                    Ok(content) => ToolOutcome {
                        name: call.name.clone(),
                        content,
                        success: true,
                    },
                    Err(err) => {
                        warn!(tool = %call.name, error = %err, "tool call failed");
                        ToolOutcome {
                            name: call.name.clone(),
                            content: serde_json::json!({ "error": err.to_string() }),
                            success: false,
                        }
                    }
                };
                outcomes.push(outcome);
            }

            messages.push(LlmMessage::assistant(
                &response.text,
                response.tool_calls.clone(),
            ));
            response = self
                .provider
                .send_tool_results(&messages, &outcomes, &tools, &self.system_prompt)
                .await?;
        }

        Err(AssistantError::IterationLimit)
    }
}
