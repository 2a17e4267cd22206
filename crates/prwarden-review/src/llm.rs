use std::time::Duration;

use async_trait::async_trait;
use prwarden_core::{FileEdit, LlmConfig, LlmProvider, WardenError};
use serde::Deserialize;
use serde_json::{json, Value};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MODIFY_FILE: &str = "modify_file";
/// Tool-use turns after which the conversation is cut off.
const MAX_TOOL_ROUNDS: usize = 3;
const MAX_ERROR_BODY: usize = 500;

/// One analysis request.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub system: String,
    pub user: String,
    /// Offer the file-modification tool.
    pub allow_edits: bool,
}

/// What the reasoning service produced, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceReply {
    /// Text blocks, in order, joined by blank lines.
    pub text: String,
    /// Well-formed file modifications, in the order they were requested.
    pub edits: Vec<FileEdit>,
    /// Reasons for structured output that could not be decoded.
    pub rejected: Vec<String>,
}

/// Failure talking to the reasoning service.
#[derive(Debug, thiserror::Error)]
pub enum ReasoningError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A reasoning service that turns a prompt into narrative and edits.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Model identifier, for logs.
    fn model(&self) -> &str;

    /// Run one analysis. Each call is independent.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<ServiceReply, ReasoningError>;
}

/// HTTP client for the Anthropic Messages API or an OpenAI-compatible
/// chat completions endpoint.
///
/// # Examples
///
/// ```
/// use prwarden_core::LlmConfig;
/// use prwarden_review::llm::{LlmClient, ReasoningService};
///
/// let config = LlmConfig {
///     api_key: Some("test-key".into()),
///     ..LlmConfig::default()
/// };
/// let client = LlmClient::new(&config).unwrap();
/// assert_eq!(client.model(), "claude-sonnet-4-20250514");
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
    base_url: String,
}

impl LlmClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Reasoning`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, WardenError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WardenError::Reasoning(format!("failed to create HTTP client: {e}")))?;
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(config.provider.default_base_url())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client,
            config: config.clone(),
            base_url,
        })
    }

    async fn anthropic(&self, request: &AnalysisRequest) -> Result<ServiceReply, ReasoningError> {
        let url = format!("{}/v1/messages", self.base_url);
        let mut messages = vec![json!({ "role": "user", "content": request.user })];
        let mut texts = Vec::new();
        let mut reply = ServiceReply::default();

        for _ in 0..MAX_TOOL_ROUNDS {
            let mut body = json!({
                "model": self.config.model,
                "max_tokens": self.config.max_tokens,
                "system": request.system,
                "messages": messages,
            });
            match self.config.thinking_budget {
                Some(budget) => {
                    body["thinking"] = json!({ "type": "enabled", "budget_tokens": budget });
                }
                None => body["temperature"] = json!(0.1),
            }
            if request.allow_edits {
                body["tools"] = json!([{
                    "name": MODIFY_FILE,
                    "description": "Propose new content for a file to fix an issue",
                    "input_schema": modify_file_schema(),
                }]);
            }

            let mut http = self
                .client
                .post(&url)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json");
            if let Some(key) = &self.config.api_key {
                http = http.header("x-api-key", key);
            }
            let response = send(http, &body).await?;

            let content = response
                .get("content")
                .and_then(Value::as_array)
                .ok_or_else(|| ReasoningError::Malformed("missing content blocks".into()))?;

            let mut results = Vec::new();
            for block in content {
                match block.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        if let Some(text) = block.get("text").and_then(Value::as_str) {
                            texts.push(text.to_string());
                        }
                    }
                    Some("tool_use") => {
                        let name = block.get("name").and_then(Value::as_str).unwrap_or("");
                        let input = block.get("input").cloned().unwrap_or(Value::Null);
                        let outcome = record_tool_call(&mut reply, name, input);
                        results.push(json!({
                            "type": "tool_result",
                            "tool_use_id": block.get("id").cloned().unwrap_or(Value::Null),
                            "content": outcome.message(),
                            "is_error": outcome.is_error(),
                        }));
                    }
                    // thinking, redacted_thinking
                    _ => {}
                }
            }

            let stop = response.get("stop_reason").and_then(Value::as_str);
            if stop != Some("tool_use") || results.is_empty() {
                break;
            }
            messages.push(json!({ "role": "assistant", "content": content }));
            messages.push(json!({ "role": "user", "content": results }));
        }

        reply.text = join_text(texts);
        Ok(reply)
    }

    async fn openai(&self, request: &AnalysisRequest) -> Result<ServiceReply, ReasoningError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut messages = vec![
            json!({ "role": "system", "content": request.system }),
            json!({ "role": "user", "content": request.user }),
        ];
        let mut texts = Vec::new();
        let mut reply = ServiceReply::default();

        for _ in 0..MAX_TOOL_ROUNDS {
            let mut body = json!({
                "model": self.config.model,
                "messages": messages,
                "max_tokens": self.config.max_tokens,
                "temperature": 0.1,
            });
            if request.allow_edits {
                body["tools"] = json!([{
                    "type": "function",
                    "function": {
                        "name": MODIFY_FILE,
                        "description": "Propose new content for a file to fix an issue",
                        "parameters": modify_file_schema(),
                    }
                }]);
            }

            let mut http = self
                .client
                .post(&url)
                .header("Content-Type", "application/json");
            if let Some(key) = &self.config.api_key {
                http = http.header("Authorization", format!("Bearer {key}"));
            }
            let response = send(http, &body).await?;

            let choice = response
                .get("choices")
                .and_then(|c| c.get(0))
                .ok_or_else(|| ReasoningError::Malformed("missing choices".into()))?;
            let message = choice
                .get("message")
                .ok_or_else(|| ReasoningError::Malformed("missing message".into()))?;

            if let Some(text) = message.get("content").and_then(Value::as_str) {
                texts.push(text.to_string());
            }

            let mut results = Vec::new();
            for call in message
                .get("tool_calls")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                let function = call.get("function");
                let name = function
                    .and_then(|f| f.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let outcome = match function
                    .and_then(|f| f.get("arguments"))
                    .and_then(Value::as_str)
                    .map(serde_json::from_str::<Value>)
                {
                    Some(Ok(input)) => record_tool_call(&mut reply, name, input),
                    Some(Err(e)) => {
                        let reason = format!("{name}: arguments are not valid JSON: {e}");
                        reply.rejected.push(reason.clone());
                        ToolOutcome::Rejected(reason)
                    }
                    None => {
                        let reason = format!("{name}: missing arguments");
                        reply.rejected.push(reason.clone());
                        ToolOutcome::Rejected(reason)
                    }
                };
                results.push(json!({
                    "role": "tool",
                    "tool_call_id": call.get("id").cloned().unwrap_or(Value::Null),
                    "content": outcome.message(),
                }));
            }

            let finish = choice.get("finish_reason").and_then(Value::as_str);
            if finish != Some("tool_calls") || results.is_empty() {
                break;
            }
            messages.push(message.clone());
            messages.extend(results);
        }

        reply.text = join_text(texts);
        Ok(reply)
    }
}

#[async_trait]
impl ReasoningService for LlmClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<ServiceReply, ReasoningError> {
        tracing::debug!(
            provider = %self.config.provider,
            model = %self.config.model,
            allow_edits = request.allow_edits,
            prompt_bytes = request.user.len(),
            "sending analysis request"
        );
        match self.config.provider {
            LlmProvider::Anthropic => self.anthropic(request).await,
            LlmProvider::OpenAi => self.openai(request).await,
        }
    }
}

fn modify_file_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "file_path": {
                "type": "string",
                "description": "Path of the file, relative to the repository root"
            },
            "new_content": {
                "type": "string",
                "description": "The complete new content of the file"
            },
            "description": {
                "type": "string",
                "description": "What was changed and why"
            }
        },
        "required": ["file_path", "new_content", "description"]
    })
}

#[derive(Deserialize)]
struct ModifyFileInput {
    file_path: String,
    new_content: String,
    #[serde(default)]
    description: Option<String>,
}

enum ToolOutcome {
    Recorded,
    Rejected(String),
}

impl ToolOutcome {
    fn message(&self) -> String {
        match self {
            ToolOutcome::Recorded => "recorded".to_string(),
            ToolOutcome::Rejected(reason) => format!("rejected: {reason}"),
        }
    }

    fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Rejected(_))
    }
}

fn record_tool_call(reply: &mut ServiceReply, name: &str, input: Value) -> ToolOutcome {
    if name != MODIFY_FILE {
        let reason = format!("unknown tool `{name}`");
        reply.rejected.push(reason.clone());
        return ToolOutcome::Rejected(reason);
    }
    match serde_json::from_value::<ModifyFileInput>(input) {
        Ok(input) => {
            reply.edits.push(FileEdit {
                path: input.file_path,
                content: input.new_content,
                description: input.description,
            });
            ToolOutcome::Recorded
        }
        Err(e) => {
            let reason = format!("{MODIFY_FILE}: {e}");
            reply.rejected.push(reason.clone());
            ToolOutcome::Rejected(reason)
        }
    }
}

async fn send(request: reqwest::RequestBuilder, body: &Value) -> Result<Value, ReasoningError> {
    let response = request.json(body).send().await.map_err(|e| {
        if e.is_timeout() {
            ReasoningError::Timeout
        } else {
            ReasoningError::Transport(e.to_string())
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let body = truncate(&text, MAX_ERROR_BODY);
        return Err(match status.as_u16() {
            // 529: Anthropic "overloaded"
            429 | 529 => ReasoningError::RateLimited(body),
            code => ReasoningError::Api { status: code, body },
        });
    }

    response
        .json()
        .await
        .map_err(|e| ReasoningError::Malformed(format!("failed to parse response: {e}")))
}

fn join_text(texts: Vec<String>) -> String {
    texts
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_uses_provider_default_base_url() {
        let client = LlmClient::new(&LlmConfig::default()).unwrap();
        assert_eq!(client.base_url, "https://api.anthropic.com");

        let config = LlmConfig {
            provider: LlmProvider::OpenAi,
            base_url: Some("http://localhost:11434/".into()),
            ..LlmConfig::default()
        };
        let client = LlmClient::new(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[test]
    fn tool_call_with_missing_field_is_rejected() {
        let mut reply = ServiceReply::default();
        let outcome = record_tool_call(&mut reply, MODIFY_FILE, json!({ "file_path": "a.rs" }));
        assert!(outcome.is_error());
        assert!(reply.edits.is_empty());
        assert_eq!(reply.rejected.len(), 1);
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let mut reply = ServiceReply::default();
        record_tool_call(&mut reply, "delete_repo", json!({}));
        assert!(reply.rejected[0].contains("delete_repo"));
    }

    #[test]
    fn tool_call_records_edit() {
        let mut reply = ServiceReply::default();
        let outcome = record_tool_call(
            &mut reply,
            MODIFY_FILE,
            json!({ "file_path": "src/a.rs", "new_content": "fn a() {}", "description": "fix" }),
        );
        assert!(!outcome.is_error());
        assert_eq!(reply.edits[0].path, "src/a.rs");
        assert_eq!(reply.edits[0].description.as_deref(), Some("fix"));
    }

    #[test]
    fn join_text_skips_blank_blocks() {
        let text = join_text(vec!["  first ".into(), "".into(), "second".into()]);
        assert_eq!(text, "first\n\nsecond");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        let t = truncate("ééééé", 3);
        assert_eq!(t, "é...");
    }
}
