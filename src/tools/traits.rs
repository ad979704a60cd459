//! Core tool trait and call/response types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::types::{FunctionDefinition, ToolDefinition};
use crate::error::{Error, Result};
use crate::tools::cache::ToolCache;

/// A tool that can be called by the LLM
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name
    fn name(&self) -> &str;

    /// Get the tool description
    fn description(&self) -> &str;

    /// Get the JSON Schema for tool parameters
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with validated arguments
    async fn run(&self, args: Value) -> Result<Value>;

    /// Declared execution timeout; the executor default applies when `None`
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Reset any per-session state. Stateless tools keep the no-op default.
    async fn reset(&self) {}

    /// Tool-specific timeout recovery. Returning `Some` short-circuits the
    /// executor's simplified-argument retry.
    async fn recover_from_timeout(&self, _args: &Value) -> Option<Value> {
        None
    }

    /// Tool-specific error recovery. Returning `Some` short-circuits the
    /// executor's generic retry ladder.
    async fn recover_from_error(&self, _args: &Value, _error: &Error) -> Option<Value> {
        None
    }

    /// TTL for cached results; the configured default applies when `None`
    fn cache_ttl(&self) -> Option<Duration> {
        None
    }

    /// Per-tool result cache consulted before the global cache.
    fn instance_cache(&self) -> Option<Arc<ToolCache>> {
        None
    }

    /// Convert to an LLM function definition
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: self.name().to_string(),
                description: self.description().to_string(),
                parameters: self.parameters_schema(),
            },
        }
    }
}

/// A tool call request from the LLM, normalised for execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool call ID
    pub id: String,
    /// Tool name
    pub name: String,
    /// Decoded arguments. When decoding failed this holds the raw string
    /// and `parse_error` explains why.
    pub arguments: Value,
    /// Set when the model's argument payload was not valid JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl ToolCall {
    /// Create a call with decoded arguments
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
            parse_error: None,
        }
    }

    /// Parse arguments into a specific type
    pub fn parse_arguments<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_value(self.arguments.clone())
            .map_err(|e| Error::InvalidToolArgument(format!("Invalid tool arguments: {}", e)))
    }
}

/// The result (or error) of executing one tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    /// ID of the originating tool call
    pub call_id: String,
    /// Name of the tool that ran
    pub tool_name: String,
    /// Whether the execution succeeded
    pub success: bool,
    /// Raw result value (for successful execution)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message (for failed execution)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResponse {
    /// Create a successful response
    pub fn success(call_id: impl Into<String>, tool_name: impl Into<String>, result: Value) -> Self {
        ToolResponse {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Create a failed response
    pub fn failure(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        ToolResponse {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// String coercion of the result for the tool message fed back to the
    /// model. The raw value stays available in `result`.
    pub fn content_for_llm(&self) -> String {
        if self.success {
            match self.result {
                Some(Value::String(ref s)) => s.clone(),
                Some(ref other) => other.to_string(),
                None => String::new(),
            }
        } else {
            format!("Error: {}", self.error.clone().unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_response_coercion() {
        let text = ToolResponse::success("c1", "time", json!("12:00"));
        assert_eq!(text.content_for_llm(), "12:00");

        let structured = ToolResponse::success("c2", "search", json!({"hits": 3}));
        assert_eq!(structured.content_for_llm(), r#"{"hits":3}"#);
        assert_eq!(structured.result, Some(json!({"hits": 3})));

        let failed = ToolResponse::failure("c3", "search", "boom");
        assert!(!failed.success);
        assert_eq!(failed.content_for_llm(), "Error: boom");
    }

    #[test]
    fn test_parse_arguments() {
        #[derive(Deserialize)]
        struct Args {
            query: String,
        }
        let call = ToolCall::new("c1", "search", json!({"query": "rust"}));
        let args: Args = call.parse_arguments().unwrap();
        assert_eq!(args.query, "rust");

        let bad = ToolCall::new("c2", "search", json!({"query": 7}));
        assert!(bad.parse_arguments::<Args>().is_err());
    }
}
