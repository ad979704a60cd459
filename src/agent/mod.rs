//! Agent logic: the think/act loop, LLM client, memory, tool execution,
//! planning, sanitisation, and diagnostics.

pub mod agent;
pub mod client;
pub mod diagnostics;
pub mod executor;
pub mod extract;
pub mod memory;
pub mod planning;
pub mod sanitizer;
pub mod types;

pub use agent::{Agent, AgentState, RunMode, RunResult, RunStatus};
pub use client::{normalize_tool_calls, ChatOutcome, ClientMetrics, LlmClient, ModelStatusCache};
pub use diagnostics::{DiagnosticRecord, DiagnosticReport, Severity};
pub use executor::{ExecutionOutcome, ToolExecutor};
pub use memory::{MessagePriority, RollingMemory};
pub use planning::{Plan, PlanningFlow, StepStatus};
pub use sanitizer::{ExpectedFormat, PathValidator, Sanitizer};
pub use types::{
    AssistantToolCall, ChatCompletionRequest, ChatCompletionResponse, Choice, CompletionMetadata,
    FunctionCall, FunctionDefinition, FunctionName, GenerationOptions, Message, Role, ToolChoice,
    ToolDefinition, Usage,
};
