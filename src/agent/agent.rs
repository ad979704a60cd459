//! The think/act agent loop.
//!
//! A run alternates LLM calls (think) with tool execution (act) until the
//! model produces a final answer, the iteration cap fires, or an
//! unrecoverable error puts the loop into the error state. Tool failures are
//! surfaced to the model as tool messages and never abort the loop.

use crate::agent::client::{normalize_tool_calls, ChatOutcome, LlmClient};
use crate::agent::diagnostics::{DiagnosticRecord, DiagnosticReport, Severity};
use crate::agent::executor::ToolExecutor;
use crate::agent::extract::STRUCTURED_INTERFACE_NUDGE;
use crate::agent::memory::RollingMemory;
use crate::agent::sanitizer::Sanitizer;
use crate::agent::types::{GenerationOptions, Message, ToolChoice};
use crate::config::{Config, ExecutionMode};
use crate::error::{Error, Result};
use crate::session::SessionManager;
use crate::tokenizer::Tokenizer;
use crate::tools::{global_cache, global_registry, Tool, ToolCall, ToolRegistry, ToolResponse};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Response used when the caller provides an empty prompt.
const EMPTY_PROMPT_RESPONSE: &str =
    "I need a prompt to act on. Please describe what you would like me to do.";

/// Injected when the model keeps producing identical responses.
const STUCK_PROMPT: &str = "[SYSTEM] You have produced the same response several times. Do not \
repeat it again. Change strategy: use a different tool, different arguments, or give your best \
final answer with the information you already have.";

/// States of the agent loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Idle,
    Thinking,
    Executing,
    Done,
    Error,
}

/// How a run is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Plain think/act loop
    #[default]
    Act,
    /// Decompose into a plan first, then run each step
    Plan,
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

/// The structured result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Whether the run completed or hit an unrecoverable error
    pub status: RunStatus,
    /// Final response text (never empty)
    pub response: String,
    /// Every tool call requested during the run
    pub tool_calls: Vec<ToolCall>,
    /// Every tool response produced during the run
    pub tool_results: Vec<ToolResponse>,
    /// Conversation this run belongs to
    pub conversation_id: Uuid,
    /// Diagnostics collected so far
    pub diagnostic_report: DiagnosticReport,
    /// Human-readable failure summary when status is `Error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A tool-using conversational agent.
pub struct Agent {
    config: Config,
    llm: Arc<LlmClient>,
    registry: Arc<ToolRegistry>,
    executor: ToolExecutor,
    memory: RollingMemory,
    diagnostics: DiagnosticRecord,
    sanitizer: Sanitizer,
    state: AgentState,
    conversation_id: Uuid,
    pending: Vec<ToolCall>,
    sanitize_enabled: bool,
    sessions: Option<Arc<SessionManager>>,
}

impl Agent {
    /// Create an agent using the process-wide registry and cache.
    pub fn new(config: Config) -> Result<Self> {
        let llm = Arc::new(LlmClient::new(config.active_llm())?);
        Ok(Self::with_services(config, llm, global_registry(), global_cache()))
    }

    /// Create an agent over explicit services.
    pub fn with_services(
        config: Config,
        llm: Arc<LlmClient>,
        registry: Arc<ToolRegistry>,
        cache: Arc<crate::tools::ToolCache>,
    ) -> Self {
        let tokenizer = Arc::new(Tokenizer::new());
        let memory = RollingMemory::new(tokenizer, config.active_llm().model.clone(), &config.memory);
        let executor = ToolExecutor::new(registry.clone(), cache, config.tool.clone());
        let sanitizer = Sanitizer::new(config.sanitizer.canonical_name.clone());
        let sanitize_enabled = config.sanitizer.enabled;

        Agent {
            config,
            llm,
            registry,
            executor,
            memory,
            diagnostics: DiagnosticRecord::new(),
            sanitizer,
            state: AgentState::Idle,
            conversation_id: Uuid::new_v4(),
            pending: Vec::new(),
            sanitize_enabled,
            sessions: None,
        }
    }

    /// Attach a session manager so runs can be keyed by session id.
    pub fn set_session_manager(&mut self, sessions: Arc<SessionManager>) {
        self.sessions = Some(sessions);
    }

    /// Set or replace the system prompt.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.memory.add(Message::system(prompt.into()));
    }

    /// Register tools with the shared registry.
    pub fn register_tools(&self, tools: Vec<Arc<dyn Tool>>) -> Result<()> {
        for tool in tools {
            self.registry.register(tool)?;
        }
        Ok(())
    }

    /// Current loop state.
    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Conversation id of this agent.
    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// The LLM client driving this agent.
    pub fn llm(&self) -> &Arc<LlmClient> {
        &self.llm
    }

    /// Snapshot of the conversation, system prompt first.
    pub fn messages(&self) -> Vec<Message> {
        self.memory.get()
    }

    /// The system prompt, when one is set.
    pub fn system_prompt(&self) -> Option<String> {
        self.memory.system_message().map(|m| m.content.clone())
    }

    /// Replace the conversation with a restored snapshot.
    pub fn load_messages(&mut self, messages: Vec<Message>) {
        self.memory.load(messages);
    }

    /// Diagnostics collected so far.
    pub fn get_diagnostic_report(&self) -> DiagnosticReport {
        self.diagnostics.report()
    }

    /// Execute a single tool directly, bypassing the LLM.
    pub async fn execute_tool(&self, name: &str, params: Value) -> Result<Value> {
        self.executor.execute_direct(name, params).await
    }

    /// Run against a keyed session: the session is created on first use and
    /// both the prompt and the response are appended to its history.
    pub async fn run_session(
        &mut self,
        prompt: &str,
        session_id: &str,
        mode: RunMode,
    ) -> Result<RunResult> {
        let Some(sessions) = self.sessions.clone() else {
            return self.run_with_mode(prompt, mode).await;
        };

        if sessions.get(session_id, false).is_err() {
            sessions.create(session_id, None, None)?;
        }

        let result = self.run_with_mode(prompt, mode).await?;
        sessions.add_to_history(session_id, json!({"role": "user", "content": prompt}))?;
        sessions.add_to_history(
            session_id,
            json!({"role": "assistant", "content": result.response}),
        )?;
        Ok(result)
    }

    /// Reset per-run state and optionally drop a keyed session.
    pub async fn cleanup_session(&mut self, session_id: Option<&str>) {
        if let (Some(sessions), Some(id)) = (&self.sessions, session_id) {
            if let Err(e) = sessions.clear(id) {
                debug!("Session cleanup skipped: {}", e);
            }
        }
        self.cleanup().await;
    }

    /// Reset per-session state: conversation, pending calls, and stateful
    /// tools.
    pub async fn cleanup(&mut self) {
        for tool in self.registry.all() {
            tool.reset().await;
        }
        self.memory.clear();
        self.pending.clear();
        self.state = AgentState::Idle;
        self.conversation_id = Uuid::new_v4();
    }

    /// Run in the requested mode: the plain think/act loop, or plan-first.
    pub async fn run_with_mode(&mut self, prompt: &str, mode: RunMode) -> Result<RunResult> {
        match mode {
            RunMode::Act => self.run(prompt).await,
            RunMode::Plan => {
                let flow = crate::agent::planning::PlanningFlow::new(&self.config.planning);
                flow.execute(self, prompt).await
            }
        }
    }

    /// Drive the think/act loop on `prompt` until a final answer, the
    /// iteration cap, or an unrecoverable error.
    pub async fn run(&mut self, prompt: &str) -> Result<RunResult> {
        self.pending.clear();
        self.state = AgentState::Thinking;

        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut tool_results: Vec<ToolResponse> = Vec::new();

        if prompt.trim().is_empty() {
            self.state = AgentState::Done;
            return Ok(self.finish(RunStatus::Success, EMPTY_PROMPT_RESPONSE.to_string(), tool_calls, tool_results, None));
        }

        self.memory.add(Message::user(prompt));

        let deadline = self.config.agent.run_timeout.map(|t| Instant::now() + t);
        let max_iterations = self.config.agent.max_iterations.max(1);

        for iteration in 1..=max_iterations {
            info!("Agent iteration {}/{}", iteration, max_iterations);

            if deadline_expired(deadline) {
                return Ok(self.deadline_result(tool_calls, tool_results));
            }

            self.state = AgentState::Thinking;
            let outcome = match self.think(deadline).await {
                Ok(Some(outcome)) => outcome,
                Ok(None) => return Ok(self.deadline_result(tool_calls, tool_results)),
                Err(e) => return Ok(self.llm_error_result(e, tool_calls, tool_results)),
            };

            self.memory.add(outcome.message.clone());
            if outcome.extracted_free_text {
                self.memory
                    .add(Message::user(format!("[SYSTEM] {}", STRUCTURED_INTERFACE_NUDGE)));
            }

            if outcome.message.has_tool_calls() {
                self.pending = normalize_tool_calls(&outcome.message);
                tool_calls.extend(self.pending.clone());

                self.state = AgentState::Executing;
                let batch = std::mem::take(&mut self.pending);
                let responses = match self.act(&batch, deadline).await {
                    Some(responses) => responses,
                    None => return Ok(self.deadline_result(tool_calls, tool_results)),
                };

                for response in responses {
                    self.memory.add(Message::tool(
                        &response.call_id,
                        &response.tool_name,
                        response.content_for_llm(),
                    ));
                    tool_results.push(response);
                }
                continue;
            }

            if !outcome.message.content.is_empty() {
                if self.is_stuck(&outcome.message.content) {
                    // Nudge the model and give it another turn.
                    self.inject_stuck_prompt();
                    continue;
                }
                self.state = AgentState::Done;
                let response = self.present(&outcome.message.content);
                return Ok(self.finish(RunStatus::Success, response, tool_calls, tool_results, None));
            }

            // No content and no tool calls: note it and let the cap decide.
            warn!("LLM returned an empty response");
            self.diagnostics.record(
                "empty_response",
                "LLM returned neither content nor tool calls",
                Severity::Warning,
                None,
                Value::Null,
            );
        }

        self.state = AgentState::Done;
        let summary = self.bounded_completion_summary(max_iterations, &tool_results);
        Ok(self.finish(RunStatus::Success, summary, tool_calls, tool_results, None))
    }

    /// One THINKING step. `Ok(None)` means the outer deadline fired.
    async fn think(&mut self, deadline: Option<Instant>) -> Result<Option<ChatOutcome>> {
        let messages = self.memory.get();
        let tools = self.registry.definitions();
        let options = GenerationOptions {
            temperature: Some(self.config.active_llm().temperature),
            ..Default::default()
        };

        let call = self
            .llm
            .chat_with_tools(messages, tools, ToolChoice::auto(), options);

        let outcome = match remaining_time(deadline) {
            Some(remaining) => match tokio::time::timeout(remaining, call).await {
                Ok(result) => result?,
                Err(_) => return Ok(None),
            },
            None => call.await?,
        };

        self.diagnostics.record_llm_request(
            outcome.model.clone(),
            outcome.latency_ms,
            outcome.usage.as_ref().map(|u| u.total_tokens),
            self.llm.metrics().fallback_attempts,
        );

        Ok(Some(outcome))
    }

    /// One EXECUTING step over a batch of tool calls. `None` means the outer
    /// deadline fired; responses always follow the request order.
    async fn act(&mut self, batch: &[ToolCall], deadline: Option<Instant>) -> Option<Vec<ToolResponse>> {
        let run_all = async {
            match self.config.agent.execution_mode {
                ExecutionMode::Sequential => {
                    let mut outcomes = Vec::with_capacity(batch.len());
                    for call in batch {
                        outcomes.push(self.executor.execute(call).await);
                    }
                    outcomes
                }
                ExecutionMode::Parallel => {
                    futures::future::join_all(batch.iter().map(|call| self.executor.execute(call)))
                        .await
                }
            }
        };

        let outcomes = match remaining_time(deadline) {
            Some(remaining) => match tokio::time::timeout(remaining, run_all).await {
                Ok(outcomes) => outcomes,
                Err(_) => return None,
            },
            None => run_all.await,
        };

        let mut responses = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            self.diagnostics.record_tool_execution(
                outcome.response.tool_name.clone(),
                outcome.response.success,
                outcome.duration.as_millis() as u64,
                outcome.cached,
                outcome.response.error.clone(),
            );
            if !outcome.response.success {
                self.diagnostics.record(
                    "tool_execution",
                    outcome
                        .response
                        .error
                        .clone()
                        .unwrap_or_else(|| "Tool failed".into()),
                    Severity::Warning,
                    None,
                    json!({"tool": outcome.response.tool_name}),
                );
            }
            responses.push(outcome.response);
        }
        Some(responses)
    }

    fn inject_stuck_prompt(&mut self) {
        warn!("Duplicate response detected, injecting strategy-change nudge");
        self.diagnostics.record(
            "duplicate_response",
            "Model repeated an identical response",
            Severity::Warning,
            None,
            Value::Null,
        );
        self.memory.add(Message::user(STUCK_PROMPT));
    }

    /// Whether `content` matches at least `duplicate_threshold` prior
    /// assistant responses.
    fn is_stuck(&self, content: &str) -> bool {
        let threshold = self.config.agent.duplicate_threshold.max(1);
        let previous = self
            .memory
            .assistant_contents()
            .iter()
            .rev()
            .skip(1) // the message just appended
            .filter(|c| **c == content)
            .count();
        previous >= threshold
    }

    fn present(&self, content: &str) -> String {
        if self.sanitize_enabled {
            self.sanitizer.sanitize_identity(content)
        } else {
            content.to_string()
        }
    }

    fn bounded_completion_summary(&self, iterations: u32, results: &[ToolResponse]) -> String {
        let succeeded = results.iter().filter(|r| r.success).count();
        let names: Vec<&str> = results.iter().map(|r| r.tool_name.as_str()).collect();
        let tools_part = if names.is_empty() {
            "no tools were executed".to_string()
        } else {
            format!(
                "{}/{} tool calls succeeded ({})",
                succeeded,
                results.len(),
                names.join(", ")
            )
        };
        format!(
            "I reached the iteration limit ({}) before producing a final answer. Progress so far: {}. \
             Consider narrowing the request or raising the iteration limit.",
            iterations, tools_part
        )
    }

    fn deadline_result(
        &mut self,
        tool_calls: Vec<ToolCall>,
        tool_results: Vec<ToolResponse>,
    ) -> RunResult {
        warn!("Run deadline exceeded, returning partial trace");
        self.state = AgentState::Error;
        self.diagnostics.record(
            "deadline",
            "Run exceeded its configured deadline",
            Severity::Error,
            Some("deadline".into()),
            Value::Null,
        );
        self.finish(
            RunStatus::Error,
            "The run was stopped because it exceeded its deadline.".to_string(),
            tool_calls,
            tool_results,
            Some("Deadline exceeded".to_string()),
        )
    }

    fn llm_error_result(
        &mut self,
        error: Error,
        tool_calls: Vec<ToolCall>,
        tool_results: Vec<ToolResponse>,
    ) -> RunResult {
        self.state = AgentState::Error;
        let kind = match error {
            Error::ModelUnavailable(_) => "model_unavailable",
            _ => "llm_error",
        };
        self.diagnostics.record(
            kind,
            error.to_string(),
            Severity::Critical,
            None,
            Value::Null,
        );
        self.finish(
            RunStatus::Error,
            format!("I was unable to reach the language model: {}", error),
            tool_calls,
            tool_results,
            Some(error.to_string()),
        )
    }

    fn finish(
        &mut self,
        status: RunStatus,
        response: String,
        tool_calls: Vec<ToolCall>,
        tool_results: Vec<ToolResponse>,
        error: Option<String>,
    ) -> RunResult {
        debug!("Run finished with status {:?}", status);
        RunResult {
            status,
            response,
            tool_calls,
            tool_results,
            conversation_id: self.conversation_id,
            diagnostic_report: self.diagnostics.report(),
            error,
        }
    }
}

fn deadline_expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

fn remaining_time(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|d| d.saturating_duration_since(Instant::now()))
}
