//! Run diagnostics.
//!
//! An append-only record of errors plus summaries of the most recent LLM
//! request and tool execution. Owned exclusively by one agent; mutation is
//! synchronous and never suspends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity of a diagnostic entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// One recorded problem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    /// Error kind, e.g. "tool_timeout" or "llm_transport"
    pub kind: String,
    /// Human-readable message
    pub message: String,
    /// Severity classification
    pub severity: Severity,
    /// Machine-readable code when one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Free-form context (tool name, arguments, attempt number, ...)
    #[serde(skip_serializing_if = "Value::is_null", default)]
    pub context: Value,
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
}

/// Summary of the most recent LLM request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequestSummary {
    /// Model the request targeted
    pub model: String,
    /// Wall-clock latency
    pub latency_ms: u64,
    /// Total tokens reported by the backend, when available
    pub total_tokens: Option<u32>,
    /// Fallback switches performed so far
    pub fallback_attempts: u32,
    /// When the request completed
    pub timestamp: DateTime<Utc>,
}

/// Summary of the most recent tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionSummary {
    /// Tool that ran
    pub tool_name: String,
    /// Whether it succeeded
    pub success: bool,
    /// Wall-clock duration
    pub duration_ms: u64,
    /// Whether the result came from cache
    pub cached: bool,
    /// Error message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the execution finished
    pub timestamp: DateTime<Utc>,
}

/// Snapshot handed back to callers in run results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticReport {
    /// Recorded errors, in order
    pub entries: Vec<DiagnosticEntry>,
    /// Last LLM request, if any was made
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_llm_request: Option<LlmRequestSummary>,
    /// Last tool execution, if any ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tool_execution: Option<ToolExecutionSummary>,
}

/// Mutable diagnostic state owned by one agent
#[derive(Debug, Default)]
pub struct DiagnosticRecord {
    report: DiagnosticReport,
}

impl DiagnosticRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an error entry.
    pub fn record(
        &mut self,
        kind: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        code: Option<String>,
        context: Value,
    ) {
        self.report.entries.push(DiagnosticEntry {
            kind: kind.into(),
            message: message.into(),
            severity,
            code,
            context,
            timestamp: Utc::now(),
        });
    }

    /// Update the last-LLM-request summary.
    pub fn record_llm_request(
        &mut self,
        model: impl Into<String>,
        latency_ms: u64,
        total_tokens: Option<u32>,
        fallback_attempts: u32,
    ) {
        self.report.last_llm_request = Some(LlmRequestSummary {
            model: model.into(),
            latency_ms,
            total_tokens,
            fallback_attempts,
            timestamp: Utc::now(),
        });
    }

    /// Update the last-tool-execution summary.
    pub fn record_tool_execution(
        &mut self,
        tool_name: impl Into<String>,
        success: bool,
        duration_ms: u64,
        cached: bool,
        error: Option<String>,
    ) {
        self.report.last_tool_execution = Some(ToolExecutionSummary {
            tool_name: tool_name.into(),
            success,
            duration_ms,
            cached,
            error,
            timestamp: Utc::now(),
        });
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.report.entries.len()
    }

    /// Whether no entries have been recorded.
    pub fn is_empty(&self) -> bool {
        self.report.entries.is_empty()
    }

    /// Snapshot for inclusion in a run result.
    pub fn report(&self) -> DiagnosticReport {
        self.report.clone()
    }

    /// Drop all recorded state.
    pub fn clear(&mut self) {
        self.report = DiagnosticReport::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entries_are_ordered() {
        let mut record = DiagnosticRecord::new();
        record.record("first", "a", Severity::Warning, None, Value::Null);
        record.record(
            "second",
            "b",
            Severity::Error,
            Some("E42".into()),
            json!({"tool": "time"}),
        );

        let report = record.report();
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].kind, "first");
        assert_eq!(report.entries[1].code.as_deref(), Some("E42"));
    }

    #[test]
    fn summaries_track_the_latest_event() {
        let mut record = DiagnosticRecord::new();
        record.record_llm_request("gpt-4o", 120, Some(300), 0);
        record.record_llm_request("gpt-4o", 80, Some(150), 1);
        record.record_tool_execution("time", true, 5, false, None);

        let report = record.report();
        assert_eq!(report.last_llm_request.unwrap().fallback_attempts, 1);
        assert!(report.last_tool_execution.unwrap().success);
    }

    #[test]
    fn clear_resets_everything() {
        let mut record = DiagnosticRecord::new();
        record.record("k", "m", Severity::Info, None, Value::Null);
        record.clear();
        assert!(record.is_empty());
        assert!(record.report().last_llm_request.is_none());
    }
}
