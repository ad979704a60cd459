//! Planning flow.
//!
//! Decomposes a prompt into a linear plan, drives the agent across the
//! steps, and aggregates the step outputs into a summary. A step that fails
//! is marked blocked; by default the remaining steps are abandoned.

use crate::agent::agent::{Agent, RunResult, RunStatus};
use crate::agent::types::{GenerationOptions, Message};
use crate::config::PlanningConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

const PLAN_SYSTEM_PROMPT: &str = "You are a planning assistant. Break the user's task into a \
short sequence of concrete, actionable steps. Respond with a JSON array of step description \
strings and nothing else. Focus on key milestones rather than detailed sub-steps.";

const SUMMARY_SYSTEM_PROMPT: &str = "You summarise the outcome of a multi-step task execution. \
Write a concise report of what was accomplished, what failed, and what remains. Plain prose, \
no headings.";

const DEFAULT_PLAN_STEPS: [&str; 3] = ["Analyse request", "Execute task", "Verify results"];

/// Status of one plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    NotStarted,
    InProgress,
    Completed,
    Blocked,
}

impl StepStatus {
    fn marker(&self) -> &'static str {
        match self {
            StepStatus::NotStarted => "[ ]",
            StepStatus::InProgress => "[>]",
            StepStatus::Completed => "[x]",
            StepStatus::Blocked => "[!]",
        }
    }
}

/// A linear execution plan with per-step bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Plan id
    pub id: Uuid,
    /// Human-readable title
    pub title: String,
    /// Ordered step descriptions
    pub steps: Vec<String>,
    /// Status of each step, parallel to `steps`
    pub step_statuses: Vec<StepStatus>,
    /// Notes (outputs or errors) per step, parallel to `steps`
    pub step_notes: Vec<String>,
    /// Index of the step currently (or most recently) driven
    pub current_step_index: usize,
}

impl Plan {
    /// Create a plan with every step not started.
    pub fn new(title: impl Into<String>, steps: Vec<String>) -> Self {
        let count = steps.len();
        Plan {
            id: Uuid::new_v4(),
            title: title.into(),
            steps,
            step_statuses: vec![StepStatus::NotStarted; count],
            step_notes: vec![String::new(); count],
            current_step_index: 0,
        }
    }

    /// Mark a step in progress. Any other in-progress step is a logic error,
    /// so it is demoted first to keep the single-in-progress invariant.
    pub fn mark_in_progress(&mut self, index: usize) {
        for status in self.step_statuses.iter_mut() {
            if *status == StepStatus::InProgress {
                *status = StepStatus::NotStarted;
            }
        }
        if let Some(status) = self.step_statuses.get_mut(index) {
            *status = StepStatus::InProgress;
        }
        self.current_step_index = self.current_step_index.max(index);
    }

    /// Mark a step completed with its output note.
    pub fn mark_completed(&mut self, index: usize, note: impl Into<String>) {
        if let Some(status) = self.step_statuses.get_mut(index) {
            *status = StepStatus::Completed;
        }
        if let Some(slot) = self.step_notes.get_mut(index) {
            *slot = note.into();
        }
    }

    /// Mark a step blocked with the error that stopped it.
    pub fn mark_blocked(&mut self, index: usize, note: impl Into<String>) {
        if let Some(status) = self.step_statuses.get_mut(index) {
            *status = StepStatus::Blocked;
        }
        if let Some(slot) = self.step_notes.get_mut(index) {
            *slot = note.into();
        }
    }

    /// Number of completed steps.
    pub fn completed_count(&self) -> usize {
        self.step_statuses
            .iter()
            .filter(|s| **s == StepStatus::Completed)
            .count()
    }

    /// Render the plan with status markers, for step prompts and roll-ups.
    pub fn status_text(&self) -> String {
        let mut lines = vec![format!("Plan: {}", self.title)];
        for (i, step) in self.steps.iter().enumerate() {
            lines.push(format!("{} {}. {}", self.step_statuses[i].marker(), i + 1, step));
        }
        lines.join("\n")
    }
}

/// Drives a plan across the agent.
pub struct PlanningFlow {
    continue_on_failure: bool,
}

impl PlanningFlow {
    /// Create a flow from the planning configuration.
    pub fn new(config: &PlanningConfig) -> Self {
        PlanningFlow {
            continue_on_failure: config.continue_on_failure,
        }
    }

    /// Plan, execute each step with the agent, and summarise.
    pub async fn execute(&self, agent: &mut Agent, prompt: &str) -> Result<RunResult> {
        let mut plan = self.create_plan(agent, prompt).await;
        info!("Executing plan '{}' with {} steps", plan.title, plan.steps.len());

        let mut tool_calls = Vec::new();
        let mut tool_results = Vec::new();

        for index in 0..plan.steps.len() {
            plan.mark_in_progress(index);
            let step_prompt = format!(
                "You are executing one step of a larger plan.\n\n{}\n\nCurrent step: {}\n\n\
                 Complete this step now and report the outcome.",
                plan.status_text(),
                plan.steps[index]
            );

            let result = agent.run(&step_prompt).await?;
            tool_calls.extend(result.tool_calls);
            tool_results.extend(result.tool_results);

            match result.status {
                RunStatus::Success => {
                    plan.mark_completed(index, result.response);
                }
                RunStatus::Error => {
                    let note = result
                        .error
                        .unwrap_or_else(|| "Step failed without detail".into());
                    warn!("Plan step {} blocked: {}", index + 1, note);
                    plan.mark_blocked(index, note);
                    if !self.continue_on_failure {
                        break;
                    }
                }
            }
        }

        let response = if plan.completed_count() == 0 {
            "Failed to complete any steps in the plan.".to_string()
        } else {
            self.summarize(agent, &plan).await
        };

        Ok(RunResult {
            status: RunStatus::Success,
            response,
            tool_calls,
            tool_results,
            conversation_id: agent.conversation_id(),
            diagnostic_report: agent.get_diagnostic_report(),
            error: None,
        })
    }

    /// Ask the LLM for a JSON step list; fall back to the default plan.
    async fn create_plan(&self, agent: &Agent, prompt: &str) -> Plan {
        let title = plan_title(prompt);
        let request = vec![
            Message::system(PLAN_SYSTEM_PROMPT),
            Message::user(format!(
                "Create a plan with clear steps to accomplish the task: {}",
                prompt
            )),
        ];

        let steps = match agent
            .llm()
            .complete(request, GenerationOptions::precise())
            .await
        {
            Ok((content, _)) => parse_steps(&content),
            Err(e) => {
                warn!("Plan creation failed ({}), using default plan", e);
                None
            }
        };

        let steps = steps.unwrap_or_else(|| {
            warn!("Could not parse plan steps, using default plan");
            DEFAULT_PLAN_STEPS.iter().map(|s| s.to_string()).collect()
        });

        Plan::new(title, steps)
    }

    /// LLM-enhanced summary, with a structured roll-up as the fallback.
    async fn summarize(&self, agent: &Agent, plan: &Plan) -> String {
        let rollup = structured_rollup(plan);
        let request = vec![
            Message::system(SUMMARY_SYSTEM_PROMPT),
            Message::user(rollup.clone()),
        ];
        match agent
            .llm()
            .complete(request, GenerationOptions::balanced())
            .await
        {
            Ok((content, _)) if !content.trim().is_empty() => content,
            _ => rollup,
        }
    }
}

fn plan_title(prompt: &str) -> String {
    let mut title: String = prompt.chars().take(50).collect();
    if prompt.chars().count() > 50 {
        title.push_str("...");
    }
    format!("Plan for: {}", title)
}

/// Parse a JSON array of step strings, tolerating a fenced code block and
/// the usual model JSON mistakes.
fn parse_steps(content: &str) -> Option<Vec<String>> {
    let trimmed = content.trim();
    let body = if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        rest.trim().strip_suffix("```").unwrap_or(rest).trim()
    } else {
        trimmed
    };

    let repaired = crate::agent::sanitizer::validate_json(body)?;
    let steps: Vec<String> = serde_json::from_str(&repaired).ok()?;
    let steps: Vec<String> = steps
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if steps.is_empty() {
        None
    } else {
        Some(steps)
    }
}

fn structured_rollup(plan: &Plan) -> String {
    let mut lines = vec![format!(
        "{} — {}/{} steps completed.",
        plan.title,
        plan.completed_count(),
        plan.steps.len()
    )];
    for (i, step) in plan.steps.iter().enumerate() {
        let status = plan.step_statuses[i];
        let note = &plan.step_notes[i];
        if note.is_empty() {
            lines.push(format!("{} {}", status.marker(), step));
        } else {
            lines.push(format!("{} {}: {}", status.marker(), step, note));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_vectors_stay_parallel() {
        let mut plan = Plan::new("t", vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(plan.steps.len(), plan.step_statuses.len());
        assert_eq!(plan.steps.len(), plan.step_notes.len());

        plan.mark_in_progress(0);
        plan.mark_completed(0, "done");
        plan.mark_blocked(1, "broken");
        assert_eq!(plan.steps.len(), plan.step_statuses.len());
        assert_eq!(plan.steps.len(), plan.step_notes.len());
        assert_eq!(plan.step_notes[1], "broken");
    }

    #[test]
    fn only_one_step_in_progress() {
        let mut plan = Plan::new("t", vec!["a".into(), "b".into()]);
        plan.mark_in_progress(0);
        plan.mark_in_progress(1);

        let in_progress = plan
            .step_statuses
            .iter()
            .filter(|s| **s == StepStatus::InProgress)
            .count();
        assert_eq!(in_progress, 1);
        assert_eq!(plan.step_statuses[1], StepStatus::InProgress);
    }

    #[test]
    fn current_step_index_is_monotone() {
        let mut plan = Plan::new("t", vec!["a".into(), "b".into(), "c".into()]);
        plan.mark_in_progress(2);
        plan.mark_in_progress(0);
        assert_eq!(plan.current_step_index, 2);
    }

    #[test]
    fn parse_steps_accepts_plain_and_fenced_json() {
        assert_eq!(
            parse_steps(r#"["one", "two"]"#).unwrap(),
            vec!["one".to_string(), "two".to_string()]
        );
        assert_eq!(
            parse_steps("```json\n[\"one\"]\n```").unwrap(),
            vec!["one".to_string()]
        );
        assert!(parse_steps("no json here").is_none());
        assert!(parse_steps(r#"[]"#).is_none());
    }

    #[test]
    fn parse_steps_repairs_sloppy_json() {
        assert_eq!(
            parse_steps(r#"['one', 'two',]"#).unwrap(),
            vec!["one".to_string(), "two".to_string()]
        );
    }

    #[test]
    fn rollup_reports_status_and_notes() {
        let mut plan = Plan::new("Plan for: test", vec!["a".into(), "b".into()]);
        plan.mark_completed(0, "output a");
        plan.mark_blocked(1, "tool error");

        let rollup = structured_rollup(&plan);
        assert!(rollup.contains("1/2 steps completed"));
        assert!(rollup.contains("[x] a: output a"));
        assert!(rollup.contains("[!] b: tool error"));
    }
}
