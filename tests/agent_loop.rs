//! End-to-end agent loop scenarios against a mock chat-completions server.

use agentcore::agent::{Agent, LlmClient, ModelStatusCache, RunMode, RunStatus};
use agentcore::config::{Config, ExecutionMode, LlmConfig};
use agentcore::error::Result;
use agentcore::tools::{Tool, ToolCache, ToolRegistry};
use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestTimeTool;

#[async_trait]
impl Tool for TestTimeTool {
    fn name(&self) -> &str {
        "time"
    }
    fn description(&self) -> &str {
        "Get the current time"
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }
    async fn run(&self, _args: Value) -> Result<Value> {
        Ok(json!("12:00"))
    }
}

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Echo the given text"
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {"text": {"type": "string"}}})
    }
    async fn run(&self, args: Value) -> Result<Value> {
        Ok(args["text"].clone())
    }
}

fn agent_for(server: &MockServer, mutate: impl FnOnce(&mut Config)) -> Agent {
    let mut config = Config::default();
    let llm_config = LlmConfig {
        api_key: SecretString::from("test-key"),
        model: "test-model".to_string(),
        api_base: server.uri(),
        max_retries: 1,
        ..Default::default()
    };
    config.llm.insert("openai".to_string(), llm_config.clone());
    mutate(&mut config);

    let llm = Arc::new(
        LlmClient::with_status_cache(llm_config, Arc::new(ModelStatusCache::new())).unwrap(),
    );
    Agent::with_services(
        config,
        llm,
        Arc::new(ToolRegistry::new()),
        Arc::new(ToolCache::default()),
    )
}

fn text_response(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "cmpl-1",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
    }))
}

fn tool_call_response(calls: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "cmpl-2",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": null, "tool_calls": calls},
            "finish_reason": "tool_calls"
        }]
    }))
}

/// Scenario: a prompt with no tools registered resolves in exactly one LLM
/// call with an empty tool trace.
#[tokio::test]
async fn direct_answer_uses_one_llm_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(text_response("Hello"))
        .mount(&server)
        .await;

    let mut agent = agent_for(&server, |_| {});
    let result = agent.run("Say hello in one word.").await.unwrap();

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.response, "Hello");
    assert!(result.tool_calls.is_empty());
    assert!(result.tool_results.is_empty());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

/// Scenario: one structured tool call is executed and its result reaches
/// the final answer, with matching call/response ids.
#[tokio::test]
async fn single_tool_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(tool_call_response(json!([{
            "id": "call_1",
            "type": "function",
            "function": {"name": "time", "arguments": "{}"}
        }])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(text_response("The time is 12:00."))
        .mount(&server)
        .await;

    let mut agent = agent_for(&server, |_| {});
    agent.register_tools(vec![Arc::new(TestTimeTool)]).unwrap();

    let result = agent.run("What time is it?").await.unwrap();

    assert_eq!(result.status, RunStatus::Success);
    assert!(result.response.contains("12:00"));
    assert_eq!(result.tool_calls.len(), 1);
    assert_eq!(result.tool_results.len(), 1);
    assert_eq!(result.tool_calls[0].id, result.tool_results[0].call_id);
    assert_eq!(result.tool_results[0].result, Some(json!("12:00")));
    assert!(result.tool_results[0].success);
}

/// Scenario: a free-text `[TOOL_REQUEST]` is extracted, gets a fresh id,
/// and the loop continues as if the call had been structured.
#[tokio::test]
async fn free_text_tool_request_is_recovered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(text_response(
            r#"I'll check. [TOOL_REQUEST]{"name":"time","arguments":{}}[END_TOOL_REQUEST]"#,
        ))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(text_response("It is 12:00."))
        .mount(&server)
        .await;

    let mut agent = agent_for(&server, |_| {});
    agent.register_tools(vec![Arc::new(TestTimeTool)]).unwrap();

    let result = agent.run("What time is it?").await.unwrap();

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.tool_calls.len(), 1);
    assert!(result.tool_calls[0].id.starts_with("call_"));
    assert_eq!(result.tool_calls[0].arguments, json!({}));
    assert_eq!(result.tool_results.len(), 1);
    assert!(result.tool_results[0].success);
}

/// Parallel batches preserve request order and capture individual failures
/// without aborting the batch.
#[tokio::test]
async fn parallel_batch_preserves_order_and_captures_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(tool_call_response(json!([
            {"id": "call_a", "type": "function",
             "function": {"name": "echo", "arguments": "{\"text\": \"first\"}"}},
            {"id": "call_b", "type": "function",
             "function": {"name": "no_such_tool", "arguments": "{}"}},
            {"id": "call_c", "type": "function",
             "function": {"name": "echo", "arguments": "{\"text\": \"third\"}"}}
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(text_response("done"))
        .mount(&server)
        .await;

    let mut agent = agent_for(&server, |config| {
        config.agent.execution_mode = ExecutionMode::Parallel;
    });
    agent.register_tools(vec![Arc::new(EchoTool)]).unwrap();

    let result = agent.run("run the batch").await.unwrap();

    assert_eq!(result.tool_results.len(), 3);
    assert_eq!(result.tool_results[0].call_id, "call_a");
    assert_eq!(result.tool_results[1].call_id, "call_b");
    assert_eq!(result.tool_results[2].call_id, "call_c");
    assert!(result.tool_results[0].success);
    assert!(!result.tool_results[1].success);
    assert!(result.tool_results[2].success);
    assert_eq!(result.status, RunStatus::Success);
}

/// The iteration cap always fires and yields a non-empty bounded-completion
/// summary.
#[tokio::test]
async fn iteration_cap_produces_bounded_summary() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(tool_call_response(json!([{
            "id": "call_loop",
            "type": "function",
            "function": {"name": "time", "arguments": "{}"}
        }])))
        .mount(&server)
        .await;

    let mut agent = agent_for(&server, |config| {
        config.agent.max_iterations = 2;
    });
    agent.register_tools(vec![Arc::new(TestTimeTool)]).unwrap();

    let result = agent.run("loop forever").await.unwrap();

    assert_eq!(result.status, RunStatus::Success);
    assert!(!result.response.is_empty());
    assert!(result.response.contains("iteration limit"));
    assert_eq!(result.tool_results.len(), 2);
}

/// Unparseable tool-call arguments are kept verbatim and surfaced to the
/// model as a failing tool response instead of being dropped.
#[tokio::test]
async fn malformed_arguments_are_surfaced_not_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(tool_call_response(json!([{
            "id": "call_bad",
            "type": "function",
            "function": {"name": "echo", "arguments": "{broken json"}
        }])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(text_response("I will correct the call."))
        .mount(&server)
        .await;

    let mut agent = agent_for(&server, |_| {});
    agent.register_tools(vec![Arc::new(EchoTool)]).unwrap();

    let result = agent.run("echo something").await.unwrap();

    assert_eq!(result.tool_calls.len(), 1);
    assert!(result.tool_calls[0].parse_error.is_some());
    assert_eq!(result.tool_results.len(), 1);
    assert!(!result.tool_results[0].success);
    assert_eq!(result.status, RunStatus::Success);
}

/// Scenario: planning decomposes the prompt, blocks on a failing step, and
/// the fallback roll-up reports per-step status.
#[tokio::test]
async fn planning_reports_blocked_step() {
    let server = MockServer::start().await;
    // Plan creation.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(text_response(
            r#"["Write the function", "Test the function", "Deploy the function"]"#,
        ))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    // Steps 1 and 2 complete.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(text_response("Step finished."))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    // Step 3 and the summary request both fail, forcing the structured
    // roll-up fallback.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend exploded"))
        .mount(&server)
        .await;

    let mut agent = agent_for(&server, |_| {});
    let result = agent.run_with_mode("Write and test an adder", RunMode::Plan).await.unwrap();

    assert_eq!(result.status, RunStatus::Success);
    assert!(result.response.contains("2/3 steps completed"));
    assert!(result.response.contains("[!]"));
    assert!(result.response.contains("Deploy the function"));
}

/// Planning falls back to the default three-step plan when the model's plan
/// is unparseable.
#[tokio::test]
async fn planning_falls_back_to_default_plan() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(text_response("Sure! Here is my plan, in prose."))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(text_response("Step done."))
        .mount(&server)
        .await;

    let mut agent = agent_for(&server, |_| {});
    let result = agent.run_with_mode("Do the thing", RunMode::Plan).await.unwrap();

    assert_eq!(result.status, RunStatus::Success);
    // Default plan has three steps; each run answers "Step done." and the
    // summary reuses the same mock.
    assert!(!result.response.is_empty());
}
