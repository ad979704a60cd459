//! Tool execution pipeline.
//!
//! One call travels: argument decoding, JSON-Schema validation (with cheap
//! argument fixes), adaptive timeout computation, cache lookup, execution,
//! and a recovery ladder for timeouts and errors. Failures surface as
//! failing [`ToolResponse`]s so the model can react; they never abort the
//! agent loop.

use crate::config::ToolConfig;
use crate::error::{Error, Result};
use crate::tools::{Tool, ToolCache, ToolCall, ToolRegistry, ToolResponse};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Hard bounds on the effective timeout, in seconds.
const MIN_TIMEOUT_SECS: f64 = 5.0;
const MAX_TIMEOUT_SECS: f64 = 180.0;

/// A completed execution with metadata for diagnostics.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// The response fed back to the model
    pub response: ToolResponse,
    /// Whether the result came from cache
    pub cached: bool,
    /// Wall-clock duration of the whole pipeline
    pub duration: Duration,
}

/// Executes tool calls against a registry with caching and recovery.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    cache: Arc<ToolCache>,
    config: ToolConfig,
}

impl ToolExecutor {
    /// Create an executor over `registry` with the process-wide cache.
    pub fn new(registry: Arc<ToolRegistry>, cache: Arc<ToolCache>, config: ToolConfig) -> Self {
        ToolExecutor {
            registry,
            cache,
            config,
        }
    }

    /// Execute one tool call end to end. Never returns an error; failures
    /// become failing responses.
    pub async fn execute(&self, call: &ToolCall) -> ExecutionOutcome {
        let started = Instant::now();
        let response = self.execute_inner(call).await;
        ExecutionOutcome {
            cached: matches!(response, InnerOutcome::Cached(_)),
            response: response.into_response(),
            duration: started.elapsed(),
        }
    }

    /// Execute a tool by name with already-decoded parameters, returning the
    /// raw value. Used by the public `execute_tool` API.
    pub async fn execute_direct(&self, name: &str, params: Value) -> Result<Value> {
        let call = ToolCall::new(
            format!("call_{}", uuid::Uuid::new_v4().simple()),
            name,
            params,
        );
        let outcome = self.execute(&call).await;
        match outcome.response.result {
            Some(value) if outcome.response.success => Ok(value),
            _ => Err(Error::ToolExecution(
                outcome.response.error.unwrap_or_else(|| "Tool failed".into()),
            )),
        }
    }

    async fn execute_inner(&self, call: &ToolCall) -> InnerOutcome {
        // Resolve first so the model learns about unknown tools.
        let tool = match self.registry.get(&call.name) {
            Ok(tool) => tool,
            Err(_) => {
                let known = self.registry.names().join(", ");
                return InnerOutcome::Failed(ToolResponse::failure(
                    &call.id,
                    &call.name,
                    format!("Tool '{}' not found. Available tools: {}", call.name, known),
                ));
            }
        };

        let args = match decode_arguments(&call.arguments) {
            Ok(args) => args,
            Err(e) => {
                return InnerOutcome::Failed(ToolResponse::failure(&call.id, &call.name, e.to_string()))
            }
        };

        let schema = tool.parameters_schema();
        let args = match validate_arguments(&schema, args) {
            Ok(args) => args,
            Err(e) => {
                return InnerOutcome::Failed(ToolResponse::failure(&call.id, &call.name, e.to_string()))
            }
        };

        let base = tool.timeout().unwrap_or(self.config.default_timeout);
        let avg = self.registry.average_execution_time(&call.name);
        let effective = compute_timeout(base, avg, &args);
        debug!(
            "Executing tool {} with effective timeout {:?}",
            call.name, effective
        );

        if self.config.enable_caching {
            if let Some(value) = self.cache_lookup(tool.as_ref(), &call.name, &args) {
                info!("Cache hit for tool {}", call.name);
                return InnerOutcome::Cached(ToolResponse::success(&call.id, &call.name, value));
            }
        }

        let run_started = Instant::now();
        let result = tokio::time::timeout(effective, tool.run(args.clone())).await;

        let value = match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => self.recover_error(tool.as_ref(), &call.name, &args, error, effective).await,
            Err(_) => self.recover_timeout(tool.as_ref(), &call.name, &args, effective).await,
        };

        match value {
            Ok(value) => {
                let duration = run_started.elapsed();
                self.registry.record_execution(&call.name, duration);
                if self.config.enable_caching {
                    self.cache_store(tool.as_ref(), &call.name, &args, &value);
                }
                InnerOutcome::Ran(ToolResponse::success(&call.id, &call.name, value))
            }
            Err(e) => InnerOutcome::Failed(ToolResponse::failure(&call.id, &call.name, e.to_string())),
        }
    }

    /// Timeout recovery: tool hook first, then one retry with simplified
    /// arguments under 75% of the original timeout.
    async fn recover_timeout(
        &self,
        tool: &dyn Tool,
        name: &str,
        args: &Value,
        effective: Duration,
    ) -> Result<Value> {
        warn!("Tool {} timed out after {:?}", name, effective);

        if let Some(value) = tool.recover_from_timeout(args).await {
            info!("Tool {} recovered from timeout via its own hook", name);
            return Ok(value);
        }

        let simplified = simplify_arguments(args);
        if simplified != *args {
            let retry_timeout = effective.mul_f64(0.75);
            debug!("Retrying {} with simplified arguments", name);
            if let Ok(Ok(value)) = tokio::time::timeout(retry_timeout, tool.run(simplified)).await {
                return Ok(value);
            }
        }

        Err(Error::ToolTimeout(format!(
            "Tool '{}' timed out after {:.1}s and recovery failed",
            name,
            effective.as_secs_f64()
        )))
    }

    /// Error recovery: tool hook, a fixed 60 s retry for network-flavoured
    /// errors, and argument fixes for validation-flavoured ones.
    async fn recover_error(
        &self,
        tool: &dyn Tool,
        name: &str,
        args: &Value,
        error: Error,
        effective: Duration,
    ) -> Result<Value> {
        warn!("Tool {} failed: {}", name, error);

        if let Some(value) = tool.recover_from_error(args, &error).await {
            info!("Tool {} recovered from error via its own hook", name);
            return Ok(value);
        }

        let message = error.to_string().to_lowercase();

        if message.contains("connection") || message.contains("timeout") || message.contains("network")
        {
            let retry_timeout = Duration::from_secs(60);
            if let Ok(Ok(value)) = tokio::time::timeout(retry_timeout, tool.run(args.clone())).await
            {
                return Ok(value);
            }
        } else if message.contains("argument")
            || message.contains("parameter")
            || message.contains("invalid")
            || message.contains("required")
        {
            let fixed = fix_common_argument_errors(args, &tool.parameters_schema());
            if fixed != *args {
                if let Ok(Ok(value)) = tokio::time::timeout(effective, tool.run(fixed)).await {
                    return Ok(value);
                }
            }
        }

        Err(error)
    }

    fn cache_lookup(&self, tool: &dyn Tool, name: &str, args: &Value) -> Option<Value> {
        if let Some(instance) = tool.instance_cache() {
            if let Some(value) = instance.get(name, args) {
                return Some(value);
            }
        }
        self.cache.get(name, args)
    }

    fn cache_store(&self, tool: &dyn Tool, name: &str, args: &Value, value: &Value) {
        let ttl = tool.cache_ttl();
        if let Some(instance) = tool.instance_cache() {
            instance.set(name, args, value.clone(), ttl);
        }
        self.cache.set(name, args, value.clone(), ttl);
    }
}

enum InnerOutcome {
    Ran(ToolResponse),
    Cached(ToolResponse),
    Failed(ToolResponse),
}

impl InnerOutcome {
    fn into_response(self) -> ToolResponse {
        match self {
            InnerOutcome::Ran(r) | InnerOutcome::Cached(r) | InnerOutcome::Failed(r) => r,
        }
    }
}

/// Decode the argument payload into a JSON object.
fn decode_arguments(arguments: &Value) -> Result<Value> {
    match arguments {
        Value::Object(_) => Ok(arguments.clone()),
        Value::Null => Ok(Value::Object(Map::new())),
        Value::String(raw) if raw.trim().is_empty() => Ok(Value::Object(Map::new())),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(Value::Object(map)),
            _ => Err(Error::InvalidToolArgument(format!(
                "Arguments are not a JSON object: {}",
                raw
            ))),
        },
        other => Err(Error::InvalidToolArgument(format!(
            "Arguments must be an object, got: {}",
            other
        ))),
    }
}

/// Validate against the tool's schema; on failure apply the cheap fixes
/// (digit strings to integers, missing required fields to empty strings) and
/// validate once more.
fn validate_arguments(schema: &Value, args: Value) -> Result<Value> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(v) => v,
        // A broken schema must not block the tool; registration validated shape.
        Err(e) => {
            warn!("Unusable parameter schema, skipping validation: {}", e);
            return Ok(args);
        }
    };

    if validator.is_valid(&args) {
        return Ok(args);
    }

    let fixed = fix_common_argument_errors(&args, schema);
    if fixed != args && validator.is_valid(&fixed) {
        debug!("Arguments accepted after cheap fixes");
        return Ok(fixed);
    }

    let detail = validator
        .iter_errors(&args)
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    Err(Error::InvalidToolArgument(detail))
}

/// The enumerated cheap fixes: digit-only strings become integers and
/// required fields missing from the arguments are added as empty strings.
fn fix_common_argument_errors(args: &Value, schema: &Value) -> Value {
    let Some(map) = args.as_object() else {
        return args.clone();
    };

    let mut fixed = map.clone();
    for value in fixed.values_mut() {
        if let Value::String(s) = value {
            if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(n) = s.parse::<i64>() {
                    *value = Value::from(n);
                }
            }
        }
    }

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            fixed
                .entry(field.to_string())
                .or_insert_with(|| Value::String(String::new()));
        }
    }

    Value::Object(fixed)
}

/// Reduce argument weight for a timeout retry: long strings truncated to
/// 1000 chars, lists capped at 5 items, count-like integers capped at 5.
fn simplify_arguments(args: &Value) -> Value {
    let Some(map) = args.as_object() else {
        return args.clone();
    };

    let mut simplified = map.clone();
    for (key, value) in simplified.iter_mut() {
        match value {
            Value::String(s) if s.chars().count() > 1000 => {
                *s = s.chars().take(1000).collect();
            }
            Value::Array(items) if items.len() > 5 => {
                items.truncate(5);
            }
            Value::Number(_)
                if matches!(key.as_str(), "limit" | "max_results" | "size" | "count") =>
            {
                if let Some(v) = value.as_i64() {
                    *value = Value::from(v.min(5));
                }
            }
            _ => {}
        }
    }
    Value::Object(simplified)
}

/// Effective timeout: declared base adjusted by execution history, scaled by
/// argument complexity, clamped to [5, 180] s, rounded to 0.1 s.
fn compute_timeout(base: Duration, avg: Option<Duration>, args: &Value) -> Duration {
    let mut base_secs = base.as_secs_f64();

    if let Some(avg) = avg {
        let avg_secs = avg.as_secs_f64();
        if avg_secs > 0.0 {
            base_secs = (base_secs / 2.0).max((base_secs * 1.5).min(avg_secs * 2.0));
        }
    }

    let mut factor = 1.0;
    if let Some(size) = args.get("size").and_then(Value::as_i64) {
        if size > 1000 {
            factor += (size as f64 / 5000.0).min(1.0);
        }
    }
    if let Some(depth) = args.get("depth").and_then(Value::as_i64) {
        if depth > 3 {
            factor += 0.2 * ((depth - 3).min(5) as f64);
        }
    }
    if let Some(map) = args.as_object() {
        for value in map.values() {
            if let Some(s) = value.as_str() {
                if s.len() > 5000 {
                    factor += (s.len() as f64 / 20000.0).min(0.5);
                }
            }
        }
    }

    let timeout = (base_secs * factor).clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);
    Duration::from_secs_f64((timeout * 10.0).round() / 10.0)
}
