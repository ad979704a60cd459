//! Tool registry - manages available tools for the agent

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::agent::types::ToolDefinition;
use crate::error::{Error, Result};
use crate::tools::traits::Tool;

/// Usage metrics for a registered tool.
#[derive(Debug, Clone, Default)]
pub struct ToolMetrics {
    /// Number of completed executions
    pub calls: u64,
    /// Total execution time across all calls
    pub total_execution_time: Duration,
    /// Running average execution time
    pub average_execution_time: Duration,
    /// When the tool last ran
    pub last_called: Option<DateTime<Utc>>,
    /// When the tool was registered
    pub registered_at: Option<DateTime<Utc>>,
}

struct Registered {
    tool: Arc<dyn Tool>,
    metrics: ToolMetrics,
}

/// Thread-safe registry of tools by unique name.
pub struct ToolRegistry {
    tools: Mutex<HashMap<String, Registered>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        ToolRegistry {
            tools: Mutex::new(HashMap::new()),
        }
    }

    /// Register a tool. Fails with [`Error::DuplicateTool`] when the name is
    /// taken and [`Error::ToolValidation`] when the tool is malformed.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if name.is_empty() {
            return Err(Error::ToolValidation("Tool name must not be empty".into()));
        }
        if tool.description().is_empty() {
            return Err(Error::ToolValidation(format!(
                "Tool '{}' must have a description",
                name
            )));
        }
        if !tool.parameters_schema().is_object() {
            return Err(Error::ToolValidation(format!(
                "Tool '{}' parameter schema must be a JSON object",
                name
            )));
        }

        let mut tools = self.tools.lock();
        if tools.contains_key(&name) {
            return Err(Error::DuplicateTool(format!(
                "Tool '{}' is already registered",
                name
            )));
        }

        tools.insert(
            name.clone(),
            Registered {
                tool,
                metrics: ToolMetrics {
                    registered_at: Some(Utc::now()),
                    ..Default::default()
                },
            },
        );
        info!("Registered tool: {}", name);
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.tools
            .lock()
            .get(name)
            .map(|r| r.tool.clone())
            .ok_or_else(|| Error::ToolNotFound(format!("Tool '{}' not found in registry", name)))
    }

    /// Remove a tool from the registry
    pub fn unregister(&self, name: &str) -> Result<()> {
        if self.tools.lock().remove(name).is_none() {
            return Err(Error::ToolNotFound(format!(
                "Cannot unregister non-existent tool: {}",
                name
            )));
        }
        info!("Unregistered tool: {}", name);
        Ok(())
    }

    /// Record one completed execution against the tool's metrics.
    pub fn record_execution(&self, name: &str, duration: Duration) {
        if let Some(registered) = self.tools.lock().get_mut(name) {
            let metrics = &mut registered.metrics;
            metrics.calls += 1;
            metrics.total_execution_time += duration;
            metrics.average_execution_time = metrics.total_execution_time / metrics.calls as u32;
            metrics.last_called = Some(Utc::now());
        }
    }

    /// Average execution time, when the tool has run at least once.
    pub fn average_execution_time(&self, name: &str) -> Option<Duration> {
        self.tools
            .lock()
            .get(name)
            .filter(|r| r.metrics.calls > 0)
            .map(|r| r.metrics.average_execution_time)
    }

    /// Get usage metrics for one tool
    pub fn metrics(&self, name: &str) -> Result<ToolMetrics> {
        self.tools
            .lock()
            .get(name)
            .map(|r| r.metrics.clone())
            .ok_or_else(|| {
                Error::ToolNotFound(format!("Cannot get metrics for non-existent tool: {}", name))
            })
    }

    /// Metrics for every registered tool
    pub fn all_metrics(&self) -> HashMap<String, ToolMetrics> {
        self.tools
            .lock()
            .iter()
            .map(|(name, r)| (name.clone(), r.metrics.clone()))
            .collect()
    }

    /// List tool names
    pub fn names(&self) -> Vec<String> {
        self.tools.lock().keys().cloned().collect()
    }

    /// Every registered tool, for bulk operations like session resets
    pub fn all(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.lock().values().map(|r| r.tool.clone()).collect()
    }

    /// Get all tool definitions in LLM function-schema form
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .lock()
            .values()
            .map(|r| r.tool.to_definition())
            .collect()
    }

    /// Get tool count
    pub fn count(&self) -> usize {
        self.tools.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the input back"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn run(&self, args: Value) -> Result<Value> {
            Ok(args["text"].clone())
        }
    }

    struct NamelessTool;

    #[async_trait]
    impl Tool for NamelessTool {
        fn name(&self) -> &str {
            ""
        }
        fn description(&self) -> &str {
            "broken"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn run(&self, _args: Value) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn register_then_get_returns_same_instance() {
        let registry = ToolRegistry::new();
        let tool: Arc<dyn Tool> = Arc::new(EchoTool);
        registry.register(tool.clone()).unwrap();

        let fetched = registry.get("echo").unwrap();
        assert!(Arc::ptr_eq(&tool, &fetched));
    }

    #[test]
    fn duplicate_registration_is_rejected_without_mutating_state() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        let before = registry.metrics("echo").unwrap().registered_at;

        let err = registry.register(Arc::new(EchoTool)).unwrap_err();
        assert!(matches!(err, Error::DuplicateTool(_)));
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.metrics("echo").unwrap().registered_at, before);
    }

    #[test]
    fn invalid_tool_fails_validation() {
        let registry = ToolRegistry::new();
        let err = registry.register(Arc::new(NamelessTool)).unwrap_err();
        assert!(matches!(err, Error::ToolValidation(_)));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn missing_tool_is_tool_not_found() {
        let registry = ToolRegistry::new();
        assert!(matches!(registry.get("nope"), Err(Error::ToolNotFound(_))));
        assert!(matches!(registry.unregister("nope"), Err(Error::ToolNotFound(_))));
    }

    #[test]
    fn execution_metrics_keep_a_running_average() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();

        registry.record_execution("echo", Duration::from_millis(100));
        registry.record_execution("echo", Duration::from_millis(300));

        let metrics = registry.metrics("echo").unwrap();
        assert_eq!(metrics.calls, 2);
        assert_eq!(metrics.average_execution_time, Duration::from_millis(200));
        assert!(metrics.last_called.is_some());
        assert_eq!(
            registry.average_execution_time("echo"),
            Some(Duration::from_millis(200))
        );
    }

    #[test]
    fn definitions_expose_function_schemas() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].tool_type, "function");
        assert_eq!(defs[0].function.name, "echo");
    }
}
