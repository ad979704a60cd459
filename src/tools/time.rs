//! Current time tool

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use super::traits::Tool;
use crate::error::Result;

/// Built-in tool: report the current date and time.
pub struct TimeTool;

#[async_trait]
impl Tool for TimeTool {
    fn name(&self) -> &str {
        "time"
    }

    fn description(&self) -> &str {
        "Get the current date and time (UTC)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn run(&self, _args: Value) -> Result<Value> {
        Ok(json!(Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_a_timestamp() {
        let value = TimeTool.run(json!({})).await.unwrap();
        let text = value.as_str().unwrap();
        assert!(text.ends_with("UTC"));
    }
}
