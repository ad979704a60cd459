//! Read file tool
//!
//! Allows the agent to read files from the workspace. Paths are resolved
//! through the path validator so the tool cannot escape the workspace root.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;

use super::traits::Tool;
use crate::agent::sanitizer::PathValidator;
use crate::error::{Error, Result};

/// Built-in tool: read a file from the workspace.
pub struct ReadFileTool {
    validator: PathValidator,
}

impl ReadFileTool {
    /// Create the tool confined to `workspace_dir`.
    pub fn new(workspace_dir: PathBuf) -> Self {
        ReadFileTool {
            validator: PathValidator::new(workspace_dir),
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file in the workspace"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file, relative to the workspace"
                }
            },
            "required": ["path"]
        })
    }

    async fn run(&self, args: Value) -> Result<Value> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidToolArgument("Missing 'path' parameter".into()))?;

        let full_path = self.validator.validate(path)?;
        let content = tokio::fs::read_to_string(&full_path)
            .await
            .map_err(|e| Error::ToolExecution(format!("Failed to read {}: {}", path, e)))?;
        Ok(json!(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_files_inside_the_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "content").unwrap();

        let tool = ReadFileTool::new(dir.path().to_path_buf());
        let value = tool.run(json!({"path": "hello.txt"})).await.unwrap();
        assert_eq!(value, json!("content"));
    }

    #[tokio::test]
    async fn rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool::new(dir.path().to_path_buf());
        assert!(tool.run(json!({"path": "../etc/passwd"})).await.is_err());
    }
}
