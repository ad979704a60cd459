//! Write file tool
//!
//! Allows the agent to write files inside the workspace, with the same path
//! confinement as the read tool.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;

use super::traits::Tool;
use crate::agent::sanitizer::PathValidator;
use crate::error::{Error, Result};

/// Built-in tool: write a file into the workspace.
pub struct WriteFileTool {
    validator: PathValidator,
}

impl WriteFileTool {
    /// Create the tool confined to `workspace_dir`.
    pub fn new(workspace_dir: PathBuf) -> Self {
        WriteFileTool {
            validator: PathValidator::new(workspace_dir),
        }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file, relative to the workspace"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn run(&self, args: Value) -> Result<Value> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidToolArgument("Missing 'path' parameter".into()))?;
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidToolArgument("Missing 'content' parameter".into()))?;

        let full_path = self.validator.validate(path)?;
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::ToolExecution(format!("Failed to create {}: {}", path, e)))?;
        }
        tokio::fs::write(&full_path, content)
            .await
            .map_err(|e| Error::ToolExecution(format!("Failed to write {}: {}", path, e)))?;

        Ok(json!(format!("Wrote {} bytes to {}", content.len(), path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_inside_the_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new(dir.path().to_path_buf());

        tool.run(json!({"path": "out/result.txt", "content": "data"}))
            .await
            .unwrap();
        let written = std::fs::read_to_string(dir.path().join("out/result.txt")).unwrap();
        assert_eq!(written, "data");
    }

    #[tokio::test]
    async fn rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new(dir.path().to_path_buf());
        assert!(tool
            .run(json!({"path": "../evil.txt", "content": "x"}))
            .await
            .is_err());
    }
}
