//! Core configuration types

use crate::config::provider::LlmConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Id of the active LLM backend in `llm`
    #[serde(default = "default_active_llm")]
    pub active_llm: String,
    /// Configured LLM backends by id
    #[serde(default = "default_llm_backends")]
    pub llm: HashMap<String, LlmConfig>,
    /// Conversation memory settings
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Tool execution settings
    #[serde(default)]
    pub tool: ToolConfig,
    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,
    /// Planning flow settings
    #[serde(default)]
    pub planning: PlanningConfig,
    /// Response sanitiser settings
    #[serde(default)]
    pub sanitizer: SanitizerConfig,
    /// Session management settings
    #[serde(default)]
    pub session: SessionConfig,
    /// Security settings
    #[serde(default)]
    pub security: SecurityConfig,
}

fn default_active_llm() -> String {
    "openai".to_string()
}

fn default_llm_backends() -> HashMap<String, LlmConfig> {
    let mut backends = HashMap::new();
    backends.insert("openai".to_string(), LlmConfig::default());
    backends.insert("lm_studio".to_string(), LlmConfig::lm_studio());
    backends
}

impl Default for Config {
    fn default() -> Self {
        Config {
            active_llm: default_active_llm(),
            llm: default_llm_backends(),
            memory: MemoryConfig::default(),
            tool: ToolConfig::default(),
            agent: AgentConfig::default(),
            planning: PlanningConfig::default(),
            sanitizer: SanitizerConfig::default(),
            session: SessionConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl Config {
    /// Resolve the active LLM backend, falling back to any configured one.
    pub fn active_llm(&self) -> LlmConfig {
        self.llm
            .get(&self.active_llm)
            .or_else(|| self.llm.values().next())
            .cloned()
            .unwrap_or_default()
    }
}

/// Conversation memory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Token budget of the rolling window
    #[serde(default = "default_max_memory_tokens")]
    pub max_tokens: usize,
    /// Keep the system prompt out of eviction
    #[serde(default = "default_true")]
    pub preserve_system_prompt: bool,
    /// Keep the first user message out of eviction
    #[serde(default = "default_true")]
    pub preserve_first_user_message: bool,
    /// Fraction of the budget at which memory pressure is reported
    #[serde(default = "default_summarization_threshold")]
    pub summarization_threshold: f64,
}

fn default_max_memory_tokens() -> usize {
    16_000
}

fn default_true() -> bool {
    true
}

fn default_summarization_threshold() -> f64 {
    0.8
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            max_tokens: default_max_memory_tokens(),
            preserve_system_prompt: true,
            preserve_first_user_message: true,
            summarization_threshold: default_summarization_threshold(),
        }
    }
}

/// Tool execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Timeout for tools that do not declare their own
    #[serde(with = "humantime_serde", default = "default_tool_timeout")]
    pub default_timeout: Duration,
    /// TTL of cached tool results
    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    pub default_cache_ttl: Duration,
    /// Whether successful results are cached at all
    #[serde(default = "default_true")]
    pub enable_caching: bool,
}

fn default_tool_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(300)
}

impl Default for ToolConfig {
    fn default() -> Self {
        ToolConfig {
            default_timeout: default_tool_timeout(),
            default_cache_ttl: default_cache_ttl(),
            enable_caching: true,
        }
    }
}

/// How a batch of tool calls from one think step is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One call at a time, in request order
    Sequential,
    /// All calls concurrently; results are appended in request order
    Parallel,
}

/// Agent loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum think/act round-trips per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Tool batch execution mode
    #[serde(default = "default_execution_mode")]
    pub execution_mode: ExecutionMode,
    /// Identical prior assistant responses that count as being stuck
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: usize,
    /// Outer deadline for one run; unlimited when absent
    #[serde(
        with = "humantime_serde",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub run_timeout: Option<Duration>,
}

fn default_max_iterations() -> u32 {
    20
}

fn default_execution_mode() -> ExecutionMode {
    ExecutionMode::Sequential
}

fn default_duplicate_threshold() -> usize {
    2
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            max_iterations: default_max_iterations(),
            execution_mode: default_execution_mode(),
            duplicate_threshold: default_duplicate_threshold(),
            run_timeout: None,
        }
    }
}

/// Planning flow settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlanningConfig {
    /// Keep executing later steps after one is blocked
    #[serde(default)]
    pub continue_on_failure: bool,
}

/// Response sanitiser settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// Name substituted for model references and AI self-references
    #[serde(default = "default_canonical_name")]
    pub canonical_name: String,
    /// Identity normalisation can be disabled for debugging
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_canonical_name() -> String {
    "Assistant".to_string()
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        SanitizerConfig {
            canonical_name: default_canonical_name(),
            enabled: true,
        }
    }
}

/// Session management settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle time after which a session expires
    #[serde(with = "humantime_serde", default = "default_session_timeout")]
    pub timeout: Duration,
    /// History entries kept per session; oldest trimmed
    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,
    /// File the single-session snapshot is persisted to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(3600)
}

fn default_max_history_size() -> usize {
    100
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            timeout: default_session_timeout(),
            max_history_size: default_max_history_size(),
            file: None,
        }
    }
}

/// Security settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Root directory file tools are confined to
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,
    /// Extra paths tools may touch
    #[serde(default)]
    pub allowed_paths: Vec<PathBuf>,
    /// Paths that are always rejected
    #[serde(default)]
    pub restricted_paths: Vec<PathBuf>,
    /// Upper bound on shell-style command length
    #[serde(default = "default_max_command_length")]
    pub max_command_length: usize,
    /// Timeout for security-sensitive operations
    #[serde(with = "humantime_serde", default = "default_security_timeout")]
    pub timeout: Duration,
    /// Tool invocations allowed per minute; unlimited when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_command_length() -> usize {
    4096
}

fn default_security_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            workspace_dir: default_workspace_dir(),
            allowed_paths: Vec::new(),
            restricted_paths: Vec::new(),
            max_command_length: default_max_command_length(),
            timeout: default_security_timeout(),
            rate_limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documentation() {
        let config = Config::default();
        assert_eq!(config.memory.max_tokens, 16_000);
        assert!(config.memory.preserve_system_prompt);
        assert_eq!(config.tool.default_timeout, Duration::from_secs(30));
        assert_eq!(config.agent.max_iterations, 20);
        assert_eq!(config.agent.execution_mode, ExecutionMode::Sequential);
        assert_eq!(config.agent.duplicate_threshold, 2);
        assert!(!config.planning.continue_on_failure);
        assert_eq!(config.session.max_history_size, 100);
    }

    #[test]
    fn test_active_llm_falls_back_when_missing() {
        let mut config = Config::default();
        config.active_llm = "nonexistent".to_string();
        // Still resolves to some configured backend.
        let _ = config.active_llm();
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let raw = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.agent.max_iterations, config.agent.max_iterations);
        assert_eq!(parsed.memory.max_tokens, config.memory.max_tokens);
    }
}
