//! Configuration module
//!
//! Following the same split as the rest of the crate: core runtime types in
//! `types.rs`, LLM backend configuration in `provider.rs`, loading/saving and
//! well-known paths in `io.rs`.

mod io;
mod provider;
mod types;

pub use io::{config_path, load_config, load_config_from, save_config, state_dir};
pub use provider::{ApiType, LlmConfig};
pub use types::{
    AgentConfig, Config, ExecutionMode, MemoryConfig, PlanningConfig, SanitizerConfig,
    SecurityConfig, SessionConfig, ToolConfig,
};
