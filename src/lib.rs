//! # AgentCore
//!
//! A resilient, tool-calling conversational agent runtime built with Rust.
//!
//! ## Architecture
//!
//! - **Agent** (`agent`): the think/act loop, LLM client, conversation
//!   memory, tool executor, planning flow, and response sanitiser
//! - **Tools** (`tools`): the tool trait, the shared registry, the TTL
//!   result cache, and the built-in tools
//! - **Sessions** (`session`): single-file persistence and the TTL session
//!   manager
//! - **Configuration** (`config`): layered TOML + environment configuration
//! - **Tokenizer** (`tokenizer`): model-aware token counting for memory
//!   budgeting
//!
//! ## Design principles
//!
//! 1. **Bounded loops**: every run is capped by iterations and an optional
//!    deadline, and always yields a structured result
//! 2. **Failure is data**: tool and model failures are surfaced back into
//!    the conversation instead of aborting the loop
//! 3. **Explicit services**: the registry and caches are constructed
//!    services passed by reference, with global accessors as defaults
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use agentcore::agent::Agent;
//! use agentcore::config::load_config;
//! use agentcore::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = load_config()?;
//!     let mut agent = Agent::new(config)?;
//!     let result = agent.run("Say hello in one word.").await?;
//!     println!("{}", result.response);
//!     Ok(())
//! }
//! ```

// Agent logic and LLM interaction
pub mod agent;

// Modular configuration
pub mod config;

// Error types
pub mod error;

// Retry policy for network-adjacent calls
pub mod retry;

// Session persistence and management
pub mod session;

// Token counting
pub mod tokenizer;

// Tool trait, registry, cache, and built-ins
pub mod tools;

// Re-export commonly used items
pub use error::{Error, Result};

pub use agent::{Agent, Message, Role, RunMode, RunResult, RunStatus};
pub use tools::{Tool, ToolCall, ToolRegistry, ToolResponse};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
