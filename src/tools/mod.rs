//! Tools: trait, registry, result cache, and built-ins.

mod cache;
mod read_file;
mod registry;
mod time;
mod traits;
mod write_file;

pub use cache::{CacheStats, ToolCache};
pub use read_file::ReadFileTool;
pub use registry::{ToolMetrics, ToolRegistry};
pub use time::TimeTool;
pub use traits::{Tool, ToolCall, ToolResponse};
pub use write_file::WriteFileTool;

use std::sync::{Arc, OnceLock};

/// The process-wide tool registry. Explicitly constructed registries can be
/// passed to agents instead; this is the ergonomic default.
pub fn global_registry() -> Arc<ToolRegistry> {
    static REGISTRY: OnceLock<Arc<ToolRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| Arc::new(ToolRegistry::new())).clone()
}

/// The process-wide tool result cache.
pub fn global_cache() -> Arc<ToolCache> {
    static CACHE: OnceLock<Arc<ToolCache>> = OnceLock::new();
    CACHE.get_or_init(|| Arc::new(ToolCache::default())).clone()
}
