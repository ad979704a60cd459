//! Configuration loading and saving

use crate::config::types::Config;
use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default configuration file location.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentcore")
        .join("agentcore.toml")
}

/// Directory for runtime state such as the session snapshot.
pub fn state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentcore")
}

/// Load configuration from the default path layered with `AGENTCORE_*`
/// environment variables. A missing file yields the defaults.
pub fn load_config() -> Result<Config> {
    load_config_from(&config_path())
}

/// Load configuration from an explicit path layered with environment
/// variables. Missing file yields the defaults; a malformed file is an error.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path.to_path_buf()).required(false))
        .add_source(
            config::Environment::with_prefix("AGENTCORE")
                .separator("__")
                .try_parsing(true),
        );

    let loaded: Config = builder.build()?.try_deserialize()?;
    debug!("Loaded configuration (file: {})", path.display());
    Ok(loaded)
}

/// Save configuration as TOML. Secret fields are never written.
pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let raw = toml::to_string_pretty(config)
        .map_err(|e| crate::error::Error::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, raw)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.agent.max_iterations, 20);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agentcore.toml");

        let mut config = Config::default();
        config.agent.max_iterations = 7;
        save_config(&path, &config).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.agent.max_iterations, 7);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agentcore.toml");
        std::fs::write(&path, "[memory]\nmax_tokens = 128\n").unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.memory.max_tokens, 128);
        assert_eq!(loaded.agent.max_iterations, 20);
    }
}
