use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Process-wide Azure DevOps settings, loaded once at startup and passed
/// explicitly to everything that needs them.
#[derive(Debug, Clone, Deserialize)]
pub struct DevOpsConfig {
    pub organization: String,
    pub project: String,
    pub personal_access_token: String,
}

fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("DEVOPS_MCP_CONFIG") {
        return PathBuf::from(path);
    }
    // config.toml next to the installed binary
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.toml")
}

/// Load the config or fail. The server is useless without credentials, so a
/// missing or malformed file is fatal at startup.
pub fn load_config() -> Result<DevOpsConfig> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Result<DevOpsConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: DevOpsConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}
