//! Configuration file management for the `team` CLI.
//!
//! Provides a TOML-based config file at `~/.config/team/config.toml` and a
//! state-root resolution chain: CLI flag > env var > config file > default.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use team_store::config::StateRootConfig;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,
}

/// Always uses XDG layout: `$XDG_CONFIG_HOME/team` or `~/.config/team`. We
/// intentionally ignore the platform-specific `dirs::config_dir()` (which
/// returns `~/Library/Application Support` on macOS).
pub fn config_dir() -> std::path::PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return std::path::PathBuf::from(xdg).join("team");
    }
    dirs::home_dir().unwrap_or_else(|| std::path::PathBuf::from(".")).join(".config").join("team")
}

pub fn config_path() -> std::path::PathBuf {
    config_dir().join("config.toml")
}

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&contents).context("failed to parse config file")
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

/// Resolve the state root directory using the chain: CLI flag > env var
/// (`OMX_STATE_ROOT`/`WORK_ROOT`) > config file > default (`.omx/state`).
pub fn resolve_state_root(cli_flag: Option<&str>) -> StateRootConfig {
    if let Some(explicit) = cli_flag {
        return StateRootConfig::at(explicit);
    }
    if std::env::var("OMX_STATE_ROOT").is_ok() || std::env::var("WORK_ROOT").is_ok() {
        return StateRootConfig::from_env();
    }
    if let Ok(file) = load_config() {
        if let Some(root) = file.state_root {
            return StateRootConfig::at(root);
        }
    }
    StateRootConfig::from_env()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(path.ends_with("team/config.toml"), "unexpected config path: {}", path.display());
    }

    #[test]
    fn resolve_state_root_prefers_explicit_flag() {
        let cfg = resolve_state_root(Some("/tmp/explicit-root"));
        assert_eq!(cfg.jobs_root, std::path::PathBuf::from("/tmp/explicit-root/jobs"));
    }
}
