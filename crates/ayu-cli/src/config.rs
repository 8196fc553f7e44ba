//! Configuration file management for ayu.
//!
//! Provides a TOML-based config file at `~/.config/ayu/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use ayu_core::channel::{self, ChannelConfig};
use ayu_core::runner::{Plugin, RunnerCommand};

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub channel: ChannelSection,
    #[serde(default)]
    pub runner: RunnerSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSection {
    pub host: String,
    /// `0` means the default port.
    pub port: u16,
    pub max_frame_size: usize,
    pub connect_timeout_ms: u64,
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            host: ChannelConfig::DEFAULT_HOST.to_string(),
            port: ChannelConfig::DEFAULT_PORT,
            max_frame_size: ChannelConfig::DEFAULT_MAX_FRAME_SIZE,
            connect_timeout_ms: ChannelConfig::DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSection {
    /// ayu is installed as a standalone tool rather than a project
    /// dependency, so runs add it with `uv run --with ayu`.
    pub is_tool: bool,
    pub plugins: Vec<Plugin>,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            is_tool: true,
            plugins: Vec::new(),
        }
    }
}

impl RunnerSection {
    /// A command with this section's launcher settings and no selection.
    pub fn command(&self) -> RunnerCommand {
        RunnerCommand::new(self.is_tool).plugins(self.plugins.iter().cloned())
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the ayu config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/ayu` or `~/.config/ayu`, not
/// the platform-specific `dirs::config_dir()`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg).join("ayu");
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("ayu")
}

/// Return the path to the ayu config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load the config file at `path`; `Ok(None)` if it does not exist.
pub fn load_config_from(path: &Path) -> Result<Option<ConfigFile>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to read config file at {}", path.display()));
        }
    };
    let config = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

pub fn load_config() -> Result<Option<ConfigFile>> {
    load_config_from(&config_path())
}

/// Serialize and write `config` to `path`, creating parent dirs as needed.
pub fn save_config_to(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }
    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;
    Ok(())
}

pub fn save_config(config: &ConfigFile) -> Result<()> {
    save_config_to(&config_path(), config)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone)]
pub struct AyuConfig {
    pub channel: ChannelConfig,
    pub runner: RunnerSection,
}

impl AyuConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - Host: `cli_host` > `AYU_HOST` > `channel.host` > `localhost`
    /// - Port: `cli_port` > `AYU_PORT` > `channel.port` > `1337` (0 counts as unset)
    /// - Frame limit, connect timeout and runner settings come from the file
    ///   or the defaults; `0` in the file counts as unset.
    pub fn resolve(cli_host: Option<&str>, cli_port: Option<u16>) -> Result<Self> {
        let file = load_config()?;
        Ok(Self::resolve_with(cli_host, cli_port, file))
    }

    pub fn resolve_with(cli_host: Option<&str>, cli_port: Option<u16>, file: Option<ConfigFile>) -> Self {
        let file = file.unwrap_or_default();

        let host = cli_host
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .or_else(channel::host_from_env)
            .or_else(|| Some(file.channel.host.clone()).filter(|h| !h.is_empty()))
            .unwrap_or_else(|| ChannelConfig::DEFAULT_HOST.to_string());

        let port = cli_port
            .filter(|&p| p != 0)
            .or_else(channel::port_from_env)
            .or(Some(file.channel.port).filter(|&p| p != 0))
            .unwrap_or(ChannelConfig::DEFAULT_PORT);

        let max_frame_size = Some(file.channel.max_frame_size)
            .filter(|&n| n != 0)
            .unwrap_or(ChannelConfig::DEFAULT_MAX_FRAME_SIZE);
        let connect_timeout = Some(file.channel.connect_timeout_ms)
            .filter(|&ms| ms != 0)
            .map(Duration::from_millis)
            .unwrap_or(ChannelConfig::DEFAULT_CONNECT_TIMEOUT);

        let channel = ChannelConfig::new(host, port)
            .with_max_frame_size(max_frame_size)
            .with_connect_timeout(connect_timeout);

        Self {
            channel,
            runner: file.runner,
        }
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
