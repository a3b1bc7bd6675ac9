// dbgobj - Debugger Object Model
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Configuration system for dbgobj
//!
//! Settings are stored as TOML in `~/.dbgobj.toml`. Missing sections and keys
//! fall back to their defaults.

use std::{
    fs,
    path::{Path, PathBuf},
};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::BreakpointSettings;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Object manager settings
    pub manager: ManagerConfig,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Defaults used when creating breakpoints
    pub breakpoints: BreakpointDefaults,
}

/// Object manager configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ManagerConfig {
    /// Name given to the dispatch thread
    pub dispatcher_thread_name: String,
    /// Number of notifications buffered per subscriber before old ones are dropped
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self { dispatcher_thread_name: "dbg-dispatch".to_string(), event_capacity: 1024 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is not set
    pub level: String,
    /// Also write logs to a file in the temp directory
    pub file_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), file_logging: false }
    }
}

/// Breakpoint creation defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BreakpointDefaults {
    /// Initial tracepoint message shown in the settings prompt
    pub tracepoint_message: String,
    /// Whether new tracepoints continue execution by default
    pub tracepoint_continue: bool,
}

impl Default for BreakpointDefaults {
    fn default() -> Self {
        Self { tracepoint_message: String::new(), tracepoint_continue: true }
    }
}

impl BreakpointDefaults {
    /// Settings handed to the settings prompt for a new tracepoint.
    pub fn tracepoint_settings(&self) -> BreakpointSettings {
        BreakpointSettings::tracepoint(self.tracepoint_message.clone(), self.tracepoint_continue)
    }
}

impl Config {
    /// Get the config file path (~/.dbgobj.toml)
    pub fn config_path() -> Result<PathBuf> {
        let home =
            dirs::home_dir().ok_or_else(|| eyre::eyre!("Unable to determine home directory"))?;
        Ok(home.join(".dbgobj.toml"))
    }

    /// Load configuration from the default path, creating it if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found, creating default at {:?}", config_path);
            let default_config = Self::default();
            default_config.save_to(&config_path)?;
            return Ok(default_config);
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path:?}"))?;

        let config: Self =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {path:?}"))?;

        debug!("Saved configuration to {:?}", path);
        Ok(())
    }
}
