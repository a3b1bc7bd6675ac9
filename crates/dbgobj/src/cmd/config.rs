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

//! Config command - prints the effective configuration

use std::path::PathBuf;

use dbgobj_common::Config;
use eyre::{Context, Result};

/// Prints the configuration as TOML, or only where it is read from.
pub fn show_config(config: &Config, source: Option<PathBuf>, path_only: bool) -> Result<()> {
    let path = match source {
        Some(path) => path,
        None => Config::config_path()?,
    };

    if path_only {
        println!("{}", path.display());
        return Ok(());
    }

    let content = toml::to_string_pretty(config).wrap_err("Failed to serialize configuration")?;
    println!("# {}", path.display());
    print!("{content}");
    Ok(())
}
