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

use std::{fmt::Display, str::FromStr};

use eyre::{bail, eyre, Error, Result};
use serde::{Deserialize, Serialize};

/// Identifies a module within a process/runtime.
///
/// Ids are produced by a module-id provider and compared by value; two modules
/// loaded from the same file in two app domains share the same id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId {
    /// Name of the assembly (or image) the module belongs to.
    pub assembly_name: String,
    /// Module name, usually the file name or the full path of the module.
    pub module_name: String,
    /// True if the module was emitted at runtime.
    #[serde(default)]
    pub is_dynamic: bool,
    /// True if the module was loaded from a byte array.
    #[serde(default)]
    pub is_in_memory: bool,
    /// True if only the module name is significant when matching.
    #[serde(default)]
    pub name_only: bool,
}

impl ModuleId {
    /// Creates a module id for a module loaded from disk.
    pub fn new(assembly_name: impl Into<String>, module_name: impl Into<String>) -> Self {
        Self {
            assembly_name: assembly_name.into(),
            module_name: module_name.into(),
            is_dynamic: false,
            is_in_memory: false,
            name_only: false,
        }
    }

    /// Creates a module id that only carries a module name.
    pub fn from_name(module_name: impl Into<String>) -> Self {
        Self { name_only: true, ..Self::new("", module_name) }
    }

    fn flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.is_dynamic {
            flags.push("dynamic");
        }
        if self.is_in_memory {
            flags.push("memory");
        }
        if self.name_only {
            flags.push("name");
        }
        flags
    }
}

impl Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}!{}", self.assembly_name, self.module_name)?;
        for flag in self.flags() {
            write!(f, "#{flag}")?;
        }
        Ok(())
    }
}

impl FromStr for ModuleId {
    type Err = Error;

    /// Parses a module id.
    /// Format: `<assembly>!<module>[#dynamic][#memory][#name]`
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('#');
        let names = parts.next().unwrap_or_default();
        let Some((assembly, module)) = names.split_once('!') else {
            bail!("Invalid module id format. Expected <assembly>!<module>, got: {s}");
        };
        if module.is_empty() {
            bail!("Module id has an empty module name: {s}");
        }

        let mut id = Self::new(assembly, module);
        for flag in parts {
            match flag {
                "dynamic" => id.is_dynamic = true,
                "memory" => id.is_in_memory = true,
                "name" => id.name_only = true,
                other => bail!("Unknown module id flag: {other}"),
            }
        }
        Ok(id)
    }
}

/// A breakpoint location: a method body offset inside a module.
///
/// Equality and hashing cover all three fields, which is what keeps the
/// manager's breakpoint collection free of duplicates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodeLocation {
    module: ModuleId,
    token: u32,
    offset: u32,
}

impl CodeLocation {
    /// Creates a new location.
    pub fn new(module: ModuleId, token: u32, offset: u32) -> Self {
        Self { module, token, offset }
    }

    /// Module containing the method.
    pub fn module(&self) -> &ModuleId {
        &self.module
    }

    /// Metadata token of the method.
    pub fn token(&self) -> u32 {
        self.token
    }

    /// IL/native offset inside the method body.
    pub fn offset(&self) -> u32 {
        self.offset
    }
}

impl Display for CodeLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:0x{:08X}+{}", self.module, self.token, self.offset)
    }
}

impl FromStr for CodeLocation {
    type Err = Error;

    /// Parses a code location.
    /// Format: `<module-id>:0x<token>+<offset>`, the offset defaults to 0
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (module, method) = trimmed.rsplit_once(':').ok_or_else(|| {
            eyre!("Invalid code location format. Expected <module-id>:0x<token>+<offset>")
        })?;

        let module = module.parse::<ModuleId>()?;
        let (token, offset) = match method.split_once('+') {
            Some((token, offset)) => (token, offset),
            None => (method, "0"),
        };
        let token = token.trim();
        let token = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => token.parse::<u32>(),
        }
        .map_err(|e| eyre!("Invalid method token: {e}"))?;
        let offset = offset.trim().parse::<u32>().map_err(|e| eyre!("Invalid offset: {e}"))?;

        Ok(Self { module, token, offset })
    }
}
