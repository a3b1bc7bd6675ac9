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

//! Engine-supplied snapshots of debuggee entities.
//!
//! These are plain values; the manager wraps them in its own objects and
//! never lets engines mutate them after creation.

use std::fmt::Display;

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process/runtime pair an engine is attached to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RuntimeInfo {
    /// Process id of the debuggee.
    pub process_id: u32,
    /// Runtime name, e.g. "CoreCLR".
    pub name: String,
}

/// Public snapshot of an app domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AppDomainInfo {
    /// App domain name.
    pub name: String,
    /// App domain id.
    pub id: i32,
}

/// How a module image is laid out in memory.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ImageLayout {
    /// Layout isn't known.
    #[default]
    Unknown,
    /// The image is laid out as it is on disk.
    File,
    /// The image was mapped by the loader.
    Memory,
}

/// Public snapshot of a module.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleInfo {
    /// True if this is the process executable.
    #[serde(default)]
    pub is_exe: bool,
    /// Base address of the module.
    #[serde(default)]
    pub address: u64,
    /// Size of the module image.
    #[serde(default)]
    pub size: u32,
    /// Image layout.
    #[serde(default)]
    pub image_layout: ImageLayout,
    /// Module name.
    pub name: String,
    /// Module filename, may be empty for in-memory modules.
    #[serde(default)]
    pub filename: String,
    /// True if the module was emitted at runtime.
    #[serde(default)]
    pub is_dynamic: bool,
    /// True if the module was loaded from memory.
    #[serde(default)]
    pub is_in_memory: bool,
    /// Optimization state, `None` if unknown.
    #[serde(default)]
    pub is_optimized: Option<bool>,
    /// Load order.
    #[serde(default)]
    pub order: i32,
    /// Image timestamp, `None` if unknown.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Version string.
    #[serde(default)]
    pub version: String,
}

bitflags! {
    /// Thread state flags reported by the engine.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ThreadState: u32 {
        /// Background thread.
        const BACKGROUND = 1 << 0;
        /// Not yet started.
        const UNSTARTED = 1 << 1;
        /// Stopped.
        const STOPPED = 1 << 2;
        /// Blocked in wait, sleep or join.
        const WAIT_SLEEP_JOIN = 1 << 3;
        /// Suspended by the debugger or the program.
        const SUSPENDED = 1 << 4;
    }
}

/// Public snapshot of a thread.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadInfo {
    /// Thread kind, e.g. "main", "threadpool", "finalizer".
    #[serde(default)]
    pub kind: String,
    /// Native thread id.
    pub id: u64,
    /// Managed thread id, if any.
    #[serde(default)]
    pub managed_id: Option<u64>,
    /// Thread name.
    #[serde(default)]
    pub name: String,
    /// Suspend count.
    #[serde(default)]
    pub suspended_count: i32,
    /// State flags.
    #[serde(default)]
    pub state: ThreadState,
}

/// Identifies an exception kind inside a category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExceptionId {
    /// Exception identified by type name, e.g. `System.NullReferenceException`.
    Name {
        /// Category, e.g. "DotNet".
        category: String,
        /// Exception name.
        name: String,
    },
    /// Exception identified by a numeric code, e.g. a Win32 exception code.
    Code {
        /// Category, e.g. "Win32".
        category: String,
        /// Exception code.
        code: i32,
    },
}

impl ExceptionId {
    /// Category of the exception.
    pub fn category(&self) -> &str {
        match self {
            Self::Name { category, .. } | Self::Code { category, .. } => category,
        }
    }
}

impl Display for ExceptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name { category, name } => write!(f, "{category}/{name}"),
            Self::Code { category, code } => write!(f, "{category}/0x{code:08X}"),
        }
    }
}

bitflags! {
    /// When in its lifetime an exception was reported.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ExceptionEventFlags: u32 {
        /// First chance, before any handler ran.
        const FIRST_CHANCE = 1 << 0;
        /// Second chance, no handler caught it.
        const SECOND_CHANCE = 1 << 1;
        /// Not handled by user code.
        const USER_UNHANDLED = 1 << 2;
        /// Unhandled.
        const UNHANDLED = 1 << 3;
    }
}

/// Public snapshot of an exception.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExceptionInfo {
    /// Exception id.
    pub id: ExceptionId,
    /// Event flags.
    pub flags: ExceptionEventFlags,
    /// Exception message, if available.
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_id_display() {
        let id = ExceptionId::Name {
            category: "DotNet".to_string(),
            name: "System.NullReferenceException".to_string(),
        };
        assert_eq!(id.to_string(), "DotNet/System.NullReferenceException");
        assert_eq!(id.category(), "DotNet");

        let id = ExceptionId::Code { category: "Win32".to_string(), code: 0x4000_0015 };
        assert_eq!(id.to_string(), "Win32/0x40000015");
    }

    #[test]
    fn test_flags_combine() {
        let state = ThreadState::BACKGROUND | ThreadState::SUSPENDED;
        assert!(state.contains(ThreadState::SUSPENDED));
        assert!(!state.contains(ThreadState::STOPPED));

        let flags = ExceptionEventFlags::FIRST_CHANCE;
        assert!(!flags.contains(ExceptionEventFlags::UNHANDLED));
    }
}
