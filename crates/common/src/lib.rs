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

//! dbgobj Common - Shared functionality for dbgobj components
//!
//! This crate provides the value types shared by the object manager and its
//! consumers (module ids, code locations, breakpoint settings, entity
//! snapshots), the auxiliary-data model attached to debugger objects, and
//! the logging and configuration setup used by every dbgobj binary.

/// Value types: module ids, code locations, breakpoint settings and entity snapshots
pub mod types;

/// Configuration file loading and saving
pub mod config;
/// Consumer-attached auxiliary data and its release discipline
pub mod data;
/// Memoized on-demand service accessor
pub mod lazy;
/// Logging setup and utilities for consistent logging across dbgobj components
pub mod logging;

pub use config::*;
pub use data::*;
pub use lazy::*;
pub use logging::*;
