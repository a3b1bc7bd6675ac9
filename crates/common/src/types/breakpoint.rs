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

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Trace action of a tracepoint: log a message and optionally keep running.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BreakpointTrace {
    /// Message template written to the output when the tracepoint is hit.
    pub message: String,
    /// True if execution continues after the message has been written.
    pub continue_execution: bool,
}

impl BreakpointTrace {
    /// Creates a new trace action.
    pub fn new(message: impl Into<String>, continue_execution: bool) -> Self {
        Self { message: message.into(), continue_execution }
    }
}

/// Settings shared by every breakpoint created in one user action.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BreakpointSettings {
    /// True if the breakpoint is enabled.
    pub enabled: bool,
    /// Trace action, present only for tracepoints.
    pub trace: Option<BreakpointTrace>,
}

impl BreakpointSettings {
    /// Settings of a plain, enabled breakpoint.
    pub fn enabled() -> Self {
        Self { enabled: true, trace: None }
    }

    /// Settings of an enabled tracepoint.
    pub fn tracepoint(message: impl Into<String>, continue_execution: bool) -> Self {
        Self { enabled: true, trace: Some(BreakpointTrace::new(message, continue_execution)) }
    }

    /// Returns true if these are tracepoint settings.
    pub fn is_tracepoint(&self) -> bool {
        self.trace.is_some()
    }
}

impl Display for BreakpointSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.enabled { "enabled" } else { "disabled" })?;
        if let Some(trace) = &self.trace {
            write!(f, " trace {:?}", trace.message)?;
            if trace.continue_execution {
                f.write_str(" (continue)")?;
            }
        }
        Ok(())
    }
}

/// What a consumer asked for when adding breakpoints for a selection.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum BreakpointKind {
    /// Halting breakpoint.
    #[default]
    #[display("breakpoint")]
    Breakpoint,
    /// Logging breakpoint, configured through the settings prompt.
    #[display("tracepoint")]
    Tracepoint,
}

/// Severity of a bound breakpoint message.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageSeverity {
    /// No message.
    #[default]
    None,
    /// Custom message.
    Custom,
    /// Warning, the breakpoint may not be hit.
    Warning,
    /// Error, the breakpoint will not be hit.
    Error,
}

/// Warning/error message attached to a bound breakpoint by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BoundBreakpointMessage {
    /// Severity of the message.
    pub severity: MessageSeverity,
    /// Message text.
    pub text: String,
}

impl BoundBreakpointMessage {
    /// Creates a warning message.
    pub fn warning(text: impl Into<String>) -> Self {
        Self { severity: MessageSeverity::Warning, text: text.into() }
    }

    /// Creates an error message.
    pub fn error(text: impl Into<String>) -> Self {
        Self { severity: MessageSeverity::Error, text: text.into() }
    }

    /// Creates a custom message.
    pub fn custom(text: impl Into<String>) -> Self {
        Self { severity: MessageSeverity::Custom, text: text.into() }
    }
}

impl Display for BoundBreakpointMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.severity {
            MessageSeverity::None => Ok(()),
            MessageSeverity::Custom => f.write_str(&self.text),
            MessageSeverity::Warning => write!(f, "warning: {}", self.text),
            MessageSeverity::Error => write!(f, "error: {}", self.text),
        }
    }
}
