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

//! What a simulated session left behind.

use std::fmt::{self, Display};

use dbgobj_core::{DbgObject, Manager, ManagerEvent};
use itertools::Itertools;
use serde::Serialize;

/// Final state of a simulated session.
#[derive(Debug, Default, Serialize)]
pub struct Report {
    /// The simulated runtime.
    pub runtime: String,
    /// True if any creation event asked for a pause.
    pub pause_requested: bool,
    /// One line per step.
    pub steps: Vec<String>,
    /// Live app domains.
    pub app_domains: Vec<String>,
    /// Live modules.
    pub modules: Vec<ModuleEntry>,
    /// Live threads.
    pub threads: Vec<String>,
    /// Live exceptions.
    pub exceptions: Vec<String>,
    /// Code breakpoints.
    pub breakpoints: Vec<BreakpointEntry>,
    /// Bound breakpoints.
    pub bound_breakpoints: Vec<BoundEntry>,
    /// Notifications, in dispatch order.
    pub events: Vec<String>,
    /// Auxiliary data released, in release order.
    pub released: Vec<String>,
}

/// A loaded module.
#[derive(Debug, Serialize)]
pub struct ModuleEntry {
    /// Module id in text form.
    pub id: String,
    /// Base address.
    pub address: String,
}

/// A code breakpoint.
#[derive(Debug, Serialize)]
pub struct BreakpointEntry {
    /// Location in text form.
    pub location: String,
    /// Settings summary.
    pub settings: String,
}

/// A bound breakpoint.
#[derive(Debug, Serialize)]
pub struct BoundEntry {
    /// Location in text form.
    pub location: String,
    /// Module id, if bound in a module.
    pub module: Option<String>,
    /// Address, if known.
    pub address: Option<String>,
    /// Engine message.
    pub message: Option<String>,
}

impl Report {
    /// Fills the object sections from the manager's current snapshots.
    pub fn capture(&mut self, manager: &Manager) {
        self.app_domains = manager
            .app_domains()
            .iter()
            .map(|a| format!("{} (id {})", a.info().name, a.info().id))
            .collect();
        self.modules = manager
            .modules()
            .iter()
            .map(|m| ModuleEntry {
                id: m.module_id().to_string(),
                address: format!("0x{:x}", m.info().address),
            })
            .collect();
        self.threads = manager
            .threads()
            .iter()
            .map(|t| format!("{} {:?} [{:?}]", t.info().id, t.info().name, t.info().state))
            .collect();
        self.exceptions = manager
            .exceptions()
            .iter()
            .map(|e| match &e.info().message {
                Some(message) => format!("{}: {message}", e.info().id),
                None => e.info().id.to_string(),
            })
            .collect();
        self.breakpoints = manager
            .breakpoints()
            .iter()
            .map(|bp| BreakpointEntry {
                location: bp.location().to_string(),
                settings: bp.settings().to_string(),
            })
            .collect();
        self.bound_breakpoints = manager
            .bound_breakpoints()
            .iter()
            .map(|b| BoundEntry {
                location: b.location().to_string(),
                module: b.module().map(|m| m.module_id().to_string()),
                address: b.address().map(|a| format!("0x{a:x}")),
                message: b.message().map(ToString::to_string),
            })
            .collect();
    }

    /// Records a notification.
    pub fn record(&mut self, event: &ManagerEvent) {
        let line = match event {
            ManagerEvent::ObjectsCreated { objects, pause } => {
                let suffix = if *pause { " (pause)" } else { "" };
                format!("created {}{suffix}", objects.iter().map(DbgObject::kind).join(", "))
            }
            ManagerEvent::ObjectsClosed(objects) => {
                format!("closed {}", objects.iter().map(DbgObject::kind).join(", "))
            }
            ManagerEvent::BreakpointsAdded(added) => format!("added {} breakpoint(s)", added.len()),
            ManagerEvent::BoundBreakpointsAdded(bound) => {
                format!("bound {} breakpoint(s)", bound.len())
            }
        };
        self.events.push(line);
    }
}

fn section<T: Display>(f: &mut fmt::Formatter<'_>, title: &str, items: &[T]) -> fmt::Result {
    writeln!(f, "{title} ({}):", items.len())?;
    for item in items {
        writeln!(f, "  {item}")?;
    }
    Ok(())
}

impl Display for ModuleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.id, self.address)
    }
}

impl Display for BreakpointEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.location, self.settings)
    }
}

impl Display for BoundEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.location)?;
        if let Some(module) = &self.module {
            write!(f, " in {module}")?;
        }
        write!(f, " @ {}", self.address.as_deref().unwrap_or("<unknown>"))?;
        if let Some(message) = &self.message {
            write!(f, " ({message})")?;
        }
        Ok(())
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Runtime: {}", self.runtime)?;
        writeln!(f, "Pause requested: {}", self.pause_requested)?;
        section(f, "Steps", &self.steps)?;
        section(f, "App domains", &self.app_domains)?;
        section(f, "Modules", &self.modules)?;
        section(f, "Threads", &self.threads)?;
        section(f, "Exceptions", &self.exceptions)?;
        section(f, "Breakpoints", &self.breakpoints)?;
        section(f, "Bound breakpoints", &self.bound_breakpoints)?;
        section(f, "Events", &self.events)?;
        section(f, "Released", &self.released)
    }
}
