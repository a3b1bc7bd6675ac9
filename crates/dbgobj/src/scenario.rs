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

//! Scripted engine sessions.
//!
//! A scenario is a TOML file describing what a debug engine reports, in
//! order, plus the metadata the breakpoint steps resolve against:
//!
//! ```toml
//! [runtime]
//! process_id = 4242
//! name = "CoreCLR"
//!
//! [[metadata.types]]
//! module = "app"
//! token = 0x02000002
//! name = "App.Program"
//! methods = [{ module = "app", token = 0x06000001, name = "Main" }]
//!
//! [[steps]]
//! action = "module"
//! label = "app"
//! info = { name = "app", filename = "app.dll" }
//!
//! [[steps]]
//! action = "breakpoints"
//! selection = [{ kind = "type", module = "app", token = 0x02000002 }]
//!
//! [[steps]]
//! action = "bind"
//! requests = [{ location = "app!app.dll:0x06000001+0", address = 0x1000 }]
//! ```

use std::{collections::HashMap, fs, path::Path};

use dbgobj_common::types::{
    AppDomainInfo, BoundBreakpointMessage, BreakpointKind, BreakpointSettings, ExceptionInfo,
    ModuleId, ModuleInfo, RuntimeInfo, ThreadInfo,
};
use dbgobj_core::{
    EventDef, MetadataRef, MetadataResolver, MethodDef, PropertyDef, SettingsPrompt,
    SymbolReference, TypeDef,
};
use eyre::{Context, Result};
use serde::Deserialize;

/// A scripted session.
#[derive(Debug, Deserialize)]
pub struct Scenario {
    /// The runtime the engine is attached to.
    pub runtime: RuntimeInfo,
    /// Metadata the breakpoint steps resolve against.
    #[serde(default)]
    pub metadata: ScenarioMetadata,
    /// Answer of the tracepoint settings prompt.
    #[serde(default)]
    pub prompt: PromptAnswer,
    /// What happens, in order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Reads a scenario file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file: {path:?}"))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse scenario: {path:?}"))
    }
}

/// One engine or consumer action.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// The engine reports an app domain.
    AppDomain {
        /// Name later steps refer to this object by.
        label: Option<String>,
        /// Snapshot.
        info: AppDomainInfo,
        /// Pause request.
        #[serde(default)]
        pause: bool,
    },
    /// The engine reports a module.
    Module {
        /// Name later steps refer to this object by.
        label: Option<String>,
        /// Label of the owning app domain.
        app_domain: Option<String>,
        /// Snapshot.
        info: ModuleInfo,
        /// Pause request.
        #[serde(default)]
        pause: bool,
    },
    /// The engine reports a thread.
    Thread {
        /// Name later steps refer to this object by.
        label: Option<String>,
        /// Label of the app domain the thread runs in.
        app_domain: Option<String>,
        /// Snapshot.
        info: ThreadInfo,
        /// Pause request.
        #[serde(default)]
        pause: bool,
    },
    /// The engine reports an exception.
    Exception {
        /// Name later steps refer to this object by.
        label: Option<String>,
        /// Label of the throwing thread.
        thread: Option<String>,
        /// Label of the throwing module.
        module: Option<String>,
        /// Snapshot.
        info: ExceptionInfo,
        /// Pause request.
        #[serde(default)]
        pause: bool,
    },
    /// A consumer adds breakpoints for a selection.
    Breakpoints {
        /// Breakpoint or tracepoint.
        #[serde(default)]
        kind: BreakpointKind,
        /// Selected symbols.
        selection: Vec<SymbolReference>,
    },
    /// The engine binds breakpoint locations.
    Bind {
        /// Bind requests, in order.
        requests: Vec<BindRequest>,
    },
    /// Objects are closed.
    Close {
        /// Labels of engine objects.
        #[serde(default)]
        labels: Vec<String>,
        /// Locations of code breakpoints, in `CodeLocation` text form.
        #[serde(default)]
        breakpoints: Vec<String>,
    },
}

/// One bind request.
#[derive(Debug, Deserialize)]
pub struct BindRequest {
    /// Location in `CodeLocation` text form.
    pub location: String,
    /// Label of the module the engine bound in.
    pub module: Option<String>,
    /// Bound address, unknown if absent.
    pub address: Option<u64>,
    /// Engine message.
    pub message: Option<BoundBreakpointMessage>,
}

/// Answer of the tracepoint settings prompt.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PromptAnswer {
    /// The user cancels the prompt.
    pub cancel: bool,
    /// Settings the user enters; the defaults are accepted if absent.
    pub settings: Option<BreakpointSettings>,
}

impl SettingsPrompt for PromptAnswer {
    fn show(&self, defaults: BreakpointSettings) -> Option<BreakpointSettings> {
        if self.cancel {
            return None;
        }
        Some(self.settings.clone().unwrap_or(defaults))
    }
}

/// Metadata tables of a scenario.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScenarioMetadata {
    /// Module file names by module name; `<name>.dll` if missing.
    pub modules: HashMap<String, String>,
    /// Type definitions.
    pub types: Vec<ScenarioType>,
    /// Property definitions.
    pub properties: Vec<ScenarioProperty>,
    /// Event definitions.
    pub events: Vec<ScenarioEvent>,
}

/// A type definition keyed by its reference.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioType {
    /// Defining module.
    pub module: String,
    /// Type token.
    pub token: u32,
    /// Definition.
    #[serde(flatten)]
    pub def: TypeDef,
}

/// A property definition keyed by its reference.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioProperty {
    /// Defining module.
    pub module: String,
    /// Property token.
    pub token: u32,
    /// Definition.
    #[serde(flatten)]
    pub def: PropertyDef,
}

/// An event definition keyed by its reference.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioEvent {
    /// Defining module.
    pub module: String,
    /// Event token.
    pub token: u32,
    /// Definition.
    #[serde(flatten)]
    pub def: EventDef,
}

fn refers_to(module: &str, token: u32, reference: &MetadataRef) -> bool {
    module == reference.module && token == reference.token
}

impl MetadataResolver for ScenarioMetadata {
    fn resolve_method(&self, reference: &MetadataRef) -> Option<MethodDef> {
        let accessors = self
            .properties
            .iter()
            .flat_map(|p| p.def.getters.iter().chain(&p.def.setters).chain(&p.def.other))
            .chain(self.events.iter().flat_map(|e| {
                e.def.add.iter().chain(&e.def.remove).chain(&e.def.invoke).chain(&e.def.other)
            }));

        self.types
            .iter()
            .flat_map(|t| &t.def.methods)
            .chain(accessors)
            .find(|m| refers_to(&m.module, m.token, reference))
            .cloned()
    }

    fn resolve_property(&self, reference: &MetadataRef) -> Option<PropertyDef> {
        self.properties
            .iter()
            .find(|p| refers_to(&p.module, p.token, reference))
            .map(|p| p.def.clone())
    }

    fn resolve_event(&self, reference: &MetadataRef) -> Option<EventDef> {
        self.events.iter().find(|e| refers_to(&e.module, e.token, reference)).map(|e| e.def.clone())
    }

    fn resolve_type(&self, reference: &MetadataRef) -> Option<TypeDef> {
        self.types.iter().find(|t| refers_to(&t.module, t.token, reference)).map(|t| t.def.clone())
    }

    fn module_id(&self, module: &str) -> ModuleId {
        let filename =
            self.modules.get(module).cloned().unwrap_or_else(|| format!("{module}.dll"));
        ModuleId::new(module, filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
        [runtime]
        process_id = 7
        name = "CoreCLR"

        [metadata.modules]
        lib = "/opt/app/lib.so"

        [[metadata.types]]
        module = "app"
        token = 0x02000002
        name = "App.Program"
        methods = [
            { module = "app", token = 0x06000001, name = "Main" },
            { module = "app", token = 0x06000002, name = "Run", is_abstract = true },
        ]

        [[metadata.properties]]
        module = "app"
        token = 0x17000001
        getters = [{ module = "app", token = 0x06000010, name = "get_Name" }]

        [[steps]]
        action = "app_domain"
        label = "domain"
        info = { name = "DefaultDomain", id = 1 }

        [[steps]]
        action = "module"
        label = "app"
        app_domain = "domain"
        pause = true
        info = { name = "app", filename = "app.dll" }

        [[steps]]
        action = "breakpoints"
        kind = "tracepoint"
        selection = [{ kind = "type", module = "app", token = 0x02000002 }]

        [[steps]]
        action = "close"
        labels = ["app"]
    "#;

    #[test]
    fn test_parse_scenario() {
        let scenario: Scenario = toml::from_str(SCENARIO).unwrap();
        assert_eq!(scenario.runtime.process_id, 7);
        assert_eq!(scenario.steps.len(), 4);
        assert!(matches!(
            &scenario.steps[1],
            Step::Module { app_domain: Some(domain), pause: true, .. } if domain == "domain"
        ));
        assert!(matches!(
            &scenario.steps[2],
            Step::Breakpoints { kind: BreakpointKind::Tracepoint, selection } if selection.len() == 1
        ));
        assert!(!scenario.prompt.cancel);
    }

    #[test]
    fn test_metadata_resolution() {
        let scenario: Scenario = toml::from_str(SCENARIO).unwrap();
        let metadata = &scenario.metadata;

        let methods =
            metadata.expand(&SymbolReference::Type(MetadataRef::new("app", 0x0200_0002)));
        assert_eq!(methods.len(), 2);
        assert!(!methods[1].is_breakable());

        let getter = metadata.resolve_method(&MetadataRef::new("app", 0x0600_0010)).unwrap();
        assert_eq!(getter.name, "get_Name");
        assert!(metadata.resolve_method(&MetadataRef::new("app", 0x0600_0099)).is_none());

        assert_eq!(metadata.module_id("app"), ModuleId::new("app", "app.dll"));
        assert_eq!(metadata.module_id("lib"), ModuleId::new("lib", "/opt/app/lib.so"));
    }

    #[test]
    fn test_prompt_answer() {
        let defaults = BreakpointSettings::tracepoint("", true);
        assert_eq!(PromptAnswer::default().show(defaults.clone()), Some(defaults.clone()));
        let cancel = PromptAnswer { cancel: true, settings: None };
        assert_eq!(cancel.show(defaults), None);
    }
}
