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

//! Metadata model seen by breakpoint consumers.
//!
//! Reading metadata is not done here. A [`MetadataResolver`] maps symbol
//! references from a selection to method definitions, and module names to the
//! [`ModuleId`]s locations are keyed on.

use auto_impl::auto_impl;
use dbgobj_common::types::ModuleId;
use serde::{Deserialize, Serialize};

/// A method definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MethodDef {
    /// Name of the module defining the method.
    pub module: String,
    /// Metadata token of the method.
    pub token: u32,
    /// Method name, used for diagnostics only.
    #[serde(default)]
    pub name: String,
    /// True if the method is abstract.
    #[serde(default)]
    pub is_abstract: bool,
    /// True if the method has an executable body.
    #[serde(default = "default_has_body")]
    pub has_body: bool,
}

fn default_has_body() -> bool {
    true
}

impl MethodDef {
    /// Creates a concrete method with a body.
    pub fn new(module: impl Into<String>, token: u32, name: impl Into<String>) -> Self {
        Self { module: module.into(), token, name: name.into(), is_abstract: false, has_body: true }
    }

    /// Returns true if a breakpoint can be set in this method.
    pub fn is_breakable(&self) -> bool {
        !self.is_abstract && self.has_body
    }
}

/// A property definition with its accessors.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PropertyDef {
    /// Getter methods.
    pub getters: Vec<MethodDef>,
    /// Setter methods.
    pub setters: Vec<MethodDef>,
    /// Other accessor methods.
    pub other: Vec<MethodDef>,
}

impl PropertyDef {
    /// All accessors: getters, then setters, then others.
    pub fn into_methods(self) -> Vec<MethodDef> {
        let Self { mut getters, setters, other } = self;
        getters.extend(setters);
        getters.extend(other);
        getters
    }
}

/// An event definition with its accessors.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EventDef {
    /// Add accessor.
    pub add: Option<MethodDef>,
    /// Remove accessor.
    pub remove: Option<MethodDef>,
    /// Raise accessor.
    pub invoke: Option<MethodDef>,
    /// Other accessor methods.
    pub other: Vec<MethodDef>,
}

impl EventDef {
    /// All accessors: add, remove, invoke, then others.
    pub fn into_methods(self) -> Vec<MethodDef> {
        let Self { add, remove, invoke, other } = self;
        add.into_iter().chain(remove).chain(invoke).chain(other).collect()
    }
}

/// A type definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeDef {
    /// Full type name.
    pub name: String,
    /// Every method declared by the type.
    #[serde(default)]
    pub methods: Vec<MethodDef>,
}

/// Reference to a metadata item inside a module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MetadataRef {
    /// Module name.
    pub module: String,
    /// Metadata token.
    pub token: u32,
}

impl MetadataRef {
    /// Creates a reference.
    pub fn new(module: impl Into<String>, token: u32) -> Self {
        Self { module: module.into(), token }
    }
}

/// What a selection in some view points at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SymbolReference {
    /// A method.
    Method(MetadataRef),
    /// A property; expands to its accessors.
    Property(MetadataRef),
    /// An event; expands to its accessors.
    Event(MetadataRef),
    /// A type; expands to all of its methods.
    Type(MetadataRef),
}

/// Resolves symbol references to definitions.
///
/// Results must be deterministic for a fixed input. `None` means the reference
/// could not be resolved, which callers treat as "nothing selected".
#[auto_impl(&, Arc, Box)]
pub trait MetadataResolver: Send + Sync {
    /// Resolves a method reference.
    fn resolve_method(&self, reference: &MetadataRef) -> Option<MethodDef>;

    /// Resolves a property reference.
    fn resolve_property(&self, reference: &MetadataRef) -> Option<PropertyDef>;

    /// Resolves an event reference.
    fn resolve_event(&self, reference: &MetadataRef) -> Option<EventDef>;

    /// Resolves a type reference.
    fn resolve_type(&self, reference: &MetadataRef) -> Option<TypeDef>;

    /// Id of the module with the given name.
    fn module_id(&self, module: &str) -> ModuleId;

    /// Expands `reference` to the methods it stands for.
    fn expand(&self, reference: &SymbolReference) -> Vec<MethodDef> {
        match reference {
            SymbolReference::Method(r) => self.resolve_method(r).into_iter().collect(),
            SymbolReference::Property(r) => {
                self.resolve_property(r).map(PropertyDef::into_methods).unwrap_or_default()
            }
            SymbolReference::Event(r) => {
                self.resolve_event(r).map(EventDef::into_methods).unwrap_or_default()
            }
            SymbolReference::Type(r) => self.resolve_type(r).map(|t| t.methods).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakable() {
        let mut method = MethodDef::new("m", 0x0600_0001, "Run");
        assert!(method.is_breakable());
        method.is_abstract = true;
        assert!(!method.is_breakable());
        method.is_abstract = false;
        method.has_body = false;
        assert!(!method.is_breakable());
    }

    #[test]
    fn test_accessor_order() {
        let property = PropertyDef {
            getters: vec![MethodDef::new("m", 1, "get_X")],
            setters: vec![MethodDef::new("m", 2, "set_X")],
            other: vec![MethodDef::new("m", 3, "other_X")],
        };
        let tokens: Vec<_> = property.into_methods().iter().map(|m| m.token).collect();
        assert_eq!(tokens, [1, 2, 3]);

        let event = EventDef {
            add: Some(MethodDef::new("m", 4, "add_E")),
            remove: None,
            invoke: Some(MethodDef::new("m", 6, "raise_E")),
            other: vec![MethodDef::new("m", 7, "other_E")],
        };
        let tokens: Vec<_> = event.into_methods().iter().map(|m| m.token).collect();
        assert_eq!(tokens, [4, 6, 7]);
    }

    #[test]
    fn test_symbol_reference_from_toml() {
        #[derive(Deserialize)]
        struct Selection {
            selection: Vec<SymbolReference>,
        }

        let parsed: Selection = toml::from_str(
            r#"
            [[selection]]
            kind = "type"
            module = "app.dll"
            token = 0x02000002
            "#,
        )
        .unwrap();
        assert_eq!(
            parsed.selection,
            [SymbolReference::Type(MetadataRef::new("app.dll", 0x0200_0002))]
        );
    }
}
