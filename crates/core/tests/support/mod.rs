//! Shared fixtures for the object manager integration tests.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use dbgobj_common::{
    types::{BreakpointSettings, ModuleId, ModuleInfo, RuntimeInfo},
    AuxData, BreakpointDefaults, LazyService, ManagerConfig,
};
use dbgobj_core::{
    BreakpointServices, EventDef, LocationFactory, LocationObject, Manager,
    ManagerObjectFactory, MetadataRef, MetadataResolver, MethodBreakpointsService, MethodDef,
    PlainLocationFactory, PropertyDef, SettingsPrompt, TypeDef,
};

pub fn manager() -> Manager {
    dbgobj_common::logging::ensure_test_logging(None);
    Manager::new(&ManagerConfig::default()).unwrap()
}

pub fn factory(manager: &Manager, process_id: u32) -> ManagerObjectFactory {
    manager.create_factory(RuntimeInfo { process_id, name: "CoreCLR".to_string() }).unwrap()
}

/// Module `name` loaded from `name.dll`; its id is `name!name.dll`.
pub fn module_info(name: &str) -> ModuleInfo {
    ModuleInfo { name: name.to_string(), filename: format!("{name}.dll"), ..Default::default() }
}

pub fn module_id(name: &str) -> ModuleId {
    ModuleId::new(name, format!("{name}.dll"))
}

/// Counts release calls of the data it hands out.
#[derive(Clone, Default)]
pub struct ReleaseCounter(Arc<AtomicUsize>);

impl ReleaseCounter {
    pub fn data(&self) -> AuxData {
        let count = self.0.clone();
        AuxData::on_release(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Resolver over a fixed table of types, keyed by type token.
#[derive(Default)]
pub struct TableResolver {
    pub types: HashMap<u32, TypeDef>,
}

impl TableResolver {
    pub fn with_type(mut self, token: u32, methods: Vec<MethodDef>) -> Self {
        self.types.insert(token, TypeDef { name: format!("Type{token:X}"), methods });
        self
    }

    fn method(&self, reference: &MetadataRef) -> Option<MethodDef> {
        self.types
            .values()
            .flat_map(|t| &t.methods)
            .find(|m| m.module == reference.module && m.token == reference.token)
            .cloned()
    }
}

impl MetadataResolver for TableResolver {
    fn resolve_method(&self, reference: &MetadataRef) -> Option<MethodDef> {
        self.method(reference)
    }

    fn resolve_property(&self, _reference: &MetadataRef) -> Option<PropertyDef> {
        None
    }

    fn resolve_event(&self, _reference: &MetadataRef) -> Option<EventDef> {
        None
    }

    fn resolve_type(&self, reference: &MetadataRef) -> Option<TypeDef> {
        self.types.get(&reference.token).cloned()
    }

    fn module_id(&self, module: &str) -> ModuleId {
        module_id(module)
    }
}

/// Location factory whose locations carry counted data.
pub struct CountingLocations(pub ReleaseCounter);

impl LocationFactory for CountingLocations {
    fn create(&self, module: ModuleId, token: u32, offset: u32) -> LocationObject {
        let location = PlainLocationFactory.create(module, token, offset);
        LocationObject::new(location.location().clone(), self.0.data())
    }
}

/// Prompt returning a fixed answer and counting how often it was shown.
pub struct ScriptedPrompt {
    pub answer: Option<BreakpointSettings>,
    pub shown: Arc<AtomicUsize>,
}

impl SettingsPrompt for ScriptedPrompt {
    fn show(&self, _defaults: BreakpointSettings) -> Option<BreakpointSettings> {
        self.shown.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

pub fn service(
    manager: &Manager,
    resolver: TableResolver,
    locations: ReleaseCounter,
    answer: Option<BreakpointSettings>,
    shown: Arc<AtomicUsize>,
) -> MethodBreakpointsService {
    let services = BreakpointServices {
        resolver: LazyService::ready(Arc::new(resolver) as Arc<dyn MetadataResolver>),
        locations: LazyService::ready(
            Arc::new(CountingLocations(locations)) as Arc<dyn LocationFactory>
        ),
        prompt: LazyService::ready(
            Arc::new(ScriptedPrompt { answer, shown }) as Arc<dyn SettingsPrompt>
        ),
    };
    MethodBreakpointsService::new(manager.clone(), services, BreakpointDefaults::default())
}
