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

//! Adding breakpoints for a selection of methods.
//!
//! [`MethodBreakpointsService`] turns a set of candidate methods into one
//! deduplicated batch of code breakpoints. Locations that already have a
//! breakpoint, or that occur twice in the batch, are dropped and their
//! transient location objects closed.

use std::{collections::HashSet, sync::Arc};

use auto_impl::auto_impl;
use dbgobj_common::{
    types::{BreakpointKind, BreakpointSettings, CodeLocation, ModuleId},
    AuxData, BreakpointDefaults, LazyService,
};
use tracing::{debug, info};

use crate::{
    CodeBreakpoint, CodeBreakpointInfo, DbgObject, LocationObject, Manager, MetadataResolver,
    MethodDef, Result, SymbolReference,
};

/// Creates location objects for breakpoint requests.
#[auto_impl(&, Arc, Box)]
pub trait LocationFactory: Send + Sync {
    /// Creates the location `(module, token, offset)`.
    fn create(&self, module: ModuleId, token: u32, offset: u32) -> LocationObject;
}

/// Location factory that attaches no data.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainLocationFactory;

impl LocationFactory for PlainLocationFactory {
    fn create(&self, module: ModuleId, token: u32, offset: u32) -> LocationObject {
        LocationObject::new(CodeLocation::new(module, token, offset), AuxData::Empty)
    }
}

/// Lets the user edit tracepoint settings.
#[auto_impl(&, Arc, Box)]
pub trait SettingsPrompt: Send + Sync {
    /// Shows `defaults` for editing. `None` means the user cancelled.
    fn show(&self, defaults: BreakpointSettings) -> Option<BreakpointSettings>;
}

/// Collaborators of [`MethodBreakpointsService`], each built on first use.
pub struct BreakpointServices {
    /// Metadata resolver.
    pub resolver: LazyService<Arc<dyn MetadataResolver>>,
    /// Location factory.
    pub locations: LazyService<Arc<dyn LocationFactory>>,
    /// Tracepoint settings prompt.
    pub prompt: LazyService<Arc<dyn SettingsPrompt>>,
}

impl BreakpointServices {
    /// Wraps already constructed collaborators.
    pub fn ready(
        resolver: impl MetadataResolver + 'static,
        locations: impl LocationFactory + 'static,
        prompt: impl SettingsPrompt + 'static,
    ) -> Self {
        Self {
            resolver: LazyService::ready(Arc::new(resolver) as Arc<dyn MetadataResolver>),
            locations: LazyService::ready(Arc::new(locations) as Arc<dyn LocationFactory>),
            prompt: LazyService::ready(Arc::new(prompt) as Arc<dyn SettingsPrompt>),
        }
    }
}

/// What one call to [`MethodBreakpointsService::add`] did.
#[derive(Debug, Default)]
pub struct AddOutcome {
    /// Breakpoints added to the manager.
    pub added: Vec<Arc<CodeBreakpoint>>,
    /// Candidates dropped because a breakpoint already existed at their location.
    pub duplicates: usize,
    /// Candidates dropped because they are abstract or have no body.
    pub skipped: usize,
    /// True if the user cancelled the settings prompt.
    pub cancelled: bool,
}

/// Adds breakpoints or tracepoints for a set of methods.
pub struct MethodBreakpointsService {
    manager: Manager,
    services: BreakpointServices,
    defaults: BreakpointDefaults,
}

impl MethodBreakpointsService {
    /// Creates the service.
    pub fn new(
        manager: Manager,
        services: BreakpointServices,
        defaults: BreakpointDefaults,
    ) -> Self {
        Self { manager, services, defaults }
    }

    /// Adds a breakpoint at offset 0 of every breakable method.
    ///
    /// Tracepoint settings are asked for once for the whole batch; cancelling
    /// the prompt leaves the manager untouched.
    pub fn add(&self, methods: &[MethodDef], kind: BreakpointKind) -> Result<AddOutcome> {
        let Some(settings) = self.settings(kind) else {
            info!(%kind, count = methods.len(), "Breakpoint settings cancelled");
            return Ok(AddOutcome { cancelled: true, ..Default::default() });
        };

        let resolver = self.services.resolver.get();
        let locations = self.services.locations.get();

        let mut existing: HashSet<CodeLocation> =
            self.manager.breakpoints().iter().map(|bp| bp.location().clone()).collect();
        let mut requests = Vec::with_capacity(methods.len());
        let mut duplicates = Vec::new();
        let mut skipped = 0;

        for method in methods {
            if !method.is_breakable() {
                debug!(method = %method.name, token = method.token, "Skipping unbreakable method");
                skipped += 1;
                continue;
            }

            let location = locations.create(resolver.module_id(&method.module), method.token, 0);
            if existing.contains(location.location()) {
                debug!(location = %location.location(), "Breakpoint already exists");
                duplicates.push(DbgObject::from(Arc::new(location)));
                continue;
            }

            existing.insert(location.location().clone());
            requests.push(CodeBreakpointInfo::from_location(location, settings.clone()));
        }

        let duplicate_count = duplicates.len();
        self.manager.close(duplicates)?;
        let added = self.manager.add(requests)?;

        info!(
            %kind,
            added = added.len(),
            duplicates = duplicate_count,
            skipped,
            "Added method breakpoints"
        );
        Ok(AddOutcome { added, duplicates: duplicate_count, skipped, cancelled: false })
    }

    /// Expands `references` to methods and adds breakpoints for them.
    ///
    /// References that do not resolve are ignored; if nothing resolves, no
    /// prompt is shown and nothing changes.
    pub fn add_references(
        &self,
        references: &[SymbolReference],
        kind: BreakpointKind,
    ) -> Result<AddOutcome> {
        let resolver = self.services.resolver.get();
        let methods: Vec<_> =
            references.iter().flat_map(|reference| resolver.expand(reference)).collect();

        if methods.is_empty() {
            debug!(references = references.len(), "Selection resolved to no methods");
            return Ok(AddOutcome::default());
        }
        self.add(&methods, kind)
    }

    fn settings(&self, kind: BreakpointKind) -> Option<BreakpointSettings> {
        match kind {
            BreakpointKind::Breakpoint => Some(BreakpointSettings::enabled()),
            BreakpointKind::Tracepoint => {
                self.services.prompt.get().show(self.defaults.tracepoint_settings())
            }
        }
    }
}
