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

//! Binding of breakpoint locations to loaded modules.

use std::{collections::HashMap, sync::Arc};

use dbgobj_common::{types::CodeLocation, AuxData};
use tracing::{debug, warn};

use crate::{BoundBreakpoint, BoundBreakpointInfo, CodeBreakpoint, Module};

/// Result of one bind batch.
#[derive(Debug, Default)]
pub struct BindOutcome {
    /// One slot per request, in request order.
    pub results: Vec<Option<Arc<BoundBreakpoint>>>,
    /// Data of abandoned requests, still to be released.
    pub abandoned: Vec<AuxData>,
}

impl BindOutcome {
    /// Newly bound breakpoints, in request order.
    pub fn bound(&self) -> impl Iterator<Item = &Arc<BoundBreakpoint>> {
        self.results.iter().flatten()
    }
}

/// Matches bind requests against the live code breakpoints and modules.
///
/// A request binds when a code breakpoint exists at its location and a live
/// module with the location's module id is loaded. A module given in the
/// request is used when it still qualifies; otherwise the earliest loaded
/// module with a matching id is picked.
#[derive(Debug)]
pub struct BreakpointBinder<'a> {
    breakpoints: HashMap<&'a CodeLocation, &'a Arc<CodeBreakpoint>>,
    modules: Vec<&'a Arc<Module>>,
}

impl<'a> BreakpointBinder<'a> {
    /// Creates a binder over the given breakpoints and modules.
    pub fn new(
        breakpoints: impl IntoIterator<Item = &'a Arc<CodeBreakpoint>>,
        modules: impl IntoIterator<Item = &'a Arc<Module>>,
    ) -> Self {
        let breakpoints = breakpoints
            .into_iter()
            .filter(|bp| !bp.is_closed())
            .map(|bp| (bp.location(), bp))
            .collect();
        let modules = modules.into_iter().filter(|module| !module.is_closed()).collect();
        Self { breakpoints, modules }
    }

    /// Binds every request, preserving order and length.
    pub fn bind(&self, requests: Vec<BoundBreakpointInfo>) -> BindOutcome {
        let mut outcome =
            BindOutcome { results: Vec::with_capacity(requests.len()), abandoned: Vec::new() };

        for request in requests {
            match self.bind_one(&request) {
                Some((breakpoint, module)) => {
                    let bound = Arc::new(BoundBreakpoint::new(
                        breakpoint.clone(),
                        Some(module.clone()),
                        request.address,
                        request.message,
                        request.data,
                    ));
                    debug!(
                        location = %bound.location(),
                        module = %module.module_id(),
                        "Bound breakpoint"
                    );
                    outcome.results.push(Some(bound));
                }
                None => {
                    warn!(
                        location = %request.location,
                        "No live breakpoint or module for bind request"
                    );
                    outcome.results.push(None);
                    if !request.data.is_empty() {
                        outcome.abandoned.push(request.data);
                    }
                }
            }
        }

        outcome
    }

    fn bind_one(
        &self,
        request: &BoundBreakpointInfo,
    ) -> Option<(&'a Arc<CodeBreakpoint>, &'a Arc<Module>)> {
        let breakpoint = *self.breakpoints.get(&request.location)?;
        let wanted = request.location.module();

        let module = match &request.module {
            Some(given) => self
                .modules
                .iter()
                .copied()
                .find(|module| module.id() == given.id() && module.module_id() == wanted)?,
            None => self.modules.iter().copied().find(|module| module.module_id() == wanted)?,
        };

        Some((breakpoint, module))
    }
}
