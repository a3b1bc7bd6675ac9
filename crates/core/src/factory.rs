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

//! The surface debug engines report through.

use std::sync::Arc;

use dbgobj_common::{
    types::{AppDomainInfo, ExceptionInfo, ModuleInfo, ThreadInfo},
    AuxData,
};

use crate::{
    AppDomain, BoundBreakpoint, BoundBreakpointInfo, Exception, Manager, Module, Result, Runtime,
    SpecialStackFrame, Thread,
};

/// Creates debugger objects on behalf of one engine, bound to one runtime.
///
/// Every returned object is registered with the manager before the call
/// returns. Implementations do their own thread marshalling, so engines may
/// call from any thread. The `pause` flag of each call is OR'ed into the
/// runtime's pending pause request.
///
/// Creating an object under a closed parent fails with
/// [`ManagerError::ParentClosed`](crate::ManagerError::ParentClosed); the
/// data passed in is released in that case.
pub trait ObjectFactory {
    /// The runtime this factory creates objects for.
    fn runtime(&self) -> &Arc<Runtime>;

    /// Creates an app domain owning `data`.
    fn create_app_domain_with(
        &self,
        info: AppDomainInfo,
        pause: bool,
        data: AuxData,
    ) -> Result<Arc<AppDomain>>;

    /// Creates a module owning `data`.
    fn create_module_with(
        &self,
        app_domain: Option<Arc<AppDomain>>,
        info: ModuleInfo,
        pause: bool,
        data: AuxData,
    ) -> Result<Arc<Module>>;

    /// Creates a thread owning `data`.
    fn create_thread_with(
        &self,
        app_domain: Option<Arc<AppDomain>>,
        info: ThreadInfo,
        pause: bool,
        data: AuxData,
    ) -> Result<Arc<Thread>>;

    /// Creates an exception owning `data`.
    fn create_exception_with(
        &self,
        info: ExceptionInfo,
        thread: Option<Arc<Thread>>,
        module: Option<Arc<Module>>,
        pause: bool,
        data: AuxData,
    ) -> Result<Arc<Exception>>;

    /// Binds breakpoint locations.
    ///
    /// Returns one slot per request, in request order. A slot is `None` when
    /// no code breakpoint exists at the location or no loaded module matches
    /// it; the data of such a request has already been released.
    fn create_bound_breakpoints(
        &self,
        infos: Vec<BoundBreakpointInfo>,
    ) -> Result<Vec<Option<Arc<BoundBreakpoint>>>>;

    /// Creates a synthetic stack frame. `function_token` is
    /// [`SpecialStackFrame::INVALID_FUNCTION_TOKEN`] for frames without one.
    fn create_special_stack_frame_with(
        &self,
        name: &str,
        module: Option<Arc<Module>>,
        function_offset: u32,
        function_token: u32,
    ) -> SpecialStackFrame {
        SpecialStackFrame::new(name.to_string(), module, function_offset, function_token)
    }

    /// Creates an app domain without data.
    fn create_app_domain(&self, info: AppDomainInfo, pause: bool) -> Result<Arc<AppDomain>> {
        self.create_app_domain_with(info, pause, AuxData::Empty)
    }

    /// Creates a module without data.
    fn create_module(
        &self,
        app_domain: Option<Arc<AppDomain>>,
        info: ModuleInfo,
        pause: bool,
    ) -> Result<Arc<Module>> {
        self.create_module_with(app_domain, info, pause, AuxData::Empty)
    }

    /// Creates a thread without data.
    fn create_thread(
        &self,
        app_domain: Option<Arc<AppDomain>>,
        info: ThreadInfo,
        pause: bool,
    ) -> Result<Arc<Thread>> {
        self.create_thread_with(app_domain, info, pause, AuxData::Empty)
    }

    /// Creates an exception without data.
    fn create_exception(
        &self,
        info: ExceptionInfo,
        thread: Option<Arc<Thread>>,
        module: Option<Arc<Module>>,
        pause: bool,
    ) -> Result<Arc<Exception>> {
        self.create_exception_with(info, thread, module, pause, AuxData::Empty)
    }

    /// Binds a single breakpoint location.
    fn create_bound_breakpoint(
        &self,
        info: BoundBreakpointInfo,
    ) -> Result<Option<Arc<BoundBreakpoint>>> {
        Ok(self.create_bound_breakpoints(vec![info])?.pop().flatten())
    }

    /// Creates a synthetic stack frame without a function.
    fn create_special_stack_frame(
        &self,
        name: &str,
        module: Option<Arc<Module>>,
    ) -> SpecialStackFrame {
        self.create_special_stack_frame_with(
            name,
            module,
            0,
            SpecialStackFrame::INVALID_FUNCTION_TOKEN,
        )
    }
}

/// [`ObjectFactory`] that registers objects with a [`Manager`].
#[derive(Debug, Clone)]
pub struct ManagerObjectFactory {
    manager: Manager,
    runtime: Arc<Runtime>,
}

impl ManagerObjectFactory {
    pub(crate) fn new(manager: Manager, runtime: Arc<Runtime>) -> Self {
        Self { manager, runtime }
    }

    /// The manager objects are registered with.
    pub fn manager(&self) -> &Manager {
        &self.manager
    }
}

impl ObjectFactory for ManagerObjectFactory {
    fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    fn create_app_domain_with(
        &self,
        info: AppDomainInfo,
        pause: bool,
        data: AuxData,
    ) -> Result<Arc<AppDomain>> {
        self.manager.create_app_domain(self.runtime.clone(), info, pause, data)
    }

    fn create_module_with(
        &self,
        app_domain: Option<Arc<AppDomain>>,
        info: ModuleInfo,
        pause: bool,
        data: AuxData,
    ) -> Result<Arc<Module>> {
        self.manager.create_module(self.runtime.clone(), app_domain, info, pause, data)
    }

    fn create_thread_with(
        &self,
        app_domain: Option<Arc<AppDomain>>,
        info: ThreadInfo,
        pause: bool,
        data: AuxData,
    ) -> Result<Arc<Thread>> {
        self.manager.create_thread(self.runtime.clone(), app_domain, info, pause, data)
    }

    fn create_exception_with(
        &self,
        info: ExceptionInfo,
        thread: Option<Arc<Thread>>,
        module: Option<Arc<Module>>,
        pause: bool,
        data: AuxData,
    ) -> Result<Arc<Exception>> {
        self.manager.create_exception(self.runtime.clone(), info, thread, module, pause, data)
    }

    fn create_bound_breakpoints(
        &self,
        infos: Vec<BoundBreakpointInfo>,
    ) -> Result<Vec<Option<Arc<BoundBreakpoint>>>> {
        self.manager.create_bound_breakpoints(self.runtime.clone(), infos)
    }
}
