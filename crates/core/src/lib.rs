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

//! dbgobj Core - the debugger object manager
//!
//! Debug engines report what they observe in a debuggee (app domains,
//! modules, threads, exceptions) through an [`ObjectFactory`] bound to their
//! runtime, and ask it to bind breakpoints. The [`Manager`] owns the resulting
//! object graph and the code breakpoint collection, and serializes every
//! structural change onto one dispatch thread. Consumers add breakpoints for
//! a selection of methods through the [`MethodBreakpointsService`], which
//! deduplicates against the breakpoints that already exist.
//!
//! ```text
//!  engine threads ──▶ ObjectFactory ──┐
//!                                     ├──▶ Dispatcher ──▶ Manager state ──▶ ManagerEvent
//!  consumers ──▶ MethodBreakpointsService ┘        (single thread)
//! ```

mod binder;
mod dispatcher;
mod error;
mod factory;
mod manager;
mod metadata;
mod module_id;
mod object;
mod service;

pub use binder::{BindOutcome, BreakpointBinder};
pub use dispatcher::Dispatcher;
pub use error::{ManagerError, Result};
pub use factory::{ManagerObjectFactory, ObjectFactory};
pub use manager::{Manager, ManagerEvent};
pub use metadata::{
    EventDef, MetadataRef, MetadataResolver, MethodDef, PropertyDef, SymbolReference, TypeDef,
};
pub use module_id::{DefaultModuleIdProvider, ModuleIdProvider};
pub use object::{
    AppDomain, BoundBreakpoint, BoundBreakpointInfo, CodeBreakpoint, CodeBreakpointInfo,
    DbgObject, Exception, LocationObject, Module, ObjectId, Runtime, SpecialStackFrame, Thread,
};
pub use service::{
    AddOutcome, BreakpointServices, LocationFactory, MethodBreakpointsService,
    PlainLocationFactory, SettingsPrompt,
};
