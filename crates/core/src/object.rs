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

//! Debugger objects owned by the manager.
//!
//! Every object carries an [`ObjectId`], a closed flag and the auxiliary data
//! it was created with. Engines and consumers hold `Arc`s to these objects,
//! but only the manager's dispatch thread ever closes them.

use std::{
    any::Any,
    fmt::{self, Display},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use dbgobj_common::{
    types::{
        AppDomainInfo, BoundBreakpointMessage, BreakpointSettings, CodeLocation, ExceptionInfo,
        ModuleId, ModuleInfo, RuntimeInfo, ThreadInfo,
    },
    AuxData, DataSlot,
};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id of a debugger object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct ObjectCore {
    id: ObjectId,
    closed: AtomicBool,
    data: DataSlot,
}

impl ObjectCore {
    fn new(data: AuxData) -> Self {
        Self { id: ObjectId::next(), closed: AtomicBool::new(false), data: DataSlot::new(data) }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Flags the object as closed. Returns false if it already was.
    fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}

macro_rules! object_common {
    ($($ty:ty),* $(,)?) => {$(
        impl $ty {
            /// Unique object id.
            pub fn id(&self) -> ObjectId {
                self.core.id
            }

            /// Returns true once the object has been closed.
            pub fn is_closed(&self) -> bool {
                self.core.is_closed()
            }

            /// Runs `f` with the auxiliary data attached at creation, if it is a `T`.
            pub fn with_data<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
                self.core.data.with(f)
            }
        }
    )*};
}

object_common!(
    Runtime,
    AppDomain,
    Module,
    Thread,
    Exception,
    CodeBreakpoint,
    BoundBreakpoint,
    LocationObject,
);

/// A process/runtime pair driven by one engine.
#[derive(Debug)]
pub struct Runtime {
    core: ObjectCore,
    info: RuntimeInfo,
    pause_requested: AtomicBool,
}

impl Runtime {
    pub(crate) fn new(info: RuntimeInfo, data: AuxData) -> Self {
        Self { core: ObjectCore::new(data), info, pause_requested: AtomicBool::new(false) }
    }

    /// Engine-supplied snapshot.
    pub fn info(&self) -> &RuntimeInfo {
        &self.info
    }

    /// Records the `pause` flag of a creation event. Any `true` in a batch wins.
    pub(crate) fn request_pause(&self, pause: bool) {
        if pause {
            self.pause_requested.store(true, Ordering::Release);
        }
    }

    /// Returns true if any event since the last call asked for a pause.
    pub fn take_pause_request(&self) -> bool {
        self.pause_requested.swap(false, Ordering::AcqRel)
    }
}

/// An application domain.
#[derive(Debug)]
pub struct AppDomain {
    core: ObjectCore,
    runtime: Arc<Runtime>,
    info: AppDomainInfo,
}

impl AppDomain {
    pub(crate) fn new(runtime: Arc<Runtime>, info: AppDomainInfo, data: AuxData) -> Self {
        Self { core: ObjectCore::new(data), runtime, info }
    }

    /// Owning runtime.
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Engine-supplied snapshot.
    pub fn info(&self) -> &AppDomainInfo {
        &self.info
    }
}

/// A loaded module.
#[derive(Debug)]
pub struct Module {
    core: ObjectCore,
    runtime: Arc<Runtime>,
    app_domain: Option<Arc<AppDomain>>,
    module_id: ModuleId,
    info: ModuleInfo,
}

impl Module {
    pub(crate) fn new(
        runtime: Arc<Runtime>,
        app_domain: Option<Arc<AppDomain>>,
        module_id: ModuleId,
        info: ModuleInfo,
        data: AuxData,
    ) -> Self {
        Self { core: ObjectCore::new(data), runtime, app_domain, module_id, info }
    }

    /// Owning runtime.
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// App domain, `None` for modules outside any app domain.
    pub fn app_domain(&self) -> Option<&Arc<AppDomain>> {
        self.app_domain.as_ref()
    }

    /// Id used to match breakpoint locations against this module.
    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    /// Engine-supplied snapshot.
    pub fn info(&self) -> &ModuleInfo {
        &self.info
    }
}

/// A debuggee thread.
#[derive(Debug)]
pub struct Thread {
    core: ObjectCore,
    runtime: Arc<Runtime>,
    app_domain: Option<Arc<AppDomain>>,
    info: ThreadInfo,
}

impl Thread {
    pub(crate) fn new(
        runtime: Arc<Runtime>,
        app_domain: Option<Arc<AppDomain>>,
        info: ThreadInfo,
        data: AuxData,
    ) -> Self {
        Self { core: ObjectCore::new(data), runtime, app_domain, info }
    }

    /// Owning runtime.
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// App domain the thread currently runs in, if known.
    pub fn app_domain(&self) -> Option<&Arc<AppDomain>> {
        self.app_domain.as_ref()
    }

    /// Engine-supplied snapshot.
    pub fn info(&self) -> &ThreadInfo {
        &self.info
    }
}

/// A thrown exception.
#[derive(Debug)]
pub struct Exception {
    core: ObjectCore,
    runtime: Arc<Runtime>,
    info: ExceptionInfo,
    thread: Option<Arc<Thread>>,
    module: Option<Arc<Module>>,
}

impl Exception {
    pub(crate) fn new(
        runtime: Arc<Runtime>,
        info: ExceptionInfo,
        thread: Option<Arc<Thread>>,
        module: Option<Arc<Module>>,
        data: AuxData,
    ) -> Self {
        Self { core: ObjectCore::new(data), runtime, info, thread, module }
    }

    /// Owning runtime.
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Engine-supplied snapshot.
    pub fn info(&self) -> &ExceptionInfo {
        &self.info
    }

    /// Thread that threw the exception, if known.
    pub fn thread(&self) -> Option<&Arc<Thread>> {
        self.thread.as_ref()
    }

    /// Module that threw the exception, if known.
    pub fn module(&self) -> Option<&Arc<Module>> {
        self.module.as_ref()
    }
}

/// A code location not yet owned by a breakpoint.
///
/// Location factories hand these out with their own auxiliary data. A location
/// is either consumed by [`CodeBreakpointInfo::from_location`] or closed
/// through the manager.
#[derive(Debug)]
pub struct LocationObject {
    core: ObjectCore,
    location: CodeLocation,
}

impl LocationObject {
    /// Wraps `location` together with `data`.
    pub fn new(location: CodeLocation, data: AuxData) -> Self {
        Self { core: ObjectCore::new(data), location }
    }

    /// The location value.
    pub fn location(&self) -> &CodeLocation {
        &self.location
    }
}

/// Request to create one code breakpoint.
#[derive(Debug)]
pub struct CodeBreakpointInfo {
    /// Breakpoint location.
    pub location: CodeLocation,
    /// Breakpoint settings.
    pub settings: BreakpointSettings,
    /// Data owned by the new breakpoint.
    pub data: AuxData,
}

impl CodeBreakpointInfo {
    /// Creates a request without auxiliary data.
    pub fn new(location: CodeLocation, settings: BreakpointSettings) -> Self {
        Self { location, settings, data: AuxData::Empty }
    }

    /// Creates a request that takes over a location object and its data.
    pub fn from_location(location: LocationObject, settings: BreakpointSettings) -> Self {
        let data = location.core.data.take();
        location.core.mark_closed();
        Self { location: location.location, settings, data }
    }
}

/// A breakpoint at a code location, independent of loaded modules.
#[derive(Debug)]
pub struct CodeBreakpoint {
    core: ObjectCore,
    location: CodeLocation,
    settings: BreakpointSettings,
}

impl CodeBreakpoint {
    pub(crate) fn new(info: CodeBreakpointInfo) -> Self {
        Self { core: ObjectCore::new(info.data), location: info.location, settings: info.settings }
    }

    /// Breakpoint location.
    pub fn location(&self) -> &CodeLocation {
        &self.location
    }

    /// Breakpoint settings.
    pub fn settings(&self) -> &BreakpointSettings {
        &self.settings
    }

    /// Returns true if this is a tracepoint.
    pub fn is_tracepoint(&self) -> bool {
        self.settings.is_tracepoint()
    }
}

/// Request from an engine to bind a breakpoint location.
#[derive(Debug)]
pub struct BoundBreakpointInfo {
    /// Location of the breakpoint to bind.
    pub location: CodeLocation,
    /// Module the engine bound it in, if it already knows.
    pub module: Option<Arc<Module>>,
    /// Address, or [`BoundBreakpointInfo::NO_ADDRESS`].
    pub address: u64,
    /// Warning/error message from the engine.
    pub message: Option<BoundBreakpointMessage>,
    /// Data owned by the bound breakpoint, released if binding is abandoned.
    pub data: AuxData,
}

impl BoundBreakpointInfo {
    /// Address value used when the bound address isn't known.
    pub const NO_ADDRESS: u64 = u64::MAX;

    /// Creates a request with an unknown address and no data.
    pub fn new(location: CodeLocation) -> Self {
        Self {
            location,
            module: None,
            address: Self::NO_ADDRESS,
            message: None,
            data: AuxData::Empty,
        }
    }

    /// Sets the module.
    pub fn with_module(mut self, module: Arc<Module>) -> Self {
        self.module = Some(module);
        self
    }

    /// Sets the address.
    pub fn with_address(mut self, address: u64) -> Self {
        self.address = address;
        self
    }

    /// Sets the engine message.
    pub fn with_message(mut self, message: BoundBreakpointMessage) -> Self {
        self.message = Some(message);
        self
    }

    /// Sets the auxiliary data.
    pub fn with_data(mut self, data: AuxData) -> Self {
        self.data = data;
        self
    }
}

/// A code breakpoint bound to a concrete module instance.
#[derive(Debug)]
pub struct BoundBreakpoint {
    core: ObjectCore,
    breakpoint: Arc<CodeBreakpoint>,
    module: Option<Arc<Module>>,
    address: u64,
    message: Option<BoundBreakpointMessage>,
}

impl BoundBreakpoint {
    pub(crate) fn new(
        breakpoint: Arc<CodeBreakpoint>,
        module: Option<Arc<Module>>,
        address: u64,
        message: Option<BoundBreakpointMessage>,
        data: AuxData,
    ) -> Self {
        Self { core: ObjectCore::new(data), breakpoint, module, address, message }
    }

    /// The breakpoint this binding belongs to.
    pub fn breakpoint(&self) -> &Arc<CodeBreakpoint> {
        &self.breakpoint
    }

    /// Location of the owning breakpoint.
    pub fn location(&self) -> &CodeLocation {
        self.breakpoint.location()
    }

    /// Module the breakpoint is bound in.
    pub fn module(&self) -> Option<&Arc<Module>> {
        self.module.as_ref()
    }

    /// Bound address, `None` if unknown.
    pub fn address(&self) -> Option<u64> {
        (self.address != BoundBreakpointInfo::NO_ADDRESS).then_some(self.address)
    }

    /// Engine message, if any.
    pub fn message(&self) -> Option<&BoundBreakpointMessage> {
        self.message.as_ref()
    }
}

/// A synthetic stack frame, displayed as `[name]`.
#[derive(Debug, Clone)]
pub struct SpecialStackFrame {
    name: String,
    module: Option<Arc<Module>>,
    function_offset: u32,
    function_token: u32,
}

impl SpecialStackFrame {
    /// Token value of frames without a function.
    pub const INVALID_FUNCTION_TOKEN: u32 = u32::MAX;

    pub(crate) fn new(
        name: String,
        module: Option<Arc<Module>>,
        function_offset: u32,
        function_token: u32,
    ) -> Self {
        Self { name, module, function_offset, function_token }
    }

    /// Frame label, e.g. "Managed to Native Transition".
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module, if any.
    pub fn module(&self) -> Option<&Arc<Module>> {
        self.module.as_ref()
    }

    /// Offset inside the function.
    pub fn function_offset(&self) -> u32 {
        self.function_offset
    }

    /// Function token, `None` if the frame has no function.
    pub fn function_token(&self) -> Option<u32> {
        (self.function_token != Self::INVALID_FUNCTION_TOKEN).then_some(self.function_token)
    }
}

impl Display for SpecialStackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.name)
    }
}

/// Any object the manager can close.
#[derive(Debug, Clone)]
pub enum DbgObject {
    /// A runtime.
    Runtime(Arc<Runtime>),
    /// An app domain.
    AppDomain(Arc<AppDomain>),
    /// A module.
    Module(Arc<Module>),
    /// A thread.
    Thread(Arc<Thread>),
    /// An exception.
    Exception(Arc<Exception>),
    /// A code breakpoint.
    Breakpoint(Arc<CodeBreakpoint>),
    /// A bound breakpoint.
    BoundBreakpoint(Arc<BoundBreakpoint>),
    /// A transient location.
    Location(Arc<LocationObject>),
}

macro_rules! dispatch_object {
    ($self:expr, $obj:ident => $body:expr) => {
        match $self {
            Self::Runtime($obj) => $body,
            Self::AppDomain($obj) => $body,
            Self::Module($obj) => $body,
            Self::Thread($obj) => $body,
            Self::Exception($obj) => $body,
            Self::Breakpoint($obj) => $body,
            Self::BoundBreakpoint($obj) => $body,
            Self::Location($obj) => $body,
        }
    };
}

impl DbgObject {
    fn core(&self) -> &ObjectCore {
        dispatch_object!(self, obj => &obj.core)
    }

    /// Object id.
    pub fn id(&self) -> ObjectId {
        self.core().id
    }

    /// Returns true once the object has been closed.
    pub fn is_closed(&self) -> bool {
        self.core().is_closed()
    }

    /// Short name of the object kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Runtime(_) => "runtime",
            Self::AppDomain(_) => "app domain",
            Self::Module(_) => "module",
            Self::Thread(_) => "thread",
            Self::Exception(_) => "exception",
            Self::Breakpoint(_) => "breakpoint",
            Self::BoundBreakpoint(_) => "bound breakpoint",
            Self::Location(_) => "location",
        }
    }

    pub(crate) fn mark_closed(&self) -> bool {
        self.core().mark_closed()
    }

    pub(crate) fn release_data(&self) {
        self.core().data.release();
    }
}

impl Display for DbgObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

macro_rules! impl_into_object {
    ($($variant:ident($ty:ty)),* $(,)?) => {$(
        impl From<Arc<$ty>> for DbgObject {
            fn from(value: Arc<$ty>) -> Self {
                Self::$variant(value)
            }
        }
    )*};
}

impl_into_object!(
    Runtime(Runtime),
    AppDomain(AppDomain),
    Module(Module),
    Thread(Thread),
    Exception(Exception),
    Breakpoint(CodeBreakpoint),
    BoundBreakpoint(BoundBreakpoint),
    Location(LocationObject),
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_object_ids_are_unique() {
        let loc = CodeLocation::new(ModuleId::new("a", "a.dll"), 1, 0);
        let a = LocationObject::new(loc.clone(), AuxData::Empty);
        let b = LocationObject::new(loc, AuxData::Empty);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_from_location_moves_data_without_release() {
        let released = Arc::new(AtomicUsize::new(0));
        let r = released.clone();
        let loc = CodeLocation::new(ModuleId::new("a", "a.dll"), 1, 0);
        let object = LocationObject::new(
            loc.clone(),
            AuxData::on_release(move || {
                r.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let info = CodeBreakpointInfo::from_location(object, BreakpointSettings::enabled());
        assert_eq!(info.location, loc);
        assert!(info.data.has_release());
        assert_eq!(released.load(Ordering::SeqCst), 0);

        info.data.release();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_special_frame_display_and_token() {
        let frame = SpecialStackFrame::new(
            "Managed to Native Transition".to_string(),
            None,
            0,
            SpecialStackFrame::INVALID_FUNCTION_TOKEN,
        );
        assert_eq!(frame.to_string(), "[Managed to Native Transition]");
        assert_eq!(frame.function_token(), None);
    }

    #[test]
    fn test_bound_info_builder() {
        let loc = CodeLocation::new(ModuleId::new("a", "a.dll"), 1, 0);
        let info = BoundBreakpointInfo::new(loc)
            .with_address(0x1000)
            .with_message(BoundBreakpointMessage::warning("jitted later"));
        assert_eq!(info.address, 0x1000);
        assert!(info.module.is_none());
        assert!(info.message.is_some());
    }
}
