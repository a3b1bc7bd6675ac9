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

//! The object manager.
//!
//! [`Manager`] owns the live object graph of every debugged runtime and the
//! code breakpoint collection. Readers take snapshots from any thread; every
//! create, add, bind and close runs on the dispatch thread, and notifications
//! are sent from there too, so all subscribers observe a single total order.

use std::{
    collections::{BTreeMap, VecDeque},
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use dbgobj_common::{
    types::{AppDomainInfo, ExceptionInfo, ModuleInfo, RuntimeInfo, ThreadInfo},
    AuxData, ManagerConfig,
};
use itertools::Itertools;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::{
    AppDomain, BoundBreakpoint, BoundBreakpointInfo, BreakpointBinder, CodeBreakpoint,
    CodeBreakpointInfo, DbgObject, DefaultModuleIdProvider, Dispatcher, Exception,
    ManagerError, ManagerObjectFactory, Module, ModuleIdProvider, ObjectId, Result, Runtime,
    Thread,
};

/// Notification sent from the dispatch thread after a structural change.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    /// An engine reported a new object.
    ObjectsCreated {
        /// The new objects.
        objects: Vec<DbgObject>,
        /// True if the engine asked for the debuggee to pause.
        pause: bool,
    },
    /// Objects were closed, cascaded children included.
    ObjectsClosed(Vec<DbgObject>),
    /// Code breakpoints were added.
    BreakpointsAdded(Vec<Arc<CodeBreakpoint>>),
    /// Code breakpoints were bound to modules.
    BoundBreakpointsAdded(Vec<Arc<BoundBreakpoint>>),
}

#[derive(Debug, Default)]
struct ManagerState {
    runtimes: BTreeMap<ObjectId, Arc<Runtime>>,
    app_domains: BTreeMap<ObjectId, Arc<AppDomain>>,
    modules: BTreeMap<ObjectId, Arc<Module>>,
    threads: BTreeMap<ObjectId, Arc<Thread>>,
    exceptions: BTreeMap<ObjectId, Arc<Exception>>,
    breakpoints: BTreeMap<ObjectId, Arc<CodeBreakpoint>>,
    bound_breakpoints: BTreeMap<ObjectId, Arc<BoundBreakpoint>>,
}

impl ManagerState {
    fn remove(&mut self, object: &DbgObject) {
        let id = object.id();
        match object {
            DbgObject::Runtime(_) => {
                self.runtimes.remove(&id);
            }
            DbgObject::AppDomain(_) => {
                self.app_domains.remove(&id);
            }
            DbgObject::Module(_) => {
                self.modules.remove(&id);
            }
            DbgObject::Thread(_) => {
                self.threads.remove(&id);
            }
            DbgObject::Exception(_) => {
                self.exceptions.remove(&id);
            }
            DbgObject::Breakpoint(_) => {
                self.breakpoints.remove(&id);
            }
            DbgObject::BoundBreakpoint(_) => {
                self.bound_breakpoints.remove(&id);
            }
            DbgObject::Location(_) => {}
        }
    }

    /// Objects that must be closed together with `object`.
    fn children(&self, object: &DbgObject) -> Vec<DbgObject> {
        let id = object.id();
        let in_app_domain = |app_domain: Option<&Arc<AppDomain>>| {
            app_domain.is_some_and(|app_domain| app_domain.id() == id)
        };

        match object {
            DbgObject::Runtime(_) => {
                let app_domains = self.app_domains.values().filter(|a| a.runtime().id() == id);
                let modules = self.modules.values().filter(|m| m.runtime().id() == id);
                let threads = self.threads.values().filter(|t| t.runtime().id() == id);
                let exceptions = self.exceptions.values().filter(|e| e.runtime().id() == id);
                app_domains
                    .cloned()
                    .map(DbgObject::from)
                    .chain(modules.cloned().map(DbgObject::from))
                    .chain(threads.cloned().map(DbgObject::from))
                    .chain(exceptions.cloned().map(DbgObject::from))
                    .collect()
            }
            DbgObject::AppDomain(_) => {
                let modules = self.modules.values().filter(|m| in_app_domain(m.app_domain()));
                let threads = self.threads.values().filter(|t| in_app_domain(t.app_domain()));
                modules
                    .cloned()
                    .map(DbgObject::from)
                    .chain(threads.cloned().map(DbgObject::from))
                    .collect()
            }
            DbgObject::Module(_) => self
                .bound_breakpoints
                .values()
                .filter(|b| b.module().is_some_and(|m| m.id() == id))
                .cloned()
                .map(DbgObject::from)
                .collect(),
            DbgObject::Breakpoint(_) => self
                .bound_breakpoints
                .values()
                .filter(|b| b.breakpoint().id() == id)
                .cloned()
                .map(DbgObject::from)
                .collect(),
            DbgObject::Thread(_)
            | DbgObject::Exception(_)
            | DbgObject::BoundBreakpoint(_)
            | DbgObject::Location(_) => Vec::new(),
        }
    }
}

struct ManagerInner {
    state: RwLock<ManagerState>,
    dispatcher: Dispatcher,
    events: broadcast::Sender<ManagerEvent>,
    module_ids: Arc<dyn ModuleIdProvider>,
}

impl fmt::Debug for ManagerInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerInner")
            .field("state", &self.state)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

/// Handle to the object manager. Cloning it is cheap.
#[derive(Debug, Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl Manager {
    /// Starts a manager with the default module id provider.
    pub fn new(config: &ManagerConfig) -> Result<Self> {
        Self::with_module_id_provider(config, DefaultModuleIdProvider)
    }

    /// Starts a manager that names modules with `module_ids`.
    pub fn with_module_id_provider(
        config: &ManagerConfig,
        module_ids: impl ModuleIdProvider + 'static,
    ) -> Result<Self> {
        let dispatcher = Dispatcher::spawn(&config.dispatcher_thread_name)?;
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        info!(thread = %config.dispatcher_thread_name, "Object manager started");
        Ok(Self {
            inner: Arc::new(ManagerInner {
                state: RwLock::new(ManagerState::default()),
                dispatcher,
                events,
                module_ids: Arc::new(module_ids),
            }),
        })
    }

    /// Subscribes to notifications sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.inner.events.subscribe()
    }

    /// Returns true if the caller runs on the dispatch thread.
    pub fn is_dispatch_thread(&self) -> bool {
        self.inner.dispatcher.is_dispatch_thread()
    }

    /// Live runtimes.
    pub fn runtimes(&self) -> Vec<Arc<Runtime>> {
        self.inner.state.read().runtimes.values().cloned().collect()
    }

    /// Live app domains.
    pub fn app_domains(&self) -> Vec<Arc<AppDomain>> {
        self.inner.state.read().app_domains.values().cloned().collect()
    }

    /// Live modules, in load order.
    pub fn modules(&self) -> Vec<Arc<Module>> {
        self.inner.state.read().modules.values().cloned().collect()
    }

    /// Live threads.
    pub fn threads(&self) -> Vec<Arc<Thread>> {
        self.inner.state.read().threads.values().cloned().collect()
    }

    /// Live exceptions.
    pub fn exceptions(&self) -> Vec<Arc<Exception>> {
        self.inner.state.read().exceptions.values().cloned().collect()
    }

    /// Snapshot of the code breakpoint collection, in creation order.
    pub fn breakpoints(&self) -> Vec<Arc<CodeBreakpoint>> {
        self.inner.state.read().breakpoints.values().cloned().collect()
    }

    /// Live bound breakpoints.
    pub fn bound_breakpoints(&self) -> Vec<Arc<BoundBreakpoint>> {
        self.inner.state.read().bound_breakpoints.values().cloned().collect()
    }

    /// Registers a runtime and returns the factory its engine reports through.
    pub fn create_factory(&self, info: RuntimeInfo) -> Result<ManagerObjectFactory> {
        self.create_factory_with(info, AuxData::Empty)
    }

    /// Like [`Manager::create_factory`], attaching `data` to the runtime.
    pub fn create_factory_with(
        &self,
        info: RuntimeInfo,
        data: AuxData,
    ) -> Result<ManagerObjectFactory> {
        let runtime = self.run(move |inner| {
            let runtime = Arc::new(Runtime::new(info, data));
            inner.state.write().runtimes.insert(runtime.id(), runtime.clone());
            inner.created(&runtime, runtime.clone().into(), false);
            Ok(runtime)
        })?;
        Ok(ManagerObjectFactory::new(self.clone(), runtime))
    }

    /// Adds code breakpoints. Callers deduplicate against [`Manager::breakpoints`].
    pub fn add(&self, infos: Vec<CodeBreakpointInfo>) -> Result<Vec<Arc<CodeBreakpoint>>> {
        if infos.is_empty() {
            return Ok(Vec::new());
        }

        self.run(move |inner| {
            let added: Vec<_> =
                infos.into_iter().map(|info| Arc::new(CodeBreakpoint::new(info))).collect();
            {
                let mut state = inner.state.write();
                for bp in &added {
                    state.breakpoints.insert(bp.id(), bp.clone());
                }
            }

            info!(count = added.len(), "Added code breakpoints");
            debug!("Added breakpoints at {}", added.iter().map(|bp| bp.location()).join(", "));
            inner.send(ManagerEvent::BreakpointsAdded(added.clone()));
            Ok(added)
        })
    }

    /// Closes `objects` and everything owned by them.
    ///
    /// Runs asynchronously on the dispatch thread. Closing an object twice is a
    /// no-op.
    pub fn close(&self, objects: Vec<DbgObject>) -> Result<()> {
        if objects.is_empty() {
            return Ok(());
        }

        let inner = self.inner.clone();
        self.inner.dispatcher.post(move || inner.close_now(objects))
    }

    /// Waits until every job queued before this call has run.
    pub fn flush(&self) -> Result<()> {
        self.inner.dispatcher.invoke(|| ())
    }

    pub(crate) fn create_app_domain(
        &self,
        runtime: Arc<Runtime>,
        info: AppDomainInfo,
        pause: bool,
        data: AuxData,
    ) -> Result<Arc<AppDomain>> {
        self.run(move |inner| {
            let data = ensure_open([runtime.clone().into()], data)?;
            let app_domain = Arc::new(AppDomain::new(runtime, info, data));
            inner.state.write().app_domains.insert(app_domain.id(), app_domain.clone());
            inner.created(app_domain.runtime(), app_domain.clone().into(), pause);
            Ok(app_domain)
        })
    }

    pub(crate) fn create_module(
        &self,
        runtime: Arc<Runtime>,
        app_domain: Option<Arc<AppDomain>>,
        info: ModuleInfo,
        pause: bool,
        data: AuxData,
    ) -> Result<Arc<Module>> {
        self.run(move |inner| {
            let parents = parents(&runtime, app_domain.iter().cloned().map(DbgObject::from));
            let data = ensure_open(parents, data)?;
            let module_id = inner.module_ids.module_id(&info);
            let module = Arc::new(Module::new(runtime, app_domain, module_id, info, data));
            inner.state.write().modules.insert(module.id(), module.clone());
            inner.created(module.runtime(), module.clone().into(), pause);
            Ok(module)
        })
    }

    pub(crate) fn create_thread(
        &self,
        runtime: Arc<Runtime>,
        app_domain: Option<Arc<AppDomain>>,
        info: ThreadInfo,
        pause: bool,
        data: AuxData,
    ) -> Result<Arc<Thread>> {
        self.run(move |inner| {
            let parents = parents(&runtime, app_domain.iter().cloned().map(DbgObject::from));
            let data = ensure_open(parents, data)?;
            let thread = Arc::new(Thread::new(runtime, app_domain, info, data));
            inner.state.write().threads.insert(thread.id(), thread.clone());
            inner.created(thread.runtime(), thread.clone().into(), pause);
            Ok(thread)
        })
    }

    pub(crate) fn create_exception(
        &self,
        runtime: Arc<Runtime>,
        info: ExceptionInfo,
        thread: Option<Arc<Thread>>,
        module: Option<Arc<Module>>,
        pause: bool,
        data: AuxData,
    ) -> Result<Arc<Exception>> {
        self.run(move |inner| {
            let related = thread
                .iter()
                .cloned()
                .map(DbgObject::from)
                .chain(module.iter().cloned().map(DbgObject::from));
            let data = ensure_open(parents(&runtime, related), data)?;
            let exception = Arc::new(Exception::new(runtime, info, thread, module, data));
            inner.state.write().exceptions.insert(exception.id(), exception.clone());
            inner.created(exception.runtime(), exception.clone().into(), pause);
            Ok(exception)
        })
    }

    pub(crate) fn create_bound_breakpoints(
        &self,
        runtime: Arc<Runtime>,
        infos: Vec<BoundBreakpointInfo>,
    ) -> Result<Vec<Option<Arc<BoundBreakpoint>>>> {
        if infos.is_empty() {
            return Ok(Vec::new());
        }

        self.run(move |inner| {
            let outcome = {
                let mut state = inner.state.write();
                let modules = state.modules.values().filter(|m| m.runtime().id() == runtime.id());
                let binder = BreakpointBinder::new(state.breakpoints.values(), modules);
                let outcome = binder.bind(infos);
                for bound in outcome.bound() {
                    state.bound_breakpoints.insert(bound.id(), bound.clone());
                }
                outcome
            };

            let bound: Vec<_> = outcome.bound().cloned().collect();
            info!(
                requested = outcome.results.len(),
                bound = bound.len(),
                abandoned = outcome.abandoned.len(),
                "Bound breakpoints"
            );
            for data in outcome.abandoned {
                guarded_release(|| data.release(), &"abandoned bind request");
            }
            if !bound.is_empty() {
                inner.send(ManagerEvent::BoundBreakpointsAdded(bound));
            }
            Ok(outcome.results)
        })
    }

    fn run<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&ManagerInner) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let inner = self.inner.clone();
        self.inner.dispatcher.invoke(move || f(&inner))?
    }
}

impl ManagerInner {
    fn send(&self, event: ManagerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn created(&self, runtime: &Runtime, object: DbgObject, pause: bool) {
        runtime.request_pause(pause);
        debug!(object = %object, pause, "Created object");
        self.send(ManagerEvent::ObjectsCreated { objects: vec![object], pause });
    }

    fn close_now(&self, objects: Vec<DbgObject>) {
        let closed = {
            let mut state = self.state.write();
            let mut queue = VecDeque::from(objects);
            let mut closed = Vec::new();

            while let Some(object) = queue.pop_front() {
                if !object.mark_closed() {
                    continue;
                }
                state.remove(&object);
                queue.extend(state.children(&object));
                closed.push(object);
            }
            closed
        };

        if closed.is_empty() {
            return;
        }

        info!(count = closed.len(), "Closed objects");
        debug!("Closed {}", closed.iter().join(", "));
        // Announced before any release callback can close more objects inline.
        self.send(ManagerEvent::ObjectsClosed(closed.clone()));
        for object in &closed {
            guarded_release(|| object.release_data(), object);
        }
    }
}

/// Runs one release callback; a panicking callback doesn't stop the others.
fn guarded_release(release: impl FnOnce(), owner: &dyn fmt::Display) {
    if panic::catch_unwind(AssertUnwindSafe(release)).is_err() {
        error!(owner = %owner, "Release callback panicked");
    }
}

fn parents(
    runtime: &Arc<Runtime>,
    others: impl IntoIterator<Item = DbgObject>,
) -> impl Iterator<Item = DbgObject> {
    std::iter::once(DbgObject::from(runtime.clone())).chain(others)
}

/// Hands `data` back if every parent is open; releases it otherwise.
fn ensure_open(parents: impl IntoIterator<Item = DbgObject>, data: AuxData) -> Result<AuxData> {
    match parents.into_iter().find(DbgObject::is_closed) {
        None => Ok(data),
        Some(parent) => {
            data.release();
            Err(ManagerError::ParentClosed { kind: parent.kind(), id: parent.id() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ObjectFactory;
    use dbgobj_common::{
        logging::ensure_test_logging,
        types::{BreakpointSettings, CodeLocation, ModuleId},
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager() -> Manager {
        ensure_test_logging(None);
        Manager::new(&ManagerConfig::default()).unwrap()
    }

    fn counter_data(counter: &Arc<AtomicUsize>) -> AuxData {
        let counter = counter.clone();
        AuxData::on_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn module_info(name: &str) -> ModuleInfo {
        ModuleInfo { name: name.to_string(), filename: format!("{name}.dll"), ..Default::default() }
    }

    #[test]
    fn test_create_factory_registers_runtime() {
        let manager = manager();
        let factory =
            manager.create_factory(RuntimeInfo { process_id: 42, name: "test".into() }).unwrap();
        let runtimes = manager.runtimes();
        assert_eq!(runtimes.len(), 1);
        assert!(Arc::ptr_eq(&runtimes[0], factory.runtime()));
    }

    #[test]
    fn test_add_and_close_breakpoint() {
        let manager = manager();
        let location = CodeLocation::new(ModuleId::new("m", "m.dll"), 1, 0);
        let released = Arc::new(AtomicUsize::new(0));

        let mut info = CodeBreakpointInfo::new(location, BreakpointSettings::enabled());
        info.data = counter_data(&released);
        let added = manager.add(vec![info]).unwrap();
        assert_eq!(manager.breakpoints().len(), 1);

        manager.close(vec![added[0].clone().into()]).unwrap();
        manager.close(vec![added[0].clone().into()]).unwrap();
        manager.flush().unwrap();

        assert!(manager.breakpoints().is_empty());
        assert!(added[0].is_closed());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closing_runtime_cascades() {
        let manager = manager();
        let factory =
            manager.create_factory(RuntimeInfo { process_id: 1, name: "test".into() }).unwrap();
        let released = Arc::new(AtomicUsize::new(0));

        let app_domain = factory
            .create_app_domain_with(
                AppDomainInfo { name: "domain".into(), id: 1 },
                false,
                counter_data(&released),
            )
            .unwrap();
        let module = factory
            .create_module_with(
                Some(app_domain.clone()),
                module_info("m"),
                false,
                counter_data(&released),
            )
            .unwrap();

        let location = CodeLocation::new(module.module_id().clone(), 1, 0);
        manager
            .add(vec![CodeBreakpointInfo::new(location.clone(), BreakpointSettings::enabled())])
            .unwrap();
        let bound = factory.create_bound_breakpoint(BoundBreakpointInfo::new(location)).unwrap();
        assert!(bound.is_some());

        let mut events = manager.subscribe();
        manager.close(vec![factory.runtime().clone().into()]).unwrap();
        manager.flush().unwrap();

        assert!(manager.runtimes().is_empty());
        assert!(manager.app_domains().is_empty());
        assert!(manager.modules().is_empty());
        assert!(manager.bound_breakpoints().is_empty());
        assert_eq!(manager.breakpoints().len(), 1);
        assert_eq!(released.load(Ordering::SeqCst), 2);

        match events.try_recv().unwrap() {
            ManagerEvent::ObjectsClosed(objects) => assert_eq!(objects.len(), 4),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_create_under_closed_parent_releases_data() {
        let manager = manager();
        let factory =
            manager.create_factory(RuntimeInfo { process_id: 1, name: "test".into() }).unwrap();
        let app_domain =
            factory.create_app_domain(AppDomainInfo { name: "d".into(), id: 1 }, false).unwrap();
        manager.close(vec![app_domain.clone().into()]).unwrap();

        let released = Arc::new(AtomicUsize::new(0));
        let result =
            factory.create_module_with(
                Some(app_domain),
                module_info("m"),
                false,
                counter_data(&released),
            );

        assert!(matches!(result, Err(ManagerError::ParentClosed { kind: "app domain", .. })));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pause_requests_are_ored() {
        let manager = manager();
        let factory =
            manager.create_factory(RuntimeInfo { process_id: 1, name: "test".into() }).unwrap();
        factory.create_module(None, module_info("a"), false).unwrap();
        factory.create_module(None, module_info("b"), true).unwrap();
        factory.create_module(None, module_info("c"), false).unwrap();

        assert!(factory.runtime().take_pause_request());
        assert!(!factory.runtime().take_pause_request());
    }

    #[test]
    fn test_release_callback_may_reenter_manager() {
        let manager = manager();
        let observed = Arc::new(AtomicUsize::new(usize::MAX));
        let location = CodeLocation::new(ModuleId::new("m", "m.dll"), 1, 0);

        let mut info = CodeBreakpointInfo::new(location, BreakpointSettings::enabled());
        let (m, o) = (manager.clone(), observed.clone());
        info.data = AuxData::on_release(move || o.store(m.breakpoints().len(), Ordering::SeqCst));
        let added = manager.add(vec![info]).unwrap();

        manager.close(vec![added[0].clone().into()]).unwrap();
        manager.flush().unwrap();
        assert_eq!(observed.load(Ordering::SeqCst), 0);
    }
}
