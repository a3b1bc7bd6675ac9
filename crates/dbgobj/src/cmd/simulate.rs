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

//! Simulate command - replays a scenario against a fresh object manager

use std::{collections::HashMap, path::Path, sync::Arc};

use dbgobj_common::{types::CodeLocation, AuxData, Config};
use dbgobj_core::{
    AppDomain, BoundBreakpointInfo, BreakpointServices, DbgObject, Manager, ManagerObjectFactory,
    MethodBreakpointsService, Module, ObjectFactory, PlainLocationFactory, Thread,
};
use eyre::{bail, eyre, Context, Result};
use parking_lot::Mutex;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{info, warn};

use crate::{
    report::Report,
    scenario::{BindRequest, Scenario, Step},
};

/// Replays the scenario at `path` and prints the resulting report.
pub fn simulate(path: &Path, config: &Config, json: bool) -> Result<()> {
    let scenario = Scenario::load(path)?;
    let report = run(scenario, config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}

/// Replays `scenario` and returns what it left behind.
pub fn run(scenario: Scenario, config: &Config) -> Result<Report> {
    let manager = Manager::new(&config.manager)?;
    let mut events = manager.subscribe();
    let factory = manager.create_factory(scenario.runtime.clone())?;
    let service = MethodBreakpointsService::new(
        manager.clone(),
        BreakpointServices::ready(scenario.metadata, PlainLocationFactory, scenario.prompt),
        config.breakpoints.clone(),
    );

    let mut session = Session::new(factory, service);
    let mut report = Report {
        runtime: format!("{} (pid {})", scenario.runtime.name, scenario.runtime.process_id),
        ..Default::default()
    };

    info!(steps = scenario.steps.len(), "Replaying scenario");
    for (index, step) in scenario.steps.into_iter().enumerate() {
        let line = session.apply(step).with_context(|| format!("Step {} failed", index + 1))?;
        report.steps.push(line);
    }
    manager.flush()?;

    loop {
        match events.try_recv() {
            Ok(event) => report.record(&event),
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "Event buffer overflowed, increase manager.event_capacity");
            }
            Err(_) => break,
        }
    }

    report.pause_requested = session.factory.runtime().take_pause_request();
    report.capture(&manager);
    report.released = session.released.lock().clone();
    Ok(report)
}

struct Session {
    factory: ManagerObjectFactory,
    service: MethodBreakpointsService,
    objects: HashMap<String, DbgObject>,
    released: Arc<Mutex<Vec<String>>>,
}

impl Session {
    fn new(factory: ManagerObjectFactory, service: MethodBreakpointsService) -> Self {
        let objects: HashMap<String, DbgObject> =
            HashMap::from([("runtime".to_string(), factory.runtime().clone().into())]);
        Self { factory, service, objects, released: Arc::default() }
    }

    fn manager(&self) -> &Manager {
        self.factory.manager()
    }

    /// Data recording `tag` in the release log when it is released.
    fn tracked(&self, tag: String) -> AuxData {
        let released = self.released.clone();
        AuxData::on_release(move || released.lock().push(tag))
    }

    fn remember(&mut self, label: Option<String>, object: DbgObject) {
        if let Some(label) = label {
            self.objects.insert(label, object);
        }
    }

    fn lookup(&self, label: &str) -> Result<&DbgObject> {
        self.objects.get(label).ok_or_else(|| eyre!("Unknown object label: {label}"))
    }

    fn app_domain(&self, label: Option<&str>) -> Result<Option<Arc<AppDomain>>> {
        label
            .map(|label| match self.lookup(label)? {
                DbgObject::AppDomain(app_domain) => Ok(app_domain.clone()),
                other => bail!("{label} is a {}, expected an app domain", other.kind()),
            })
            .transpose()
    }

    fn module(&self, label: Option<&str>) -> Result<Option<Arc<Module>>> {
        label
            .map(|label| match self.lookup(label)? {
                DbgObject::Module(module) => Ok(module.clone()),
                other => bail!("{label} is a {}, expected a module", other.kind()),
            })
            .transpose()
    }

    fn thread(&self, label: Option<&str>) -> Result<Option<Arc<Thread>>> {
        label
            .map(|label| match self.lookup(label)? {
                DbgObject::Thread(thread) => Ok(thread.clone()),
                other => bail!("{label} is a {}, expected a thread", other.kind()),
            })
            .transpose()
    }

    fn apply(&mut self, step: Step) -> Result<String> {
        match step {
            Step::AppDomain { label, info, pause } => {
                let tag = label.clone().unwrap_or_else(|| info.name.clone());
                let data = self.tracked(format!("app domain {tag}"));
                let app_domain = self.factory.create_app_domain_with(info, pause, data)?;
                let line = format!("app domain {tag} -> {}", app_domain.id());
                self.remember(label, app_domain.into());
                Ok(line)
            }
            Step::Module { label, app_domain, info, pause } => {
                let app_domain = self.app_domain(app_domain.as_deref())?;
                let tag = label.clone().unwrap_or_else(|| info.name.clone());
                let data = self.tracked(format!("module {tag}"));
                let module = self.factory.create_module_with(app_domain, info, pause, data)?;
                let line = format!("module {tag} -> {} as {}", module.id(), module.module_id());
                self.remember(label, module.into());
                Ok(line)
            }
            Step::Thread { label, app_domain, info, pause } => {
                let app_domain = self.app_domain(app_domain.as_deref())?;
                let tag = label.clone().unwrap_or_else(|| info.id.to_string());
                let data = self.tracked(format!("thread {tag}"));
                let thread = self.factory.create_thread_with(app_domain, info, pause, data)?;
                let line = format!("thread {tag} -> {}", thread.id());
                self.remember(label, thread.into());
                Ok(line)
            }
            Step::Exception { label, thread, module, info, pause } => {
                let thread = self.thread(thread.as_deref())?;
                let module = self.module(module.as_deref())?;
                let tag = label.clone().unwrap_or_else(|| info.id.to_string());
                let data = self.tracked(format!("exception {tag}"));
                let exception =
                    self.factory.create_exception_with(info, thread, module, pause, data)?;
                let line = format!("exception {tag} -> {}", exception.id());
                self.remember(label, exception.into());
                Ok(line)
            }
            Step::Breakpoints { kind, selection } => {
                let outcome = self.service.add_references(&selection, kind)?;
                if outcome.cancelled {
                    return Ok(format!("{kind}s: cancelled"));
                }
                Ok(format!(
                    "{kind}s: added {}, duplicates {}, skipped {}",
                    outcome.added.len(),
                    outcome.duplicates,
                    outcome.skipped
                ))
            }
            Step::Bind { requests } => {
                let requested = requests.len();
                // Every request is validated before any of them gets tracked data.
                let infos =
                    requests.into_iter().map(|r| self.bind_info(r)).collect::<Result<Vec<_>>>()?;
                let infos = infos
                    .into_iter()
                    .map(|info| {
                        let tag = format!("bound {}", info.location);
                        info.with_data(self.tracked(tag))
                    })
                    .collect();
                let results = self.factory.create_bound_breakpoints(infos)?;
                let bound = results.iter().flatten().count();
                Ok(format!("bind: requested {requested}, bound {bound}"))
            }
            Step::Close { labels, breakpoints } => {
                let mut objects = labels
                    .iter()
                    .map(|label| self.lookup(label).cloned())
                    .collect::<Result<Vec<_>>>()?;
                let live = self.manager().breakpoints();
                for text in &breakpoints {
                    let location: CodeLocation = text.parse()?;
                    let Some(bp) = live.iter().find(|bp| bp.location() == &location) else {
                        bail!("No breakpoint at {location}");
                    };
                    objects.push(bp.clone().into());
                }
                let count = objects.len();
                self.manager().close(objects)?;
                Ok(format!("close: {count} object(s)"))
            }
        }
    }

    fn bind_info(&self, request: BindRequest) -> Result<BoundBreakpointInfo> {
        let location: CodeLocation = request
            .location
            .parse()
            .with_context(|| format!("Invalid bind location {:?}", request.location))?;

        let mut info = BoundBreakpointInfo::new(location);
        if let Some(module) = self.module(request.module.as_deref())? {
            info = info.with_module(module);
        }
        if let Some(address) = request.address {
            info = info.with_address(address);
        }
        if let Some(message) = request.message {
            info = info.with_message(message);
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{PromptAnswer, ScenarioMetadata};
    use dbgobj_common::{types::RuntimeInfo, BreakpointDefaults, ManagerConfig};

    fn session() -> Session {
        dbgobj_common::logging::ensure_test_logging(None);
        let manager = Manager::new(&ManagerConfig::default()).unwrap();
        let runtime = RuntimeInfo { process_id: 1, name: "CoreCLR".to_string() };
        let factory = manager.create_factory(runtime).unwrap();
        let services = BreakpointServices::ready(
            ScenarioMetadata::default(),
            PlainLocationFactory,
            PromptAnswer::default(),
        );
        let service =
            MethodBreakpointsService::new(manager, services, BreakpointDefaults::default());
        Session::new(factory, service)
    }

    fn request(location: &str, module: Option<&str>) -> BindRequest {
        BindRequest {
            location: location.to_string(),
            module: module.map(str::to_string),
            address: None,
            message: None,
        }
    }

    #[test]
    fn test_invalid_bind_step_tracks_nothing() {
        let mut session = session();

        let step = Step::Bind {
            requests: vec![
                request("app!app.dll:0x06000001+0", None),
                request("app!app.dll:0x06000002+0", Some("ghost")),
            ],
        };
        let err = session.apply(step).unwrap_err();
        assert!(err.to_string().contains("Unknown object label: ghost"));
        assert!(session.manager().bound_breakpoints().is_empty());
        assert!(session.released.lock().is_empty());

        // Unmatched requests of a valid step hand their data back.
        let step = Step::Bind { requests: vec![request("app!app.dll:0x06000001+0", None)] };
        assert_eq!(session.apply(step).unwrap(), "bind: requested 1, bound 0");
        assert_eq!(*session.released.lock(), ["bound app!app.dll:0x06000001+0"]);
    }
}
