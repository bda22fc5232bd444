//! In-memory container engine for unit tests.

use crate::docker::{ContainerEngine, Probe, ProcessResult};
use crate::lab::ComposeProject;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct FakeState {
    engine_ok: bool,
    compose_ok: bool,
    panic_on_probe: bool,
    running: BTreeSet<PathBuf>,
    exits: HashMap<String, i32>,
    calls: Vec<String>,
    probes: usize,
}

#[derive(Debug, Default)]
pub(crate) struct FakeEngine {
    state: Mutex<FakeState>,
}

impl FakeEngine {
    pub(crate) fn healthy() -> Self {
        let engine = Self::default();
        {
            let mut s = engine.lock();
            s.engine_ok = true;
            s.compose_ok = true;
        }
        engine
    }

    pub(crate) fn without_compose() -> Self {
        let engine = Self::healthy();
        engine.lock().compose_ok = false;
        engine
    }

    pub(crate) fn unreachable() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_exit(&self, action: &str, code: i32) {
        self.lock().exits.insert(action.to_string(), code);
    }

    pub(crate) fn set_running(&self, dir: impl Into<PathBuf>, running: bool) {
        let dir = dir.into();
        let mut s = self.lock();
        if running {
            s.running.insert(dir);
        } else {
            s.running.remove(&dir);
        }
    }

    pub(crate) fn panic_on_probe(&self) {
        self.lock().panic_on_probe = true;
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub(crate) fn probe_count(&self) -> usize {
        self.lock().probes
    }

    fn lifecycle(&self, action: &str, project: &ComposeProject) -> ProcessResult {
        let mut s = self.lock();
        s.calls.push(action.to_string());
        let code = s.exits.get(action).copied().unwrap_or(0);
        if code == 0 {
            match action {
                "up" => {
                    s.running.insert(project.dir.clone());
                }
                "down" => {
                    s.running.remove(&project.dir);
                }
                _ => {}
            }
        }
        ProcessResult::completed(code, format!("{} out\n", action), format!("{} err\n", action))
    }
}

impl ContainerEngine for FakeEngine {
    fn engine_available(&self) -> Probe {
        let (ok, panic) = {
            let mut s = self.lock();
            s.probes += 1;
            (s.engine_ok, s.panic_on_probe)
        };
        if panic {
            panic!("fake engine probe exploded");
        }
        if ok {
            Probe::ok("27.0.1")
        } else {
            Probe::fail("Cannot connect to the Docker daemon")
        }
    }

    fn compose_plugin_available(&self) -> Probe {
        if self.lock().compose_ok {
            Probe::ok("2.29.1")
        } else {
            Probe::fail("docker: 'compose' is not a docker command.")
        }
    }

    fn has_running_containers(&self, project: &ComposeProject) -> Probe {
        let mut s = self.lock();
        s.calls.push("status".to_string());
        if s.running.contains(&project.dir) {
            Probe::ok("c0ffee")
        } else {
            Probe::fail("")
        }
    }

    fn up(&self, project: &ComposeProject) -> ProcessResult {
        self.lifecycle("up", project)
    }

    fn down(&self, project: &ComposeProject) -> ProcessResult {
        self.lifecycle("down", project)
    }

    fn restart(&self, project: &ComposeProject) -> ProcessResult {
        self.lifecycle("restart", project)
    }

    fn logs(&self, project: &ComposeProject, tail: u32) -> ProcessResult {
        self.lifecycle(&format!("logs:{}", tail), project)
    }

    fn ps(&self, project: &ComposeProject) -> ProcessResult {
        self.lifecycle("ps", project)
    }
}
