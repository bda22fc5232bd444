//! Application state: the lab list, the running-lab claim reconciled against the engine, cached
//! progress views and the flag submission workflow. Toolkit-agnostic; observers subscribe to
//! [`AppEvent`]s.

use crate::config::WebverseConfig;
use crate::docker::{ContainerEngine, DockerStatus, ProcessResult};
use crate::error::{StateError, StoreError};
use crate::events::{AppEvent, EventBus};
use crate::flags::flag_matches;
use crate::lab::Lab;
use crate::progress::{ProgressMap, ProgressStore, Summary};
use crate::ranks::Dashboard;
use crate::registry::{discover_labs, filter_labs};
use crate::runtime::RuntimeStore;
use crate::worker::{run_job, DockerAction, DockerJob, JobReport};
use chrono::NaiveDate;
use crossbeam_channel::Receiver;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    Solved,
    /// Wrong flag; no hint is given.
    Rejected,
    Empty,
    LabNotFound,
    Misconfigured,
}

impl SubmitOutcome {
    pub fn is_solved(&self) -> bool {
        matches!(self, SubmitOutcome::Solved)
    }

    pub fn message(&self) -> &'static str {
        match self {
            SubmitOutcome::Solved | SubmitOutcome::Rejected => "",
            SubmitOutcome::Empty => "Empty flag.",
            SubmitOutcome::LabNotFound => "Lab not found.",
            SubmitOutcome::Misconfigured => "This lab has no flag_sha256 configured.",
        }
    }
}

/// What a reconciliation pass concluded about the running-lab claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reconciliation {
    NothingClaimed,
    Verified,
    /// Engine or compose unreachable; the claim was left exactly as it was.
    Unverifiable,
    ClearedStale,
    ClearedUnknownLab,
}

pub struct AppState {
    config: WebverseConfig,
    engine: Arc<dyn ContainerEngine>,
    runtime: RuntimeStore,
    progress: ProgressStore,
    events: EventBus,

    labs: Vec<Lab>,
    filter: String,
    selected: Option<String>,
    running_lab_id: Option<String>,
    docker_status: DockerStatus,

    progress_cache: Option<ProgressMap>,
    progress_dirty: bool,
    summary_cache: Option<Summary>,
    summary_dirty: bool,
    notes_cache: HashMap<String, String>,

    next_job_id: u64,
}

impl AppState {
    /// Opens the stores named by `config` and runs the startup sequence.
    pub fn open(config: WebverseConfig, engine: Arc<dyn ContainerEngine>) -> Result<Self, StateError> {
        let runtime = RuntimeStore::open(config.runtime_path());
        let progress = ProgressStore::open(&config.progress_db_path())?;
        let mut state = Self::with_parts(config, engine, runtime, progress);
        state.startup();
        Ok(state)
    }

    /// Assembles a state without touching disk or the engine; call [`AppState::startup`] next.
    pub fn with_parts(
        config: WebverseConfig,
        engine: Arc<dyn ContainerEngine>,
        runtime: RuntimeStore,
        progress: ProgressStore,
    ) -> Self {
        Self {
            config,
            engine,
            runtime,
            progress,
            events: EventBus::default(),
            labs: Vec::new(),
            filter: String::new(),
            selected: None,
            running_lab_id: None,
            docker_status: DockerStatus::unknown(),
            progress_cache: None,
            progress_dirty: true,
            summary_cache: None,
            summary_dirty: true,
            notes_cache: HashMap::new(),
            next_job_id: 0,
        }
    }

    /// Registry, then persisted claim, then engine probe, then claim verification.
    pub fn startup(&mut self) -> Reconciliation {
        self.refresh_labs();
        self.running_lab_id = self.runtime.get();
        self.refresh_docker();
        let status = self.docker_status.clone();
        self.verify_running_claim(&status)
    }

    pub fn subscribe(&mut self) -> Receiver<AppEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &WebverseConfig {
        &self.config
    }

    pub fn engine(&self) -> Arc<dyn ContainerEngine> {
        Arc::clone(&self.engine)
    }

    pub fn log(&mut self, line: impl Into<String>) {
        self.events.emit(AppEvent::Log(line.into()));
    }

    // ---- labs ----

    pub fn refresh_labs(&mut self) {
        self.labs = discover_labs(&self.config.labs_dir);
        info!(count = self.labs.len(), dir = %self.config.labs_dir.display(), "labs loaded");
        if let Some(sel) = self.selected.clone() {
            if self.lab(&sel).is_none() {
                self.selected = None;
                self.events.emit(AppEvent::SelectedChanged(None));
            }
        }
        self.events.emit(AppEvent::LabsChanged);
    }

    pub fn labs(&self) -> &[Lab] {
        &self.labs
    }

    pub fn lab(&self, lab_id: &str) -> Option<&Lab> {
        self.labs.iter().find(|lab| lab.id == lab_id)
    }

    pub fn filtered_labs(&self) -> Vec<&Lab> {
        filter_labs(&self.labs, &self.filter)
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn set_filter(&mut self, query: &str) {
        if query == self.filter {
            return;
        }
        self.filter = query.to_string();
        self.events.emit(AppEvent::FilterChanged(self.filter.clone()));
        self.events.emit(AppEvent::LabsChanged);
    }

    /// Selects a lab by id; unknown ids clear the selection.
    pub fn set_selected(&mut self, lab_id: Option<&str>) {
        let next = lab_id
            .filter(|id| self.lab(id).is_some())
            .map(str::to_string);
        if next == self.selected {
            return;
        }
        self.selected = next;
        self.events.emit(AppEvent::SelectedChanged(self.selected.clone()));
    }

    pub fn selected(&self) -> Option<&Lab> {
        self.selected.as_deref().and_then(|id| self.lab(id))
    }

    // ---- running lab ----

    pub fn running_lab_id(&self) -> Option<&str> {
        self.running_lab_id.as_deref()
    }

    pub fn running(&self) -> Option<&Lab> {
        self.running_lab_id.as_deref().and_then(|id| self.lab(id))
    }

    /// Persists the claim first, then updates memory. Claiming a lab also marks it started.
    pub fn set_running_lab_id(&mut self, lab_id: Option<&str>) -> Result<(), StateError> {
        if lab_id == self.running_lab_id.as_deref() {
            return Ok(());
        }
        self.runtime.set(lab_id)?;
        self.running_lab_id = lab_id.map(str::to_string);
        if let Some(id) = lab_id {
            if let Err(err) = self.mark_started(id) {
                warn!(lab = %id, error = %err, "failed to mark running lab as started");
            }
        }
        self.events
            .emit(AppEvent::RunningChanged(self.running_lab_id.clone()));
        Ok(())
    }

    fn clear_running_claim(&mut self) {
        self.running_lab_id = None;
        if let Err(err) = self.runtime.set(None) {
            warn!(error = %err, "failed to persist cleared running lab");
        }
        self.events.emit(AppEvent::RunningChanged(None));
    }

    // ---- docker status and reconciliation ----

    pub fn docker_status(&self) -> &DockerStatus {
        &self.docker_status
    }

    pub fn refresh_docker(&mut self) -> &DockerStatus {
        let status = DockerStatus::probe_guarded(self.engine.as_ref());
        self.apply_docker_status(status);
        &self.docker_status
    }

    /// Applies a status produced elsewhere (e.g. by the poller). Emits only on change.
    pub fn apply_docker_status(&mut self, status: DockerStatus) {
        if status == self.docker_status {
            return;
        }
        self.docker_status = status;
        self.events
            .emit(AppEvent::DockerChanged(self.docker_status.clone()));
    }

    /// Re-probes the engine and aligns the running claim with what it reports.
    pub fn reconcile(&mut self) -> Reconciliation {
        self.refresh_docker();
        let status = self.docker_status.clone();
        self.verify_running_claim(&status)
    }

    fn verify_running_claim(&mut self, status: &DockerStatus) -> Reconciliation {
        let Some(lab_id) = self.running_lab_id.clone() else {
            return Reconciliation::NothingClaimed;
        };
        if !status.usable() {
            info!(lab = %lab_id, "docker unavailable; leaving running lab claim untouched");
            return Reconciliation::Unverifiable;
        }
        let Some(project) = self.lab(&lab_id).map(Lab::compose_project) else {
            info!(lab = %lab_id, "claimed lab no longer exists; clearing claim");
            self.clear_running_claim();
            return Reconciliation::ClearedUnknownLab;
        };
        let engine = self.engine.as_ref();
        let probe = panic::catch_unwind(AssertUnwindSafe(|| engine.has_running_containers(&project)));
        match probe {
            Ok(probe) if probe.ok => Reconciliation::Verified,
            Ok(probe) => {
                info!(lab = %lab_id, detail = %probe.detail, "claimed lab has no running containers; clearing claim");
                self.clear_running_claim();
                Reconciliation::ClearedStale
            }
            Err(_) => {
                warn!(lab = %lab_id, "container status probe panicked; leaving claim untouched");
                Reconciliation::Unverifiable
            }
        }
    }

    // ---- progress ----

    fn write_progress<F>(&mut self, write: F) -> Result<(), StateError>
    where
        F: FnOnce(&ProgressStore) -> Result<(), StoreError>,
    {
        let result = write(&self.progress);
        self.progress_dirty = true;
        self.summary_dirty = true;
        result?;
        self.events.emit(AppEvent::ProgressChanged);
        Ok(())
    }

    pub fn mark_started(&mut self, lab_id: &str) -> Result<(), StateError> {
        self.write_progress(|store| store.mark_started(lab_id))
    }

    pub fn mark_attempt(&mut self, lab_id: &str) -> Result<(), StateError> {
        self.write_progress(|store| store.mark_attempt(lab_id))
    }

    pub fn mark_solved(&mut self, lab_id: &str) -> Result<(), StateError> {
        self.write_progress(|store| store.mark_solved(lab_id))
    }

    pub fn progress_map(&mut self) -> Result<&ProgressMap, StateError> {
        let map = match self.progress_cache.take() {
            Some(map) if !self.progress_dirty => map,
            _ => self.progress.get_progress_map()?,
        };
        self.progress_dirty = false;
        Ok(&*self.progress_cache.insert(map))
    }

    pub fn summary(&mut self) -> Result<Summary, StateError> {
        let summary = match self.summary_cache {
            Some(summary) if !self.summary_dirty => summary,
            _ => self.progress.get_summary()?,
        };
        self.summary_cache = Some(summary);
        self.summary_dirty = false;
        Ok(summary)
    }

    pub fn total_attempts(&mut self) -> Result<u64, StateError> {
        Ok(self.summary()?.attempts)
    }

    pub fn is_solved(&mut self, lab_id: &str) -> Result<bool, StateError> {
        Ok(self
            .progress_map()?
            .get(lab_id)
            .map_or(false, |p| p.is_solved()))
    }

    pub fn get_notes(&mut self, lab_id: &str) -> Result<String, StateError> {
        if let Some(notes) = self.notes_cache.get(lab_id) {
            return Ok(notes.clone());
        }
        let notes = self.progress.get_notes(lab_id)?;
        self.notes_cache.insert(lab_id.to_string(), notes.clone());
        Ok(notes)
    }

    pub fn set_notes(&mut self, lab_id: &str, notes: &str) -> Result<(), StateError> {
        self.notes_cache.remove(lab_id);
        self.write_progress(|store| store.set_notes(lab_id, notes))?;
        self.notes_cache
            .insert(lab_id.to_string(), notes.to_string());
        Ok(())
    }

    pub fn dashboard(&mut self, today: NaiveDate) -> Result<Dashboard, StateError> {
        let attempts = self.total_attempts()?;
        let progress = self.progress_map()?.clone();
        Ok(Dashboard::build(&self.labs, &progress, attempts, today))
    }

    // ---- flag submission ----

    /// Every non-trivial path records an attempt first; nothing is rolled back afterwards.
    pub fn submit_flag(&mut self, lab_id: &str, flag: &str) -> Result<SubmitOutcome, StateError> {
        let submitted = flag.trim();
        if submitted.is_empty() {
            self.mark_attempt(lab_id)?;
            return Ok(SubmitOutcome::Empty);
        }

        self.mark_started(lab_id)?;
        self.mark_attempt(lab_id)?;

        let Some(lab) = self.lab(lab_id) else {
            return Ok(SubmitOutcome::LabNotFound);
        };
        if !lab.has_flag() {
            return Ok(SubmitOutcome::Misconfigured);
        }
        if !flag_matches(submitted, &lab.flag_sha256) {
            return Ok(SubmitOutcome::Rejected);
        }

        self.mark_solved(lab_id)?;
        info!(lab = %lab_id, "flag accepted");
        self.events.emit(AppEvent::LabsChanged);
        self.events
            .emit(AppEvent::LabStateChanged(lab_id.to_string()));
        if self.selected.as_deref() == Some(lab_id) {
            self.events
                .emit(AppEvent::SelectedChanged(self.selected.clone()));
        }
        Ok(SubmitOutcome::Solved)
    }

    // ---- lab lifecycle ----

    /// Resolves a lab into a docker job. Bringing a lab up while another one is claimed is refused.
    pub fn plan_job(&mut self, lab_id: &str, action: DockerAction) -> Result<DockerJob, StateError> {
        let project = self
            .lab(lab_id)
            .map(Lab::compose_project)
            .ok_or_else(|| StateError::LabNotFound(lab_id.to_string()))?;
        if matches!(action, DockerAction::Up | DockerAction::Reset) {
            if let Some(running) = self.running_lab_id.as_deref() {
                if running != lab_id {
                    return Err(StateError::AnotherLabRunning {
                        running: running.to_string(),
                        requested: lab_id.to_string(),
                    });
                }
            }
        }
        self.next_job_id += 1;
        Ok(DockerJob {
            id: self.next_job_id,
            lab_id: lab_id.to_string(),
            project,
            action,
        })
    }

    /// Folds a finished job back into state: a successful up/reset claims the lab, a successful
    /// down of the claimed lab releases it.
    pub fn apply_job_report(&mut self, report: &JobReport) -> Result<(), StateError> {
        let job = &report.job;
        let result = &report.result;
        self.log(format!(
            "[{}] compose {} -> exit {}",
            job.lab_id,
            job.action.as_str(),
            result.exit_code
        ));
        if !result.success() {
            warn!(lab = %job.lab_id, action = job.action.as_str(), detail = %result.detail(), "docker job failed");
            return Ok(());
        }
        match job.action {
            DockerAction::Up | DockerAction::Reset => self.set_running_lab_id(Some(&job.lab_id)),
            DockerAction::Down if self.running_lab_id.as_deref() == Some(job.lab_id.as_str()) => {
                self.set_running_lab_id(None)
            }
            _ => Ok(()),
        }
    }

    /// Plans, runs and applies a job on the calling thread.
    pub fn run_lab_action(&mut self, lab_id: &str, action: DockerAction) -> Result<ProcessResult, StateError> {
        let job = self.plan_job(lab_id, action)?;
        let result = run_job(self.engine.as_ref(), &job);
        let report = JobReport { job, result };
        self.apply_job_report(&report)?;
        Ok(report.result)
    }

    pub fn start_lab(&mut self, lab_id: &str) -> Result<ProcessResult, StateError> {
        self.run_lab_action(lab_id, DockerAction::Up)
    }

    pub fn stop_lab(&mut self, lab_id: &str) -> Result<ProcessResult, StateError> {
        self.run_lab_action(lab_id, DockerAction::Down)
    }

    pub fn restart_lab(&mut self, lab_id: &str) -> Result<ProcessResult, StateError> {
        self.run_lab_action(lab_id, DockerAction::Restart)
    }

    pub fn reset_lab(&mut self, lab_id: &str) -> Result<ProcessResult, StateError> {
        self.run_lab_action(lab_id, DockerAction::Reset)
    }

    pub fn lab_logs(&mut self, lab_id: &str, tail: u32) -> Result<ProcessResult, StateError> {
        self.run_lab_action(lab_id, DockerAction::Logs { tail })
    }

    pub fn lab_ps(&mut self, lab_id: &str) -> Result<ProcessResult, StateError> {
        self.run_lab_action(lab_id, DockerAction::Ps)
    }

    /// Stops whichever lab is claimed. A claim on a lab that has vanished is simply dropped.
    pub fn stop_running_lab(&mut self) -> Result<Option<ProcessResult>, StateError> {
        let Some(lab_id) = self.running_lab_id.clone() else {
            return Ok(None);
        };
        if self.lab(&lab_id).is_none() {
            self.set_running_lab_id(None)?;
            return Ok(None);
        }
        self.stop_lab(&lab_id).map(Some)
    }
}
