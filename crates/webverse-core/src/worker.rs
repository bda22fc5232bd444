//! Off-thread execution of docker calls and the periodic availability poll.
//!
//! Both publish results on channels; the thread that owns [`crate::state::AppState`] applies
//! them, so state is only ever mutated from one place.

use crate::docker::{ContainerEngine, DockerStatus, ProcessResult};
use crate::lab::ComposeProject;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DockerAction {
    Up,
    Down,
    Restart,
    Reset,
    Logs { tail: u32 },
    Ps,
}

impl DockerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DockerAction::Up => "up",
            DockerAction::Down => "down",
            DockerAction::Restart => "restart",
            DockerAction::Reset => "reset",
            DockerAction::Logs { .. } => "logs",
            DockerAction::Ps => "ps",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DockerJob {
    pub id: u64,
    pub lab_id: String,
    pub project: ComposeProject,
    pub action: DockerAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub job: DockerJob,
    pub result: ProcessResult,
}

/// Runs one job to completion on the calling thread.
pub fn run_job(engine: &dyn ContainerEngine, job: &DockerJob) -> ProcessResult {
    let project = &job.project;
    match job.action {
        DockerAction::Up => engine.up(project),
        DockerAction::Down => engine.down(project),
        DockerAction::Restart => engine.restart(project),
        DockerAction::Reset => engine.reset(project),
        DockerAction::Logs { tail } => engine.logs(project, tail),
        DockerAction::Ps => engine.ps(project),
    }
}

/// A dedicated thread that executes docker jobs in submission order.
pub struct DockerWorker {
    jobs: Option<Sender<DockerJob>>,
    reports: Receiver<JobReport>,
    handle: Option<JoinHandle<()>>,
}

impl DockerWorker {
    pub fn spawn(engine: Arc<dyn ContainerEngine>) -> Self {
        let (job_tx, job_rx) = unbounded::<DockerJob>();
        let (report_tx, report_rx) = unbounded::<JobReport>();
        let handle = thread::Builder::new()
            .name("webverse-docker".into())
            .spawn(move || {
                for job in job_rx {
                    debug!(job = job.id, lab = %job.lab_id, action = job.action.as_str(), "docker job started");
                    let result = run_job(engine.as_ref(), &job);
                    info!(
                        job = job.id,
                        lab = %job.lab_id,
                        action = job.action.as_str(),
                        exit_code = result.exit_code,
                        "docker job finished"
                    );
                    if report_tx.send(JobReport { job, result }).is_err() {
                        break;
                    }
                }
            })
            .ok();
        Self {
            jobs: Some(job_tx),
            reports: report_rx,
            handle,
        }
    }

    /// Queues a job. Returns false if the worker thread is gone.
    pub fn submit(&self, job: DockerJob) -> bool {
        match (&self.jobs, &self.handle) {
            (Some(tx), Some(_)) => tx.send(job).is_ok(),
            _ => false,
        }
    }

    pub fn reports(&self) -> &Receiver<JobReport> {
        &self.reports
    }

    /// Closes the queue, lets queued jobs finish and joins the thread.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DockerWorker {
    fn drop(&mut self) {
        self.close();
    }
}

/// Periodically probes engine and compose availability until stopped.
pub struct StatusPoller {
    stop: Option<Sender<()>>,
    updates: Receiver<DockerStatus>,
    handle: Option<JoinHandle<()>>,
}

impl StatusPoller {
    /// Probes immediately, then once per `interval`.
    pub fn start(engine: Arc<dyn ContainerEngine>, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (update_tx, update_rx) = unbounded::<DockerStatus>();
        let handle = thread::Builder::new()
            .name("webverse-poll".into())
            .spawn(move || loop {
                let status = DockerStatus::probe_guarded(engine.as_ref());
                if update_tx.send(status).is_err() {
                    break;
                }
                select! {
                    recv(stop_rx) -> _ => break,
                    default(interval) => {}
                }
            })
            .ok();
        Self {
            stop: Some(stop_tx),
            updates: update_rx,
            handle,
        }
    }

    pub fn updates(&self) -> &Receiver<DockerStatus> {
        &self.updates
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        // Dropping the sender also wakes the select.
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeEngine;
    use std::time::Instant;

    fn job(id: u64, action: DockerAction) -> DockerJob {
        DockerJob {
            id,
            lab_id: "sqli-101".into(),
            project: ComposeProject::new("/labs/sqli-101", "docker-compose.yml"),
            action,
        }
    }

    #[test]
    fn worker_reports_jobs_in_order() {
        let engine = Arc::new(FakeEngine::healthy());
        let worker = DockerWorker::spawn(engine.clone());
        assert!(worker.submit(job(1, DockerAction::Up)));
        assert!(worker.submit(job(2, DockerAction::Logs { tail: 50 })));

        let first = worker
            .reports()
            .recv_timeout(Duration::from_secs(5))
            .expect("first report");
        let second = worker
            .reports()
            .recv_timeout(Duration::from_secs(5))
            .expect("second report");
        assert_eq!(first.job.id, 1);
        assert!(first.result.success());
        assert_eq!(second.job.action, DockerAction::Logs { tail: 50 });
        worker.shutdown();
        assert_eq!(engine.calls(), vec!["up".to_string(), "logs:50".to_string()]);
    }

    #[test]
    fn reset_job_uses_final_state_policy() {
        let engine = FakeEngine::healthy();
        engine.set_exit("down", 1);
        let result = run_job(&engine, &job(7, DockerAction::Reset));
        assert!(result.success());
        assert_eq!(engine.calls(), vec!["down".to_string(), "up".to_string()]);
    }

    #[test]
    fn poller_probes_immediately_and_stops_promptly() {
        let engine = Arc::new(FakeEngine::healthy());
        let poller = StatusPoller::start(engine, Duration::from_secs(60));
        let status = poller
            .updates()
            .recv_timeout(Duration::from_secs(5))
            .expect("first probe");
        assert!(status.usable());
        assert!(poller.is_running());

        let started = Instant::now();
        poller.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn poller_survives_a_panicking_engine() {
        let engine = Arc::new(FakeEngine::healthy());
        engine.panic_on_probe();
        let poller = StatusPoller::start(engine.clone(), Duration::from_millis(20));
        for _ in 0..2 {
            let status = poller
                .updates()
                .recv_timeout(Duration::from_secs(5))
                .expect("status after panic");
            assert!(!status.usable());
            assert_eq!(status.kind, crate::docker::StatusKind::Bad);
        }
        assert!(poller.is_running());
        poller.stop();
        assert!(engine.probe_count() >= 2);
    }

    #[test]
    fn poller_repeats_at_interval() {
        let engine = Arc::new(FakeEngine::healthy());
        let poller = StatusPoller::start(engine.clone(), Duration::from_millis(20));
        for _ in 0..3 {
            poller
                .updates()
                .recv_timeout(Duration::from_secs(5))
                .expect("probe");
        }
        drop(poller);
        assert!(engine.probe_count() >= 3);
    }
}
