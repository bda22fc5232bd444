//! Thin, single-attempt wrappers around the `docker` / `docker compose` CLI.
//!
//! Expected failures (missing binary, non-zero exit, timeout) never surface as `Err`; they are
//! encoded in [`ProcessResult`] and [`Probe`] so callers decide what to show. Nothing here retries.

use crate::lab::ComposeProject;
use crossbeam_channel::{bounded, Receiver};
use serde::Serialize;
use std::fmt;
use std::io::{self, Read};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const EXIT_NOT_FOUND: i32 = 127;
pub const EXIT_TIMED_OUT: i32 = 124;
const EXIT_SPAWN_FAILED: i32 = -1;
const NOT_FOUND_DETAIL: &str = "Docker CLI not found";
/// How long to wait for pipe readers once the process is gone or killed.
const READER_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DockerTimeouts {
    pub probe: Duration,
    pub status: Duration,
    pub lifecycle: Duration,
    pub restart: Duration,
}

impl Default for DockerTimeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(8),
            status: Duration::from_secs(30),
            lifecycle: Duration::from_secs(600),
            restart: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProcessFailure {
    NotFound,
    TimedOut(Duration),
    Spawn(String),
}

impl fmt::Display for ProcessFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessFailure::NotFound => f.write_str(NOT_FOUND_DETAIL),
            ProcessFailure::TimedOut(after) => write!(f, "timed out after {}s", after.as_secs()),
            ProcessFailure::Spawn(msg) => write!(f, "failed to start process: {}", msg),
        }
    }
}

/// Uniform `(exit_code, stdout, stderr)` outcome of one external process call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub failure: Option<ProcessFailure>,
}

impl ProcessResult {
    pub fn completed(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            failure: None,
        }
    }

    pub fn failed(failure: ProcessFailure) -> Self {
        let exit_code = match failure {
            ProcessFailure::NotFound => EXIT_NOT_FOUND,
            ProcessFailure::TimedOut(_) => EXIT_TIMED_OUT,
            ProcessFailure::Spawn(_) => EXIT_SPAWN_FAILED,
        };
        Self {
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
            failure: Some(failure),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0 && self.failure.is_none()
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.failure, Some(ProcessFailure::NotFound))
    }

    /// Human-readable detail: stderr, falling back to stdout, falling back to the failure text.
    pub fn detail(&self) -> String {
        self.detail_or("")
    }

    pub fn detail_or(&self, fallback: &str) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match &self.failure {
            Some(failure) => failure.to_string(),
            None => fallback.to_string(),
        }
    }
}

/// `(ok, detail)` answer of an availability or status probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Probe {
    pub ok: bool,
    pub detail: String,
}

impl Probe {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            ok: true,
            detail: detail.into(),
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: detail.into(),
        }
    }
}

/// Joins two process results as `down` then `up`. The exit status is the second one's:
/// tearing down a project that is already stopped is not a failure.
pub fn combine_reset(down: ProcessResult, up: ProcessResult) -> ProcessResult {
    fn join(first: String, second: &str) -> String {
        let mut out = first;
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(second);
        out
    }
    ProcessResult {
        exit_code: up.exit_code,
        stdout: join(down.stdout, &up.stdout),
        stderr: join(down.stderr, &up.stderr),
        failure: up.failure,
    }
}

/// The container engine operations the launcher needs.
pub trait ContainerEngine: Send + Sync {
    fn engine_available(&self) -> Probe;
    fn compose_plugin_available(&self) -> Probe;
    /// `ok` is true iff at least one container of the project is running.
    fn has_running_containers(&self, project: &ComposeProject) -> Probe;
    fn up(&self, project: &ComposeProject) -> ProcessResult;
    fn down(&self, project: &ComposeProject) -> ProcessResult;
    fn restart(&self, project: &ComposeProject) -> ProcessResult;
    fn logs(&self, project: &ComposeProject, tail: u32) -> ProcessResult;
    fn ps(&self, project: &ComposeProject) -> ProcessResult;

    /// `down` followed unconditionally by `up`.
    fn reset(&self, project: &ComposeProject) -> ProcessResult {
        let down = self.down(project);
        let up = self.up(project);
        combine_reset(down, up)
    }
}

#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
    timeouts: DockerTimeouts,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker", DockerTimeouts::default())
    }
}

impl DockerCli {
    pub fn new(binary: impl Into<PathBuf>, timeouts: DockerTimeouts) -> Self {
        Self {
            binary: binary.into(),
            timeouts,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn timeouts(&self) -> DockerTimeouts {
        self.timeouts
    }

    fn run(&self, args: &[&str], cwd: Option<&Path>, timeout: Duration) -> ProcessResult {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        if let Some(dir) = cwd {
            // A missing cwd also reports NotFound on spawn; keep it distinct from a missing binary.
            if !dir.is_dir() {
                return ProcessResult::failed(ProcessFailure::Spawn(format!(
                    "project directory {} does not exist",
                    dir.display()
                )));
            }
            cmd.current_dir(dir);
        }
        debug!(binary = %self.binary.display(), ?args, timeout_secs = timeout.as_secs(), "running docker");
        let started = Instant::now();
        let result = run_with_timeout(cmd, timeout);
        debug!(
            exit_code = result.exit_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "docker finished"
        );
        if let Some(ProcessFailure::TimedOut(_)) = result.failure {
            warn!(?args, timeout_secs = timeout.as_secs(), "docker call timed out and was killed");
        }
        result
    }

    fn compose(
        &self,
        project: &ComposeProject,
        tail_args: &[&str],
        timeout: Duration,
    ) -> ProcessResult {
        let mut args = vec!["compose", "-f", project.compose_file.as_str()];
        args.extend_from_slice(tail_args);
        self.run(&args, Some(&project.dir), timeout)
    }
}

impl ContainerEngine for DockerCli {
    fn engine_available(&self) -> Probe {
        let timeout = self.timeouts.probe;
        let p = self.run(&["version", "--format", "{{.Server.Version}}"], None, timeout);
        if p.is_not_found() {
            return Probe::fail(NOT_FOUND_DETAIL);
        }
        if p.success() && !p.stdout.trim().is_empty() {
            return Probe::ok(p.stdout.trim());
        }
        let p2 = self.run(&["version"], None, timeout);
        if p2.success() {
            return Probe::ok("Installed");
        }
        Probe::fail(p.detail_or("Docker not available"))
    }

    fn compose_plugin_available(&self) -> Probe {
        let timeout = self.timeouts.probe;
        let p = self.run(&["compose", "version", "--short"], None, timeout);
        if p.is_not_found() {
            return Probe::fail(NOT_FOUND_DETAIL);
        }
        if p.success() && !p.stdout.trim().is_empty() {
            return Probe::ok(p.stdout.trim());
        }
        let p2 = self.run(&["compose", "version"], None, timeout);
        if p2.success() {
            let out = if p2.stdout.trim().is_empty() {
                p2.stderr.trim()
            } else {
                p2.stdout.trim()
            };
            if let Some(first) = out.lines().next() {
                return Probe::ok(first.trim());
            }
        }
        Probe::fail(p.detail_or("docker compose not available"))
    }

    fn has_running_containers(&self, project: &ComposeProject) -> Probe {
        let p = self.compose(
            project,
            &["ps", "--status", "running", "-q"],
            self.timeouts.status,
        );
        if !p.success() {
            return Probe::fail(p.detail_or("compose ps failed"));
        }
        let ids = p.stdout.trim();
        Probe {
            ok: !ids.is_empty(),
            detail: ids.to_string(),
        }
    }

    fn up(&self, project: &ComposeProject) -> ProcessResult {
        self.compose(project, &["up", "-d", "--build"], self.timeouts.lifecycle)
    }

    fn down(&self, project: &ComposeProject) -> ProcessResult {
        self.compose(project, &["down", "-v"], self.timeouts.lifecycle)
    }

    fn restart(&self, project: &ComposeProject) -> ProcessResult {
        self.compose(project, &["restart"], self.timeouts.restart)
    }

    fn logs(&self, project: &ComposeProject, tail: u32) -> ProcessResult {
        let tail = tail.to_string();
        self.compose(
            project,
            &["logs", "--no-color", "--tail", tail.as_str()],
            self.timeouts.status,
        )
    }

    fn ps(&self, project: &ComposeProject) -> ProcessResult {
        self.compose(project, &["ps"], self.timeouts.status)
    }
}

fn drain<R: Read + Send + 'static>(source: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = bounded(1);
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut source) = source {
            let _ = source.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

/// Output collected so far. A reader still blocked after `until` is left behind; its pipe is held
/// by a process that outlived the call.
fn collect(rx: &Receiver<Vec<u8>>, until: Instant) -> String {
    let bytes = rx.recv_deadline(until).unwrap_or_default();
    String::from_utf8_lossy(&bytes).to_string()
}

/// Puts the child in its own process group so a timeout can take down whatever it spawned
/// (`docker` runs the compose plugin as a separate process).
#[cfg(unix)]
fn isolate(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate(_cmd: &mut Command) {}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // Negative pid signals the whole group led by the child.
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn run_with_timeout(mut cmd: Command, timeout: Duration) -> ProcessResult {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    isolate(&mut cmd);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return ProcessResult::failed(ProcessFailure::NotFound)
        }
        Err(e) => return ProcessResult::failed(ProcessFailure::Spawn(e.to_string())),
    };

    let out_rx = drain(child.stdout.take());
    let err_rx = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let mut timed_out = false;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    timed_out = true;
                    kill_tree(&mut child);
                    break None;
                }
                thread::sleep(Duration::from_millis(25));
            }
            Err(e) => {
                kill_tree(&mut child);
                return ProcessResult::failed(ProcessFailure::Spawn(e.to_string()));
            }
        }
    };

    let until = if timed_out {
        Instant::now() + READER_GRACE
    } else {
        deadline.max(Instant::now() + READER_GRACE)
    };
    let stdout = collect(&out_rx, until);
    let stderr = collect(&err_rx, until);

    if timed_out {
        return ProcessResult {
            exit_code: EXIT_TIMED_OUT,
            stdout,
            stderr,
            failure: Some(ProcessFailure::TimedOut(timeout)),
        };
    }
    // Killed by a signal: no exit code.
    let exit_code = status.and_then(|s| s.code()).unwrap_or(EXIT_SPAWN_FAILED);
    ProcessResult::completed(exit_code, stdout, stderr)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Ok,
    Bad,
    Neutral,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Ok => "ok",
            StatusKind::Bad => "bad",
            StatusKind::Neutral => "neutral",
        }
    }
}

/// Status line for the engine + compose plugin pair, as shown in the launcher's top bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DockerStatus {
    pub text: String,
    pub kind: StatusKind,
    pub engine: Probe,
    pub compose: Probe,
}

impl DockerStatus {
    pub fn unknown() -> Self {
        Self {
            text: "Docker: Unknown".to_string(),
            kind: StatusKind::Neutral,
            engine: Probe::fail("not probed"),
            compose: Probe::fail("not probed"),
        }
    }

    pub fn from_probes(engine: Probe, compose: Probe) -> Self {
        let (text, kind) = match (engine.ok, compose.ok) {
            (true, true) => (
                format!("Docker: {} · Compose v2: {}", engine.detail, compose.detail),
                StatusKind::Ok,
            ),
            (true, false) => (
                format!(
                    "Docker: {} · Compose v2: Unavailable ({})",
                    engine.detail, compose.detail
                ),
                StatusKind::Bad,
            ),
            (false, _) => (
                format!("Docker: Unavailable ({})", engine.detail),
                StatusKind::Bad,
            ),
        };
        Self {
            text,
            kind,
            engine,
            compose,
        }
    }

    pub fn probe(engine: &dyn ContainerEngine) -> Self {
        Self::from_probes(engine.engine_available(), engine.compose_plugin_available())
    }

    /// [`DockerStatus::probe`], except that a panicking engine reads as unavailable.
    pub fn probe_guarded(engine: &dyn ContainerEngine) -> Self {
        match panic::catch_unwind(AssertUnwindSafe(|| Self::probe(engine))) {
            Ok(status) => status,
            Err(_) => {
                warn!("docker availability probe panicked; treating docker as unavailable");
                Self::from_probes(
                    Probe::fail("availability probe failed unexpectedly"),
                    Probe::fail("not probed"),
                )
            }
        }
    }

    /// Both the engine and the compose plugin answered.
    pub fn usable(&self) -> bool {
        self.engine.ok && self.compose.ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_reset_keeps_order_and_uses_up_exit_code() {
        let down = ProcessResult::completed(1, "nothing to stop", "no such project");
        let up = ProcessResult::completed(0, "Container web Started\n", "");
        let merged = combine_reset(down, up);
        assert!(merged.success());
        assert_eq!(merged.stdout, "nothing to stop\nContainer web Started\n");
        assert_eq!(merged.stderr, "no such project\n");
    }

    #[test]
    fn combine_reset_fails_when_up_fails() {
        let down = ProcessResult::completed(0, "Removed\n", "");
        let up = ProcessResult::failed(ProcessFailure::TimedOut(Duration::from_secs(600)));
        let merged = combine_reset(down, up);
        assert!(!merged.success());
        assert_eq!(merged.exit_code, EXIT_TIMED_OUT);
        assert_eq!(merged.stdout, "Removed\n");
    }

    #[test]
    fn detail_prefers_stderr_then_stdout_then_failure() {
        assert_eq!(ProcessResult::completed(1, " out ", " err ").detail(), "err");
        assert_eq!(ProcessResult::completed(1, " out ", "  ").detail(), "out");
        assert_eq!(
            ProcessResult::failed(ProcessFailure::NotFound).detail(),
            NOT_FOUND_DETAIL
        );
        assert_eq!(
            ProcessResult::completed(1, "", "").detail_or("compose ps failed"),
            "compose ps failed"
        );
    }

    #[test]
    fn status_text_reflects_worst_known_state() {
        let ok = DockerStatus::from_probes(Probe::ok("27.0.1"), Probe::ok("2.29.1"));
        assert_eq!(ok.kind, StatusKind::Ok);
        assert_eq!(ok.text, "Docker: 27.0.1 · Compose v2: 2.29.1");
        assert!(ok.usable());

        let no_compose =
            DockerStatus::from_probes(Probe::ok("27.0.1"), Probe::fail("unknown command"));
        assert_eq!(no_compose.kind, StatusKind::Bad);
        assert!(no_compose.text.contains("Compose v2: Unavailable (unknown command)"));
        assert!(!no_compose.usable());

        let no_engine =
            DockerStatus::from_probes(Probe::fail(NOT_FOUND_DETAIL), Probe::fail("x"));
        assert_eq!(no_engine.text, "Docker: Unavailable (Docker CLI not found)");
    }

    #[test]
    fn missing_binary_is_reported_as_not_found() {
        let cli = DockerCli::new(
            "/nonexistent/webverse-test/docker",
            DockerTimeouts::default(),
        );
        let engine = cli.engine_available();
        assert!(!engine.ok);
        assert_eq!(engine.detail, NOT_FOUND_DETAIL);
        let compose = cli.compose_plugin_available();
        assert!(!compose.ok);
        assert_eq!(compose.detail, NOT_FOUND_DETAIL);
    }

    #[cfg(unix)]
    mod fake_cli {
        use super::super::*;
        use crate::fsutil::scratch_dir;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        fn fake_docker(root: &Path, body: &str) -> PathBuf {
            let path = root.join("docker");
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write fake docker");
            let mut perms = fs::metadata(&path).expect("meta").permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&path, perms).expect("chmod");
            path
        }

        fn project(root: &Path) -> ComposeProject {
            let dir = root.join("lab");
            fs::create_dir_all(&dir).expect("project dir");
            ComposeProject::new(dir, "docker-compose.yml")
        }

        #[test]
        fn reset_succeeds_when_only_down_fails() {
            let root = scratch_dir("docker_reset");
            let bin = fake_docker(
                &root,
                r#"case "$*" in
  *" down "*) echo "down says nothing to remove"; echo "down-err" >&2; exit 1 ;;
  *" up "*) echo "up started web"; exit 0 ;;
esac
exit 2"#,
            );
            let cli = DockerCli::new(bin, DockerTimeouts::default());
            let result = cli.reset(&project(&root));
            assert!(result.success(), "reset should succeed: {:?}", result);
            let down_at = result.stdout.find("down says").expect("down output");
            let up_at = result.stdout.find("up started").expect("up output");
            assert!(down_at < up_at, "down output must come first: {}", result.stdout);
            assert!(result.stderr.contains("down-err"));
            let _ = fs::remove_dir_all(root);
        }

        #[test]
        fn running_probe_uses_status_filter() {
            let root = scratch_dir("docker_ps");
            let log = root.join("args.log");
            let bin = fake_docker(
                &root,
                &format!("echo \"$*\" >> '{}'\necho 3f2a9c1d", log.display()),
            );
            let cli = DockerCli::new(bin, DockerTimeouts::default());
            let probe = cli.has_running_containers(&project(&root));
            assert!(probe.ok);
            assert_eq!(probe.detail, "3f2a9c1d");
            let args = fs::read_to_string(&log).expect("args log");
            assert!(
                args.contains("compose -f docker-compose.yml ps --status running -q"),
                "unexpected args: {}",
                args
            );
            let _ = fs::remove_dir_all(root);
        }

        #[test]
        fn nonzero_exit_is_not_running() {
            let root = scratch_dir("docker_ps_fail");
            let bin = fake_docker(&root, "echo 'Cannot connect to the Docker daemon' >&2\nexit 1");
            let cli = DockerCli::new(bin, DockerTimeouts::default());
            let probe = cli.has_running_containers(&project(&root));
            assert!(!probe.ok);
            assert_eq!(probe.detail, "Cannot connect to the Docker daemon");
            let engine = cli.engine_available();
            assert!(!engine.ok);
            assert_eq!(engine.detail, "Cannot connect to the Docker daemon");
            let _ = fs::remove_dir_all(root);
        }

        #[test]
        fn compose_probe_falls_back_to_long_version() {
            let root = scratch_dir("docker_compose_version");
            let bin = fake_docker(
                &root,
                r#"case "$*" in
  "compose version --short") exit 1 ;;
  "compose version") echo "Docker Compose version v2.29.1"; echo "extra"; exit 0 ;;
esac
exit 1"#,
            );
            let cli = DockerCli::new(bin, DockerTimeouts::default());
            let probe = cli.compose_plugin_available();
            assert!(probe.ok);
            assert_eq!(probe.detail, "Docker Compose version v2.29.1");
            let _ = fs::remove_dir_all(root);
        }

        #[test]
        fn slow_process_is_killed_at_timeout() {
            let root = scratch_dir("docker_timeout");
            let bin = fake_docker(&root, "exec sleep 5");
            let timeouts = DockerTimeouts {
                status: Duration::from_millis(300),
                ..DockerTimeouts::default()
            };
            let cli = DockerCli::new(bin, timeouts);
            let started = Instant::now();
            let result = cli.ps(&project(&root));
            assert!(started.elapsed() < Duration::from_secs(4));
            assert_eq!(result.exit_code, EXIT_TIMED_OUT);
            assert!(matches!(result.failure, Some(ProcessFailure::TimedOut(_))));
            let _ = fs::remove_dir_all(root);
        }

        #[test]
        fn timeout_is_enforced_when_the_cli_has_child_processes() {
            let root = scratch_dir("docker_timeout_tree");
            let marker = root.join("late-write");
            let bin = fake_docker(
                &root,
                &format!(
                    "echo partial\n(sleep 1; echo late > '{}') &\nsleep 6",
                    marker.display()
                ),
            );
            let timeouts = DockerTimeouts {
                status: Duration::from_millis(300),
                ..DockerTimeouts::default()
            };
            let cli = DockerCli::new(bin, timeouts);
            let started = Instant::now();
            let result = cli.ps(&project(&root));
            let elapsed = started.elapsed();
            assert!(elapsed < Duration::from_secs(2), "call took {:?}", elapsed);
            assert_eq!(result.exit_code, EXIT_TIMED_OUT);
            assert!(matches!(result.failure, Some(ProcessFailure::TimedOut(_))));
            assert_eq!(result.stdout.trim(), "partial");

            // The background job would have written the marker by now had it survived.
            std::thread::sleep(Duration::from_millis(1500));
            assert!(!marker.exists(), "process spawned by the cli outlived the timeout");
            let _ = fs::remove_dir_all(root);
        }

        #[test]
        fn missing_project_dir_is_not_reported_as_missing_binary() {
            let root = scratch_dir("docker_cwd");
            let bin = fake_docker(&root, "exit 0");
            let cli = DockerCli::new(bin, DockerTimeouts::default());
            let result = cli.up(&ComposeProject::new(root.join("gone"), "docker-compose.yml"));
            assert!(!result.success());
            assert!(!result.is_not_found());
            let _ = fs::remove_dir_all(root);
        }
    }
}
