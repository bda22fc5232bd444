use anyhow::{anyhow, bail, Result};
use chrono::Local;
use clap::{ArgAction, Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use serde_json::{json, Value};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use webverse_core::registry::sort_by_difficulty;
use webverse_core::{
    AppState, ConfigOverrides, ContainerEngine, DockerAction, DockerStatus, DockerWorker,
    JobReport, Lab, ProcessResult, ProgressRecord, ProgressStore, Reconciliation, RuntimeStore,
    StatusPoller, SubmitOutcome, WebverseConfig,
};

mod ports;

#[derive(Parser)]
#[command(name = "webverse", version, about = "WebVerse lab launcher")]
struct Cli {
    /// Where runtime.json, progress.db and config.yml live.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    labs_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    docker_bin: Option<PathBuf>,
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    List {
        #[arg(long)]
        filter: Option<String>,
        /// Easiest first instead of by id.
        #[arg(long)]
        by_difficulty: bool,
        #[arg(long)]
        json: bool,
    },
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    Status {
        #[arg(long)]
        json: bool,
    },
    Start {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Stops the lab that is currently running.
    Stop {
        #[arg(long)]
        json: bool,
    },
    Restart {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Tears the lab down (volumes included) and brings it back up.
    Reset {
        id: String,
        #[arg(long)]
        json: bool,
    },
    Logs {
        id: String,
        #[arg(long)]
        tail: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    Ps {
        id: String,
        #[arg(long)]
        json: bool,
    },
    Submit {
        id: String,
        flag: String,
        #[arg(long)]
        json: bool,
    },
    Notes {
        id: String,
        #[arg(long)]
        set: Option<String>,
        #[arg(long)]
        json: bool,
    },
    Progress {
        #[arg(long)]
        json: bool,
    },
    Doctor {
        #[arg(long)]
        json: bool,
    },
    /// Polls docker availability and prints every change.
    Watch {
        #[arg(long)]
        iterations: Option<u32>,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json_mode = command_json_mode(&cli.command);
    let overrides = ConfigOverrides {
        data_dir: cli.data_dir,
        labs_dir: cli.labs_dir,
        docker_bin: cli.docker_bin,
    };
    let result = run_command(cli.command, &overrides);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", err.to_string(), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

struct Session {
    state: AppState,
    reconciliation: Reconciliation,
}

fn open_session(overrides: &ConfigOverrides) -> Result<Session> {
    let config = WebverseConfig::resolve(overrides)?;
    let engine: Arc<dyn ContainerEngine> = Arc::new(config.docker_cli());
    let runtime = RuntimeStore::open(config.runtime_path());
    let progress = ProgressStore::open(&config.progress_db_path())?;
    let mut state = AppState::with_parts(config, engine, runtime, progress);
    let reconciliation = state.startup();
    Ok(Session {
        state,
        reconciliation,
    })
}

fn require_lab(state: &AppState, id: &str) -> Result<Lab> {
    state
        .lab(id)
        .cloned()
        .ok_or_else(|| anyhow!("lab not found: {}", id))
}

fn run_command(command: Commands, overrides: &ConfigOverrides) -> Result<Option<Value>> {
    let Session {
        mut state,
        reconciliation,
    } = open_session(overrides)?;
    match command {
        Commands::List {
            filter,
            by_difficulty,
            json,
        } => {
            if let Some(q) = &filter {
                state.set_filter(q);
            }
            let progress = state.progress_map()?.clone();
            let running = state.running_lab_id().map(str::to_string);
            let mut labs: Vec<Lab> = state.filtered_labs().into_iter().cloned().collect();
            if by_difficulty {
                sort_by_difficulty(&mut labs);
            }
            if json {
                let rows: Vec<Value> = labs
                    .iter()
                    .map(|lab| lab_to_json(lab, progress.get(&lab.id), running.as_deref()))
                    .collect();
                return Ok(Some(json!({
                    "ok": true,
                    "command": "list",
                    "filter": filter,
                    "labs": rows
                })));
            }
            if labs.is_empty() {
                println!("no labs found in {}", state.config().labs_dir.display());
            }
            for lab in &labs {
                let status = if running.as_deref() == Some(lab.id.as_str()) {
                    "running"
                } else if progress.get(&lab.id).map_or(false, |p| p.is_solved()) {
                    "solved"
                } else {
                    "-"
                };
                println!(
                    "{:<24} {:<8} {:<8} {}",
                    lab.id,
                    lab.difficulty.as_str(),
                    status,
                    lab.name
                );
            }
        }
        Commands::Show { id, json } => {
            let lab = require_lab(&state, &id)?;
            let record = state.progress_map()?.get(&id).cloned();
            let notes = state.get_notes(&id)?;
            let running = state.running_lab_id().map(str::to_string);
            if json {
                let mut value = lab_to_json(&lab, record.as_ref(), running.as_deref());
                value["description"] = json!(lab.description);
                value["path"] = json!(lab.path.display().to_string());
                value["compose_file"] = json!(lab.compose_file);
                value["notes"] = json!(notes);
                return Ok(Some(json!({
                    "ok": true,
                    "command": "show",
                    "lab": value
                })));
            }
            let record = record.unwrap_or_default();
            println!("id: {}", lab.id);
            println!("name: {}", lab.name);
            println!("difficulty: {}", lab.difficulty);
            println!("path: {}", lab.path.display());
            println!("compose_file: {}", lab.compose_file);
            println!("base_url: {}", lab.base_url().unwrap_or("none"));
            println!("flag_configured: {}", lab.has_flag());
            println!("running: {}", running.as_deref() == Some(lab.id.as_str()));
            println!(
                "started_at: {}",
                record.started_at.as_deref().unwrap_or("never")
            );
            match record.solved_at_local() {
                Some(at) => println!("solved_at: {}", at.format("%Y-%m-%d %H:%M")),
                None => println!("solved_at: not solved"),
            }
            println!("attempts: {}", record.attempts);
            if !lab.description.is_empty() {
                println!();
                println!("{}", lab.description);
            }
            if !notes.is_empty() {
                println!();
                println!("notes:");
                println!("{}", notes);
            }
        }
        Commands::Status { json } => {
            let docker = state.docker_status().clone();
            let running = state.running().cloned();
            if json {
                let running_lab = running.as_ref().map(|lab| {
                    json!({
                        "id": lab.id,
                        "name": lab.name,
                        "base_url": lab.base_url()
                    })
                });
                return Ok(Some(json!({
                    "ok": true,
                    "command": "status",
                    "docker": docker,
                    "reconciliation": reconciliation,
                    "running_lab": running_lab
                })));
            }
            println!("{}", docker.text);
            match &running {
                Some(lab) => println!(
                    "running: {} ({}){}",
                    lab.id,
                    lab.name,
                    lab.base_url()
                        .map(|u| format!(" at {}", u))
                        .unwrap_or_default()
                ),
                None => println!("running: none"),
            }
            print_reconciliation(reconciliation);
        }
        Commands::Start { id, json } => {
            let job = state.plan_job(&id, DockerAction::Up)?;
            let worker = DockerWorker::spawn(state.engine());
            if !worker.submit(job) {
                bail!("docker worker is not accepting jobs");
            }
            if !json {
                eprint!("starting {}", id);
            }
            let report = wait_for_report(&worker, !json)?;
            worker.shutdown();
            state.apply_job_report(&report)?;
            let result = ensure_success(report.result, "compose up", &id)?;
            let lab = require_lab(&state, &id)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "start",
                    "lab": id,
                    "base_url": lab.base_url(),
                    "result": process_to_json(&result)
                })));
            }
            println!("started {}", id);
            if let Some(url) = lab.base_url() {
                println!("open: {}", url);
            }
        }
        Commands::Stop { json } => {
            let running = state.running_lab_id().map(str::to_string);
            let outcome = state.stop_running_lab()?;
            let result = match (running, outcome) {
                (Some(id), Some(result)) => Some((ensure_success(result, "compose down", &id)?, id)),
                _ => None,
            };
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "stop",
                    "stopped": result.as_ref().map(|(_, id)| id),
                    "result": result.as_ref().map(|(r, _)| process_to_json(r))
                })));
            }
            match result {
                Some((_, id)) => println!("stopped {}", id),
                None => println!("no lab is running"),
            }
        }
        Commands::Restart { id, json } => {
            let result = state.restart_lab(&id)?;
            let result = ensure_success(result, "compose restart", &id)?;
            return lifecycle_output("restart", &id, &result, json);
        }
        Commands::Reset { id, json } => {
            let result = state.reset_lab(&id)?;
            let result = ensure_success(result, "reset", &id)?;
            return lifecycle_output("reset", &id, &result, json);
        }
        Commands::Logs { id, tail, json } => {
            let tail = tail.unwrap_or(state.config().logs_tail);
            let result = state.lab_logs(&id, tail)?;
            let result = ensure_success(result, "compose logs", &id)?;
            return passthrough_output("logs", &id, &result, json);
        }
        Commands::Ps { id, json } => {
            let result = state.lab_ps(&id)?;
            let result = ensure_success(result, "compose ps", &id)?;
            return passthrough_output("ps", &id, &result, json);
        }
        Commands::Submit { id, flag, json } => {
            let outcome = state.submit_flag(&id, &flag)?;
            let record = state.progress_map()?.get(&id).cloned().unwrap_or_default();
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "submit",
                    "lab": id,
                    "outcome": outcome,
                    "solved": outcome.is_solved(),
                    "message": outcome.message(),
                    "attempts": record.attempts
                })));
            }
            match outcome {
                SubmitOutcome::Solved => println!("correct! {} solved", id),
                SubmitOutcome::Rejected => println!("incorrect flag"),
                other => println!("{}", other.message()),
            }
            println!("attempts: {}", record.attempts);
        }
        Commands::Notes { id, set, json } => {
            require_lab(&state, &id)?;
            if let Some(text) = &set {
                state.set_notes(&id, text)?;
            }
            let notes = state.get_notes(&id)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "notes",
                    "lab": id,
                    "updated": set.is_some(),
                    "notes": notes
                })));
            }
            println!("{}", notes);
        }
        Commands::Progress { json } => {
            let dashboard = state.dashboard(Local::now().date_naive())?;
            let summary = state.summary()?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "progress",
                    "dashboard": dashboard,
                    "xp_to_next": dashboard.rank.xp_to_next(dashboard.xp),
                    "summary": summary
                })));
            }
            println!("rank: {}", dashboard.rank.name);
            println!("xp: {}", dashboard.xp);
            println!("attempt_bonus_xp: {}", dashboard.bonus_xp);
            match (dashboard.rank.next, dashboard.rank.xp_to_next(dashboard.xp)) {
                (Some((name, _)), Some(left)) => println!("next_rank: {} in {} xp", name, left),
                _ => println!("next_rank: none"),
            }
            println!(
                "solved: {}/{} ({}%)",
                dashboard.solved, dashboard.total_labs, dashboard.completion_percent
            );
            println!("labs_started: {}", summary.started);
            println!("attempts: {}", dashboard.attempts);
            println!("streak_days: {}", dashboard.streak_days);
        }
        Commands::Doctor { json } => {
            let docker = state.docker_status().clone();
            let ports = ports::PortCheck::detect();
            let config = state.config().clone();
            let lab_count = state.labs().len();
            if json {
                return Ok(Some(json!({
                    "ok": docker.usable() && ports.ok(),
                    "command": "doctor",
                    "docker": docker,
                    "privileged_ports": ports.to_json(),
                    "data_dir": config.data_dir.display().to_string(),
                    "labs_dir": config.labs_dir.display().to_string(),
                    "docker_bin": config.docker_bin.display().to_string(),
                    "labs": lab_count
                })));
            }
            println!("{}", docker.text);
            println!("data_dir: {}", config.data_dir.display());
            println!("labs_dir: {} ({} labs)", config.labs_dir.display(), lab_count);
            println!("docker_bin: {}", config.docker_bin.display());
            if !ports.supported() {
                println!("privileged_ports: not checked on this platform");
            } else if ports.ok() {
                println!("privileged_ports: ok");
            } else {
                let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("webverse"));
                println!("privileged_ports: blocked");
                println!();
                print!("{}", ports.remediation(&exe));
            }
        }
        Commands::Watch { iterations, json } => {
            let interval = state.config().poll_interval;
            let poller = StatusPoller::start(state.engine(), interval);
            let mut seen = 0u32;
            while iterations.map_or(true, |n| seen < n) {
                let status = poller
                    .updates()
                    .recv()
                    .map_err(|_| anyhow!("docker status poller stopped"))?;
                seen += 1;
                let changed = status != *state.docker_status();
                state.apply_docker_status(status.clone());
                if changed && status.usable() {
                    let before = state.running_lab_id().map(str::to_string);
                    if state.reconcile() == Reconciliation::ClearedStale {
                        tracing::info!(lab = ?before, "running lab is no longer up");
                    }
                }
                if json {
                    emit_json(&json!({
                        "ok": true,
                        "command": "watch",
                        "docker": status,
                        "running_lab": state.running_lab_id()
                    }));
                } else {
                    println!(
                        "[{}] {}",
                        Local::now().format("%H:%M:%S"),
                        status_line(&status, state.running_lab_id())
                    );
                }
            }
            poller.stop();
        }
    }
    Ok(None)
}

/// Blocks until the worker reports, printing a dot per second while waiting.
fn wait_for_report(worker: &DockerWorker, dots: bool) -> Result<JobReport> {
    loop {
        match worker.reports().recv_timeout(Duration::from_secs(1)) {
            Ok(report) => {
                if dots {
                    eprintln!();
                }
                return Ok(report);
            }
            Err(RecvTimeoutError::Timeout) => {
                if dots {
                    eprint!(".");
                    let _ = std::io::stderr().flush();
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                bail!("docker worker stopped before reporting")
            }
        }
    }
}

fn ensure_success(result: ProcessResult, what: &str, id: &str) -> Result<ProcessResult> {
    if result.success() {
        return Ok(result);
    }
    Err(anyhow!(
        "{} failed for {} (exit {}): {}",
        what,
        id,
        result.exit_code,
        result.detail_or("no output")
    ))
}

fn lifecycle_output(command: &str, id: &str, result: &ProcessResult, json: bool) -> Result<Option<Value>> {
    if json {
        return Ok(Some(json!({
            "ok": true,
            "command": command,
            "lab": id,
            "result": process_to_json(result)
        })));
    }
    println!("{} {}: ok", command, id);
    Ok(None)
}

fn passthrough_output(command: &str, id: &str, result: &ProcessResult, json: bool) -> Result<Option<Value>> {
    if json {
        return Ok(Some(json!({
            "ok": true,
            "command": command,
            "lab": id,
            "output": result.stdout
        })));
    }
    print!("{}", result.stdout);
    Ok(None)
}

fn print_reconciliation(reconciliation: Reconciliation) {
    match reconciliation {
        Reconciliation::ClearedStale => {
            println!("note: the previously running lab has no running containers; cleared")
        }
        Reconciliation::ClearedUnknownLab => {
            println!("note: the previously running lab no longer exists; cleared")
        }
        Reconciliation::Unverifiable => {
            println!("note: docker is unavailable; running state could not be verified")
        }
        Reconciliation::NothingClaimed | Reconciliation::Verified => {}
    }
}

fn status_line(status: &DockerStatus, running: Option<&str>) -> String {
    format!(
        "{} [{}] running: {}",
        status.text,
        status.kind.as_str(),
        running.unwrap_or("none")
    )
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::List { json, .. }
        | Commands::Show { json, .. }
        | Commands::Status { json }
        | Commands::Start { json, .. }
        | Commands::Stop { json }
        | Commands::Restart { json, .. }
        | Commands::Reset { json, .. }
        | Commands::Logs { json, .. }
        | Commands::Ps { json, .. }
        | Commands::Submit { json, .. }
        | Commands::Notes { json, .. }
        | Commands::Progress { json }
        | Commands::Doctor { json }
        | Commands::Watch { json, .. } => *json,
    }
}

fn lab_to_json(lab: &Lab, record: Option<&ProgressRecord>, running: Option<&str>) -> Value {
    let record = record.cloned().unwrap_or_default();
    json!({
        "id": lab.id,
        "name": lab.name,
        "difficulty": lab.difficulty,
        "base_url": lab.base_url(),
        "flag_configured": lab.has_flag(),
        "running": running == Some(lab.id.as_str()),
        "solved": record.is_solved(),
        "started_at": record.started_at,
        "solved_at": record.solved_at,
        "attempts": record.attempts
    })
}

fn process_to_json(result: &ProcessResult) -> Value {
    json!({
        "exit_code": result.exit_code,
        "stdout": result.stdout,
        "stderr": result.stderr
    })
}
