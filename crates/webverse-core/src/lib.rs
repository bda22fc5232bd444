//! Core of the WebVerse lab launcher: lab discovery, docker compose control, persisted runtime
//! and progress state, flag verification and the reconciling application state.

pub mod config;
pub mod docker;
pub mod error;
pub mod events;
pub mod flags;
pub mod fsutil;
pub mod lab;
pub mod progress;
pub mod ranks;
pub mod registry;
pub mod runtime;
pub mod state;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::{ConfigOverrides, WebverseConfig};
pub use docker::{
    ContainerEngine, DockerCli, DockerStatus, DockerTimeouts, Probe, ProcessFailure, ProcessResult,
    StatusKind,
};
pub use error::{RegistryError, StateError, StoreError};
pub use events::{AppEvent, EventBus};
pub use lab::{ComposeProject, Difficulty, Lab};
pub use progress::{ProgressMap, ProgressRecord, ProgressStore, Summary};
pub use ranks::{Dashboard, RankPosition};
pub use registry::{discover_labs, filter_labs, load_lab};
pub use runtime::RuntimeStore;
pub use state::{AppState, Reconciliation, SubmitOutcome};
pub use worker::{DockerAction, DockerJob, DockerWorker, JobReport, StatusPoller};
