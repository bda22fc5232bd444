//! Launcher configuration, layered as defaults < `<data_dir>/config.yml` < environment < flags.

use crate::docker::{DockerCli, DockerTimeouts};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_HOME: &str = "WEBVERSE_HOME";
pub const ENV_LABS_DIR: &str = "WEBVERSE_LABS_DIR";
pub const ENV_DOCKER_BIN: &str = "WEBVERSE_DOCKER_BIN";

const DEFAULT_POLL_SECS: u64 = 12;
const DEFAULT_LOGS_TAIL: u32 = 200;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TimeoutsFile {
    probe_secs: Option<u64>,
    status_secs: Option<u64>,
    lifecycle_secs: Option<u64>,
    restart_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    labs_dir: Option<PathBuf>,
    docker_bin: Option<PathBuf>,
    poll_interval_secs: Option<u64>,
    logs_tail: Option<u32>,
    #[serde(default)]
    timeouts: TimeoutsFile,
}

/// Values given on the command line; they win over everything else.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_dir: Option<PathBuf>,
    pub labs_dir: Option<PathBuf>,
    pub docker_bin: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct WebverseConfig {
    pub data_dir: PathBuf,
    pub labs_dir: PathBuf,
    pub docker_bin: PathBuf,
    pub poll_interval: Duration,
    pub timeouts: DockerTimeouts,
    pub logs_tail: u32,
}

impl WebverseConfig {
    /// Defaults rooted at the given directories, no file or environment lookups.
    pub fn with_dirs(data_dir: impl Into<PathBuf>, labs_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            labs_dir: labs_dir.into(),
            docker_bin: PathBuf::from("docker"),
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECS),
            timeouts: DockerTimeouts::default(),
            logs_tail: DEFAULT_LOGS_TAIL,
        }
    }

    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    pub fn resolve_with<F>(overrides: &ConfigOverrides, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_path = |key: &str| env(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);

        let data_dir = overrides
            .data_dir
            .clone()
            .or_else(|| env_path(ENV_HOME))
            .unwrap_or_else(|| default_data_dir(env("HOME")));
        let file = load_config_file(&data_dir.join("config.yml"))?;

        let mut cfg = Self::with_dirs(data_dir.clone(), PathBuf::from("labs"));
        if let Some(dir) = file.labs_dir {
            cfg.labs_dir = if dir.is_relative() {
                data_dir.join(dir)
            } else {
                dir
            };
        }
        if let Some(bin) = file.docker_bin {
            cfg.docker_bin = bin;
        }
        if let Some(secs) = file.poll_interval_secs.filter(|s| *s > 0) {
            cfg.poll_interval = Duration::from_secs(secs);
        }
        if let Some(tail) = file.logs_tail {
            cfg.logs_tail = tail;
        }
        let t = file.timeouts;
        let secs = |v: Option<u64>, default: Duration| {
            v.filter(|s| *s > 0).map(Duration::from_secs).unwrap_or(default)
        };
        cfg.timeouts = DockerTimeouts {
            probe: secs(t.probe_secs, cfg.timeouts.probe),
            status: secs(t.status_secs, cfg.timeouts.status),
            lifecycle: secs(t.lifecycle_secs, cfg.timeouts.lifecycle),
            restart: secs(t.restart_secs, cfg.timeouts.restart),
        };

        if let Some(dir) = overrides.labs_dir.clone().or_else(|| env_path(ENV_LABS_DIR)) {
            cfg.labs_dir = dir;
        }
        if let Some(bin) = overrides
            .docker_bin
            .clone()
            .or_else(|| env_path(ENV_DOCKER_BIN))
        {
            cfg.docker_bin = bin;
        }
        Ok(cfg)
    }

    pub fn runtime_path(&self) -> PathBuf {
        self.data_dir.join("runtime.json")
    }

    pub fn progress_db_path(&self) -> PathBuf {
        self.data_dir.join("progress.db")
    }

    pub fn docker_cli(&self) -> DockerCli {
        DockerCli::new(self.docker_bin.clone(), self.timeouts)
    }
}

fn default_data_dir(home: Option<String>) -> PathBuf {
    match home.filter(|h| !h.trim().is_empty()) {
        Some(home) => PathBuf::from(home).join(".webverse"),
        None => PathBuf::from(".webverse"),
    }
}

fn load_config_file(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    serde_yaml::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsutil::scratch_dir;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_live_under_home() {
        let cfg = WebverseConfig::resolve_with(
            &ConfigOverrides::default(),
            env_from(&[("HOME", "/nonexistent/webverse-home")]),
        )
        .expect("resolve");
        assert_eq!(cfg.data_dir, PathBuf::from("/nonexistent/webverse-home/.webverse"));
        assert_eq!(cfg.runtime_path(), cfg.data_dir.join("runtime.json"));
        assert_eq!(cfg.docker_bin, PathBuf::from("docker"));
        assert_eq!(cfg.poll_interval, Duration::from_secs(12));
        assert_eq!(cfg.timeouts, DockerTimeouts::default());
    }

    #[test]
    fn file_then_env_then_flags() {
        let data = scratch_dir("config_layers");
        fs::write(
            data.join("config.yml"),
            "labs_dir: my-labs\ndocker_bin: /opt/docker\npoll_interval_secs: 30\ntimeouts:\n  probe_secs: 3\n",
        )
        .expect("config");
        let overrides = ConfigOverrides {
            data_dir: Some(data.clone()),
            ..ConfigOverrides::default()
        };

        let cfg = WebverseConfig::resolve_with(&overrides, env_from(&[])).expect("resolve");
        assert_eq!(cfg.labs_dir, data.join("my-labs"));
        assert_eq!(cfg.docker_bin, PathBuf::from("/opt/docker"));
        assert_eq!(cfg.poll_interval, Duration::from_secs(30));
        assert_eq!(cfg.timeouts.probe, Duration::from_secs(3));
        assert_eq!(cfg.timeouts.lifecycle, Duration::from_secs(600));

        let cfg = WebverseConfig::resolve_with(
            &overrides,
            env_from(&[(ENV_LABS_DIR, "/env/labs"), (ENV_DOCKER_BIN, "podman")]),
        )
        .expect("resolve");
        assert_eq!(cfg.labs_dir, PathBuf::from("/env/labs"));
        assert_eq!(cfg.docker_bin, PathBuf::from("podman"));

        let flagged = ConfigOverrides {
            labs_dir: Some(PathBuf::from("/flag/labs")),
            ..overrides
        };
        let cfg = WebverseConfig::resolve_with(&flagged, env_from(&[(ENV_LABS_DIR, "/env/labs")]))
            .expect("resolve");
        assert_eq!(cfg.labs_dir, PathBuf::from("/flag/labs"));
        let _ = fs::remove_dir_all(data);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let data = scratch_dir("config_bad");
        fs::write(data.join("config.yml"), "poll_interval_secs: soon\n").expect("config");
        let overrides = ConfigOverrides {
            data_dir: Some(data.clone()),
            ..ConfigOverrides::default()
        };
        let err = WebverseConfig::resolve_with(&overrides, env_from(&[])).expect_err("bad yaml");
        assert!(err.to_string().contains("invalid config"), "unexpected: {}", err);
        let _ = fs::remove_dir_all(data);
    }
}
