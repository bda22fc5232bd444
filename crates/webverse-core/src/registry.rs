//! Discovers lab folders on disk. Each immediate sub-directory of the labs root holding a
//! `lab.yml` (or `lab.yaml`) becomes one [`Lab`]; anything malformed is skipped with a warning.

use crate::error::RegistryError;
use crate::lab::{Difficulty, Entrypoint, Lab, DEFAULT_COMPOSE_FILE};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const DESCRIPTOR_NAMES: [&str; 2] = ["lab.yml", "lab.yaml"];

#[derive(Debug, Deserialize)]
struct LabDescriptor {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    compose_file: Option<String>,
    #[serde(default)]
    entrypoint: Option<Entrypoint>,
    #[serde(default, alias = "flagSha256")]
    flag_sha256: Option<String>,
}

fn descriptor_path(dir: &Path) -> Option<PathBuf> {
    DESCRIPTOR_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Loads a single lab folder.
pub fn load_lab(dir: &Path) -> Result<Lab, RegistryError> {
    let path = descriptor_path(dir).ok_or_else(|| RegistryError::MissingDescriptor(dir.into()))?;
    let raw = fs::read_to_string(&path).map_err(|source| RegistryError::Read {
        path: path.clone(),
        source,
    })?;
    let desc: LabDescriptor =
        serde_yaml::from_str(&raw).map_err(|source| RegistryError::Parse {
            path: path.clone(),
            source,
        })?;

    let dir_name = dir
        .file_name()
        .map(|s| s.to_string_lossy().to_string());
    let id = non_blank(desc.id)
        .or_else(|| non_blank(dir_name))
        .ok_or_else(|| RegistryError::EmptyId(path.clone()))?;
    let compose_file =
        non_blank(desc.compose_file).unwrap_or_else(|| DEFAULT_COMPOSE_FILE.to_string());
    if !dir.join(&compose_file).is_file() {
        return Err(RegistryError::MissingComposeFile(dir.join(&compose_file)));
    }

    Ok(Lab {
        name: non_blank(desc.name).unwrap_or_else(|| id.clone()),
        id,
        description: desc.description.unwrap_or_default().trim().to_string(),
        difficulty: Difficulty::parse(desc.difficulty.as_deref().unwrap_or("")),
        path: dir.to_path_buf(),
        compose_file,
        entrypoint: desc.entrypoint.unwrap_or_default(),
        flag_sha256: desc
            .flag_sha256
            .unwrap_or_default()
            .trim()
            .to_lowercase(),
    })
}

/// Scans `root` and returns every loadable lab ordered by id.
pub fn discover_labs(root: &Path) -> Vec<Lab> {
    if !root.is_dir() {
        warn!(root = %root.display(), "labs directory does not exist");
        return Vec::new();
    }

    let mut labs = Vec::new();
    let mut seen = BTreeSet::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry in labs directory");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        match load_lab(entry.path()) {
            Ok(lab) => {
                if !seen.insert(lab.id.clone()) {
                    warn!(lab = %lab.id, path = %lab.path.display(), "skipping lab with duplicate id");
                    continue;
                }
                debug!(lab = %lab.id, "discovered lab");
                labs.push(lab);
            }
            Err(err) => {
                warn!(path = %entry.path().display(), error = %err, "skipping lab");
            }
        }
    }
    labs.sort_by(|a, b| a.id.cmp(&b.id));
    labs
}

/// Case-insensitive substring filter over name, id, difficulty and description.
pub fn filter_labs<'a>(labs: &'a [Lab], query: &str) -> Vec<&'a Lab> {
    let q = query.trim().to_lowercase();
    labs.iter()
        .filter(|lab| q.is_empty() || lab.search_text().contains(&q))
        .collect()
}

/// Stable sort by difficulty tier; unranked labels go last.
pub fn sort_by_difficulty(labs: &mut [Lab]) {
    labs.sort_by_key(|lab| lab.difficulty.sort_rank());
}

#[cfg(test)]
pub(crate) fn write_lab_fixture(root: &Path, dir: &str, yaml: &str) -> PathBuf {
    let lab_dir = root.join(dir);
    fs::create_dir_all(&lab_dir).expect("lab dir");
    fs::write(lab_dir.join("lab.yml"), yaml).expect("lab.yml");
    fs::write(
        lab_dir.join(DEFAULT_COMPOSE_FILE),
        "services:\n  app:\n    image: busybox\n",
    )
    .expect("compose file");
    lab_dir
}
