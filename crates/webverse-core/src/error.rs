use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no lab.yml or lab.yaml in {}", .0.display())]
    MissingDescriptor(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid lab descriptor {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("lab descriptor {} has an empty id", .0.display())]
    EmptyId(PathBuf),
    #[error("compose file {} does not exist", .0.display())]
    MissingComposeFile(PathBuf),
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("lab not found: {0}")]
    LabNotFound(String),
    #[error("lab {running} is already running; stop it before starting {requested}")]
    AnotherLabRunning { running: String, requested: String },
}
