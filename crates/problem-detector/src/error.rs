use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors loading an offline inventory or cluster snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("failed to read snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse snapshot {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid snapshot: {0}")]
    Invalid(String),
}

/// Read and deserialize a YAML snapshot file.
pub(crate) fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<T, SnapshotError> {
    let contents = std::fs::read_to_string(path).map_err(|source| SnapshotError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&contents).map_err(|source| SnapshotError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Errors that stop the detector before a report exists.
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("failed to build check registry: {0}")]
    Registry(#[from] check_engine::RegistryError),

    #[error(transparent)]
    Run(#[from] check_engine::RunError),
}
