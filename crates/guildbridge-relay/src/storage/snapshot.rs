//! Membership snapshot persistence.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::models::MemberRecord;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot replace error: {0}")]
    Replace(String),
}

/// Durable membership snapshot, stored as a flat JSON record list.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the full record list. A missing file is an empty snapshot, not
    /// an error.
    pub fn load(&self) -> Result<Vec<MemberRecord>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "Membership snapshot not found, starting empty");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Rewrite the whole snapshot atomically: the records are written to a
    /// temporary file in the same directory and renamed over the old one.
    pub fn save(&self, records: &[MemberRecord]) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(records)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&self.path)
            .map_err(|e| StorageError::Replace(e.to_string()))?;

        info!(path = %self.path.display(), count = records.len(), "Membership snapshot saved");
        Ok(())
    }
}
