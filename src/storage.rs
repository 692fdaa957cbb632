//! Local persistence contract: load-at-start, save-on-change.
//!
//! Everything Rival persists (profile, sessions, usage counter) is a JSON
//! blob on disk. Timestamps serialize as RFC 3339 and rehydrate back into
//! `DateTime` values through serde, so ordering comparisons survive reload.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors from the persistence layer
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Load a JSON blob from disk. Returns `Ok(None)` if the file does not
/// exist yet.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)?;
    let value = serde_json::from_str(&contents)?;
    debug!("Loaded blob from {}", path.display());
    Ok(Some(value))
}

/// Save a JSON blob to disk, creating parent directories as needed
pub fn save<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(value)?;
    std::fs::write(path, contents)?;
    debug!("Saved blob to {}", path.display());
    Ok(())
}
