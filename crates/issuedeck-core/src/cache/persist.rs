//! Durable JSON document backing the persisted tier.
//!
//! Writes go to a temp file in the target directory and are renamed into
//! place, so a crash mid-write never leaves a truncated document behind.

use crate::error::{IssuedeckError, Result};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Load the persisted snapshot.
///
/// A missing, unreadable or unparseable document yields an empty map.
pub(super) fn load_document(path: &Path) -> Map<String, Value> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No cache document at {}", path.display());
            return Map::new();
        }
        Err(e) => {
            warn!("Failed to read cache document {}: {}", path.display(), e);
            return Map::new();
        }
    };

    match serde_json::from_str::<Value>(&contents) {
        Ok(Value::Object(map)) => {
            debug!("Loaded {} persisted cache entries", map.len());
            map
        }
        Ok(_) => {
            warn!("Cache document {} is not a JSON object", path.display());
            Map::new()
        }
        Err(e) => {
            warn!("Failed to parse cache document {}: {}", path.display(), e);
            Map::new()
        }
    }
}

/// Write serialized contents to the document, replacing it atomically.
pub(super) fn write_document(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    fs::create_dir_all(parent).map_err(|e| IssuedeckError::Io {
        message: format!("Failed to create directory {}", parent.display()),
        path: Some(parent.to_path_buf()),
        source: Some(e),
    })?;

    let mut temp = tempfile::Builder::new()
        .prefix(".cache-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| IssuedeckError::io_with_path(e, parent))?;

    temp.write_all(contents.as_bytes())
        .map_err(|e| IssuedeckError::io_with_path(e, temp.path()))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| IssuedeckError::io_with_path(e, temp.path()))?;

    temp.persist(path)
        .map_err(|e| IssuedeckError::io_with_path(e.error, path))?;

    debug!("Wrote cache document {}", path.display());
    Ok(())
}
