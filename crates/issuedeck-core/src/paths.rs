//! Platform-specific application paths.

use crate::config::AppConfig;
use crate::error::{IssuedeckError, Result};
use std::path::PathBuf;

/// Get the issuedeck data directory.
///
/// # Platform Behavior
/// - **Linux**: `~/.local/share/issuedeck`
/// - **Windows**: `%APPDATA%/issuedeck`
/// - **macOS**: `~/Library/Application Support/issuedeck`
pub fn data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir()
        .ok_or_else(|| IssuedeckError::config("Could not determine data directory"))?;
    Ok(base.join(AppConfig::APP_NAME))
}

/// Path of the persisted cache document.
pub fn cache_document_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(AppConfig::CACHE_FILE_NAME))
}
