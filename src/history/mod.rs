use chrono::{ DateTime, Local };
use log::info;
use std::fs;
use std::path::{ Path, PathBuf };
use thiserror::Error;

use crate::models::chat::HistoryRecord;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize history: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn export_file_name(at: DateTime<Local>) -> String {
    format!("conversation_{}.json", at.format("%Y%m%d_%H%M%S"))
}

/// Pretty-printed with two-space indentation; non-ASCII text is written as-is.
pub fn render_history(records: &[HistoryRecord]) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(records)?)
}

pub fn export_history(
    records: &[HistoryRecord],
    dir: &Path,
    at: DateTime<Local>
) -> Result<PathBuf, ExportError> {
    let path = dir.join(export_file_name(at));
    let json = render_history(records)?;
    fs::create_dir_all(dir).map_err(|source| ExportError::Io { path: dir.to_path_buf(), source })?;
    fs::write(&path, json).map_err(|source| ExportError::Io { path: path.clone(), source })?;
    info!("Exported {} conversation records to {}", records.len(), path.display());
    Ok(path)
}
