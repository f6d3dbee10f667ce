//! On-disk layout: chunk artifacts and decoded records.
//!
//! ```text
//! {data_dir}/zip/{YYYY-MM}/{B?}{start}-{end}.zip     chunk artifacts
//! {data_dir}/json/{YYYY-MM-DD}/{entry}.json          one record per document
//! ```
//!
//! The artifact tree is the run's only checkpoint. Artifacts and records
//! are written to a temporary sibling and renamed into place, so an
//! interrupted write never leaves a file that looks finished.

use anyhow::{Context, Result};
use archive_harvest_core::chunk::{ArtifactName, Chunk, Direction};
use archive_harvest_core::record::DocumentRecord;
use archive_harvest_core::window::Window;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const PARTIAL_SUFFIX: &str = ".part";

pub fn window_dir(zip_dir: &Path, window: Window) -> PathBuf {
    zip_dir.join(window.label())
}

pub fn artifact_path(zip_dir: &Path, chunk: &Chunk) -> PathBuf {
    window_dir(zip_dir, chunk.window).join(chunk.file_name())
}

/// Artifact names stored for a window. A missing directory means none.
pub fn list_artifacts(zip_dir: &Path, window: Window) -> Result<Vec<ArtifactName>> {
    let dir = window_dir(zip_dir, window);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to list {}", dir.display()));
        }
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str().and_then(ArtifactName::parse) {
            names.push(name);
        }
    }
    names.sort_by_key(|n| (n.direction == Direction::Backward, n.start));
    Ok(names)
}

/// Every stored artifact under `zip_dir`, sorted by path.
pub fn all_artifacts(zip_dir: &Path) -> Result<Vec<PathBuf>> {
    if !zip_dir.exists() {
        return Ok(Vec::new());
    }
    let mut paths = Vec::new();
    for entry in WalkDir::new(zip_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_artifact = entry
            .file_name()
            .to_str()
            .and_then(ArtifactName::parse)
            .is_some();
        if is_artifact {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

/// Persist a chunk archive at its canonical path.
pub fn write_artifact(zip_dir: &Path, chunk: &Chunk, blob: &[u8]) -> Result<PathBuf> {
    let path = artifact_path(zip_dir, chunk);
    write_atomic(&path, blob)?;
    Ok(path)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(PARTIAL_SUFFIX);
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

/// Result of writing one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    /// Identical content was already stored; nothing was written.
    Unchanged,
}

/// JSON record files keyed by `(date, entry name)`.
#[derive(Debug, Clone)]
pub struct RecordStore {
    json_dir: PathBuf,
}

impl RecordStore {
    pub fn new(json_dir: impl Into<PathBuf>) -> Self {
        Self {
            json_dir: json_dir.into(),
        }
    }

    pub fn record_path(&self, record: &DocumentRecord, entry_name: &str) -> PathBuf {
        self.json_dir
            .join(record.date.format("%Y-%m-%d").to_string())
            .join(format!("{}.json", flatten_entry_name(entry_name)))
    }

    pub fn write(&self, record: &DocumentRecord, entry_name: &str) -> Result<WriteOutcome> {
        let path = self.record_path(record, entry_name);
        let json = serde_json::to_string_pretty(record)?;

        let outcome = match std::fs::read(&path) {
            Ok(existing) if existing == json.as_bytes() => return Ok(WriteOutcome::Unchanged),
            Ok(_) => WriteOutcome::Updated,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => WriteOutcome::Created,
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };

        write_atomic(&path, json.as_bytes())?;
        Ok(outcome)
    }
}

/// Entry names become file names; nested entries are flattened.
fn flatten_entry_name(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}
