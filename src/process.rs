//! Decoding chunk archives into records.
//!
//! [`decode_chunk`] turns one archive into JSON records and is used both
//! right after a chunk is downloaded and by [`process_all`], which re-decodes
//! every stored artifact. Record writes are idempotent, so re-processing is
//! always safe.
//!
//! Failures are isolated per document: an unreadable entry, a structurally
//! broken document, an unresolvable date, or a failed record write drops
//! that one document and the rest of the archive is still processed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use archive_harvest_core::record::parse_document;
use tokio::task::JoinSet;

use crate::archive::{ArchiveDecoder, DecodeError};
use crate::config::Config;
use crate::progress::{HarvestEvent, ProgressReporter};
use crate::storage::{self, RecordStore, WriteOutcome};

/// A document that was not stored, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedDocument {
    pub entry: String,
    pub reason: String,
}

/// Outcome of decoding one chunk archive.
#[derive(Debug, Clone, Default)]
pub struct ChunkDecode {
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub dropped: Vec<DroppedDocument>,
}

impl ChunkDecode {
    pub fn written(&self) -> u64 {
        self.created + self.updated
    }
}

/// Decode every document entry of `blob` and store the resulting records.
///
/// Only an archive that cannot be opened is an error.
pub fn decode_chunk(
    decoder: &ArchiveDecoder,
    store: &RecordStore,
    blob: &[u8],
) -> Result<ChunkDecode, DecodeError> {
    let mut out = ChunkDecode::default();

    for entry in decoder.decode(blob)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let name = match &e {
                    DecodeError::Entry { name, .. } => name.clone(),
                    DecodeError::Archive(_) => String::new(),
                };
                out.dropped.push(DroppedDocument {
                    entry: name,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let record = match parse_document(&entry.text).and_then(|doc| doc.resolve()) {
            Ok(record) => record,
            Err(e) => {
                out.dropped.push(DroppedDocument {
                    entry: entry.name,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        match store.write(&record, &entry.name) {
            Ok(WriteOutcome::Created) => out.created += 1,
            Ok(WriteOutcome::Updated) => out.updated += 1,
            Ok(WriteOutcome::Unchanged) => out.unchanged += 1,
            Err(e) => {
                tracing::error!(entry = %entry.name, "record write failed: {:#}", e);
                out.dropped.push(DroppedDocument {
                    entry: entry.name,
                    reason: format!("cannot write record: {:#}", e),
                });
            }
        }
    }

    Ok(out)
}

/// Emit progress for one decoded archive.
pub fn report_decode(progress: &dyn ProgressReporter, artifact: &str, decoded: &ChunkDecode) {
    for dropped in &decoded.dropped {
        tracing::warn!(artifact, entry = %dropped.entry, "dropped document: {}", dropped.reason);
        progress.report(HarvestEvent::DocumentDropped {
            artifact: artifact.to_string(),
            entry: dropped.entry.clone(),
            reason: dropped.reason.clone(),
        });
    }
    progress.report(HarvestEvent::ArchiveDecoded {
        artifact: artifact.to_string(),
        written: decoded.written(),
        unchanged: decoded.unchanged,
        dropped: decoded.dropped.len() as u64,
    });
}

/// Totals for an offline processing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub archives: u64,
    pub failed_archives: u64,
    pub written: u64,
    pub unchanged: u64,
    pub dropped: u64,
}

/// Re-decode every stored artifact, `decode.workers` archives at a time.
pub async fn process_all(config: &Config, progress: &dyn ProgressReporter) -> Result<ProcessSummary> {
    let data_dir = config.storage.data_dir.clone();
    let paths = storage::all_artifacts(&config.storage.zip_dir())?;
    let decoder = ArchiveDecoder::new(&config.decode.skip_entries)?;
    let store = RecordStore::new(config.storage.json_dir());
    let workers = config.decode.workers.max(1);
    let total = paths.len() as u64;

    let mut summary = ProcessSummary::default();
    let mut tasks: JoinSet<(PathBuf, Result<ChunkDecode>)> = JoinSet::new();

    for path in paths {
        while tasks.len() >= workers {
            if let Some(joined) = tasks.join_next().await {
                let (path, result) = joined.context("decode worker panicked")?;
                absorb(&mut summary, progress, &data_dir, &path, result, total);
            }
        }
        let decoder = decoder.clone();
        let store = store.clone();
        tasks.spawn_blocking(move || {
            let result = decode_file(&decoder, &store, &path);
            (path, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (path, result) = joined.context("decode worker panicked")?;
        absorb(&mut summary, progress, &data_dir, &path, result, total);
    }

    Ok(summary)
}

fn decode_file(decoder: &ArchiveDecoder, store: &RecordStore, path: &Path) -> Result<ChunkDecode> {
    let blob =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(decode_chunk(decoder, store, &blob)?)
}

fn absorb(
    summary: &mut ProcessSummary,
    progress: &dyn ProgressReporter,
    data_dir: &Path,
    path: &Path,
    result: Result<ChunkDecode>,
    total: u64,
) {
    let artifact = artifact_label(data_dir, path);
    summary.archives += 1;
    match result {
        Ok(decoded) => {
            summary.written += decoded.written();
            summary.unchanged += decoded.unchanged;
            summary.dropped += decoded.dropped.len() as u64;
            report_decode(progress, &artifact, &decoded);
        }
        Err(e) => {
            summary.failed_archives += 1;
            tracing::warn!(artifact = %artifact, "cannot decode: {:#}", e);
            progress.report(HarvestEvent::ArchiveFailed {
                artifact,
                error: format!("{:#}", e),
            });
        }
    }
    progress.report(HarvestEvent::Processing {
        n: summary.archives,
        total,
    });
}

/// Path of an artifact relative to the data directory, for display.
pub fn artifact_label(data_dir: &Path, path: &Path) -> String {
    path.strip_prefix(data_dir)
        .unwrap_or(path)
        .display()
        .to_string()
}
