//! Collection and decode progress reporting.
//!
//! Progress goes to **stderr** so stdout stays parseable for scripts. Every
//! line names the window or artifact it concerns, and every document
//! dropped for lacking a date is reported by name.

use archive_harvest_core::resume::WindowState;
use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug)]
pub enum HarvestEvent {
    /// A window is about to be classified and, if needed, narrowed.
    WindowStarted { window: String, state: WindowState },
    /// A window needs no session work in this run.
    WindowSkipped { window: String, reason: String },
    /// The query is narrowed to the window and holds `total` results.
    WindowNarrowed {
        window: String,
        total: u32,
        chunks: usize,
    },
    /// Narrowing failed; the run moves on to the next window.
    WindowAborted { window: String, error: String },
    ChunkDownloading { artifact: String },
    ChunkStored { artifact: String },
    /// The chunk was given up on; the window continues.
    ChunkFailed { artifact: String, error: String },
    /// An artifact was decoded into records.
    ArchiveDecoded {
        artifact: String,
        written: u64,
        unchanged: u64,
        dropped: u64,
    },
    ArchiveFailed { artifact: String, error: String },
    /// A document was not stored.
    DocumentDropped {
        artifact: String,
        entry: String,
        reason: String,
    },
    /// Offline processing: `n` of `total` artifacts decoded.
    Processing { n: u64, total: u64 },
}

/// Reports progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: HarvestEvent);
}

/// Human-friendly progress on stderr: `12:04:31 2020-03  downloading zip/2020-03/1-100.zip`.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: HarvestEvent) {
        let body = match &event {
            HarvestEvent::WindowStarted { window, state } => {
                format!("{}  {}", window, state)
            }
            HarvestEvent::WindowSkipped { window, reason } => {
                format!("{}  skipped ({})", window, reason)
            }
            HarvestEvent::WindowNarrowed {
                window,
                total,
                chunks,
            } => format!(
                "{}  {} results, {} chunks planned",
                window,
                format_number(*total as u64),
                chunks
            ),
            HarvestEvent::WindowAborted { window, error } => {
                format!("{}  aborted: {}", window, error)
            }
            HarvestEvent::ChunkDownloading { artifact } => format!("downloading {} ...", artifact),
            HarvestEvent::ChunkStored { artifact } => format!("stored {}", artifact),
            HarvestEvent::ChunkFailed { artifact, error } => {
                format!("failed {}: {}", artifact, error)
            }
            HarvestEvent::ArchiveDecoded {
                artifact,
                written,
                unchanged,
                dropped,
            } => format!(
                "decoded {}  {} written, {} unchanged, {} dropped",
                artifact, written, unchanged, dropped
            ),
            HarvestEvent::ArchiveFailed { artifact, error } => {
                format!("cannot decode {}: {}", artifact, error)
            }
            HarvestEvent::DocumentDropped {
                artifact,
                entry,
                reason,
            } => format!("dropped {} in {}: {}", entry, artifact, reason),
            HarvestEvent::Processing { n, total } => format!(
                "processing  {} / {} archives",
                format_number(*n),
                format_number(*total)
            ),
        };
        let line = format!("{} {}\n", chrono::Local::now().format("%H:%M:%S"), body);
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: HarvestEvent) {
        let obj = match &event {
            HarvestEvent::WindowStarted { window, state } => serde_json::json!({
                "event": "window_started", "window": window, "state": state.as_str()
            }),
            HarvestEvent::WindowSkipped { window, reason } => serde_json::json!({
                "event": "window_skipped", "window": window, "reason": reason
            }),
            HarvestEvent::WindowNarrowed {
                window,
                total,
                chunks,
            } => serde_json::json!({
                "event": "window_narrowed", "window": window, "total": total, "chunks": chunks
            }),
            HarvestEvent::WindowAborted { window, error } => serde_json::json!({
                "event": "window_aborted", "window": window, "error": error
            }),
            HarvestEvent::ChunkDownloading { artifact } => serde_json::json!({
                "event": "chunk_downloading", "artifact": artifact
            }),
            HarvestEvent::ChunkStored { artifact } => serde_json::json!({
                "event": "chunk_stored", "artifact": artifact
            }),
            HarvestEvent::ChunkFailed { artifact, error } => serde_json::json!({
                "event": "chunk_failed", "artifact": artifact, "error": error
            }),
            HarvestEvent::ArchiveDecoded {
                artifact,
                written,
                unchanged,
                dropped,
            } => serde_json::json!({
                "event": "archive_decoded",
                "artifact": artifact,
                "written": written,
                "unchanged": unchanged,
                "dropped": dropped
            }),
            HarvestEvent::ArchiveFailed { artifact, error } => serde_json::json!({
                "event": "archive_failed", "artifact": artifact, "error": error
            }),
            HarvestEvent::DocumentDropped {
                artifact,
                entry,
                reason,
            } => serde_json::json!({
                "event": "document_dropped", "artifact": artifact, "entry": entry, "reason": reason
            }),
            HarvestEvent::Processing { n, total } => serde_json::json!({
                "event": "processing", "n": n, "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: HarvestEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
