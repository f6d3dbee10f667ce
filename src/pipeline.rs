//! The collection pipeline.
//!
//! Walks the planned windows in order and drives each one through
//!
//! ```text
//! Pending ──► Narrowing ──► Paging(Forward) ──► Paging(Backward) ──► Done
//!    │                         │   ▲
//!    │ complete                ▼   │
//!    └──────────► Done      Decoding
//! ```
//!
//! Every transition makes at most one fetcher call. `Pending` looks only at
//! the artifact tree, so finished windows never touch the session.
//!
//! The artifact is the checkpoint, so it is renamed into place only after
//! the chunk's records are written. A run killed in between leaves no
//! artifact and the chunk is fetched again. A chunk whose artifact already
//! exists is not fetched; it is re-decoded from disk, which rewrites any
//! record that is missing and leaves the others unchanged.
//!
//! Failure scope:
//!
//! | Failure | Effect |
//! |---------|--------|
//! | timeout | retried up to `collection.max_attempts` |
//! | narrowing failed | window aborted, run continues |
//! | chunk failed | chunk skipped, window continues |
//! | archive unreadable | reported, window continues |
//! | document undecodable or undated | document dropped |
//! | artifact tree unreadable or unwritable | window aborted, run continues |
//! | session error | session closed, run restarted from the failing window |

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{Context, Result};
use archive_harvest_core::chunk::{needs_backward, plan_chunks, Chunk, Direction};
use archive_harvest_core::resume::{classify, WindowState};
use archive_harvest_core::window::{plan_windows, Window};

use crate::archive::ArchiveDecoder;
use crate::config::Config;
use crate::fetcher::{FetchError, Fetcher};
use crate::archive::DecodeError;
use crate::process::{artifact_label, decode_chunk, report_decode, ChunkDecode};
use crate::progress::{HarvestEvent, ProgressReporter};
use crate::storage::{self, RecordStore};

/// Counters for one collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub windows_skipped: u64,
    pub windows_processed: u64,
    pub windows_aborted: u64,
    pub chunks_fetched: u64,
    pub chunks_skipped: u64,
    pub chunks_failed: u64,
    pub records_written: u64,
    pub records_unchanged: u64,
    pub documents_dropped: u64,
    pub session_restarts: u32,
}

/// Where a window is in its collection.
#[derive(Debug)]
enum WindowPhase {
    Pending,
    Narrowing {
        direction: Direction,
    },
    Paging {
        direction: Direction,
        total: u32,
        queue: VecDeque<Chunk>,
    },
    Decoding {
        direction: Direction,
        total: u32,
        queue: VecDeque<Chunk>,
        chunk: Chunk,
        payload: Payload,
    },
    Done,
}

/// Where the archive being decoded comes from.
#[derive(Debug)]
enum Payload {
    /// Just downloaded; the artifact is not written yet.
    Fetched(Vec<u8>),
    /// Already at its canonical path.
    Stored,
}

/// Why a window could not be finished.
enum Interrupt {
    /// The session is unusable; the run must restart.
    Session(FetchError),
    /// Local failure scoped to this window.
    Window(anyhow::Error),
}

impl From<anyhow::Error> for Interrupt {
    fn from(e: anyhow::Error) -> Self {
        Interrupt::Window(e)
    }
}

/// Run the pipeline over every window in `[start_year, end_year)`.
pub async fn run_collection(
    config: &Config,
    fetcher: &mut dyn Fetcher,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let windows = plan_windows(config.collection.start_year, config.collection.end_year);
    let mut collector = Collector::new(config, progress)?;
    let mut next = 0usize;

    loop {
        match collector.run_from(fetcher, &windows, &mut next).await {
            Ok(()) => {
                fetcher.close_session().await;
                return Ok(collector.summary);
            }
            Err(e) => {
                fetcher.close_session().await;
                let restarts = collector.summary.session_restarts;
                if restarts >= config.collection.session_retries {
                    return Err(anyhow::Error::new(e)
                        .context(format!("session failed after {} restart(s)", restarts)));
                }
                collector.summary.session_restarts += 1;
                let backoff = Duration::from_secs(config.collection.session_backoff_secs);
                tracing::warn!(
                    "session error: {}; restarting in {}s ({}/{})",
                    e,
                    backoff.as_secs(),
                    restarts + 1,
                    config.collection.session_retries
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

struct Collector<'a> {
    config: &'a Config,
    progress: &'a dyn ProgressReporter,
    decoder: ArchiveDecoder,
    store: RecordStore,
    summary: RunSummary,
}

impl<'a> Collector<'a> {
    fn new(config: &'a Config, progress: &'a dyn ProgressReporter) -> Result<Self> {
        Ok(Self {
            config,
            progress,
            decoder: ArchiveDecoder::new(&config.decode.skip_entries)?,
            store: RecordStore::new(config.storage.json_dir()),
            summary: RunSummary::default(),
        })
    }

    /// Collect windows starting at `*next`, advancing it past each finished
    /// window so a restart resumes where the session broke.
    async fn run_from(
        &mut self,
        fetcher: &mut dyn Fetcher,
        windows: &[Window],
        next: &mut usize,
    ) -> Result<(), FetchError> {
        let mut session_open = false;
        while let Some(&window) = windows.get(*next) {
            match self.collect_window(fetcher, window, &mut session_open).await {
                Ok(()) => {}
                Err(Interrupt::Session(e)) => return Err(e),
                Err(Interrupt::Window(e)) => self.abort_window(window, format!("{:#}", e)),
            }
            *next += 1;
        }
        Ok(())
    }

    fn abort_window(&mut self, window: Window, error: String) {
        tracing::warn!(window = %window, "window aborted: {}", error);
        self.summary.windows_aborted += 1;
        self.progress.report(HarvestEvent::WindowAborted {
            window: window.label(),
            error,
        });
    }

    async fn collect_window(
        &mut self,
        fetcher: &mut dyn Fetcher,
        window: Window,
        session_open: &mut bool,
    ) -> Result<(), Interrupt> {
        let mut phase = WindowPhase::Pending;
        loop {
            phase = match phase {
                WindowPhase::Pending => self.classify_window(window)?,
                WindowPhase::Narrowing { direction } => {
                    if !*session_open {
                        self.open_session(fetcher).await?;
                        *session_open = true;
                    }
                    self.narrow(fetcher, window, direction).await?
                }
                WindowPhase::Paging {
                    direction,
                    total,
                    queue,
                } => self.page(fetcher, window, direction, total, queue).await?,
                WindowPhase::Decoding {
                    direction,
                    total,
                    queue,
                    chunk,
                    payload,
                } => {
                    let fetched = matches!(payload, Payload::Fetched(_));
                    self.decode(&chunk, payload).await?;
                    if fetched && self.config.collection.chunk_delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(
                            self.config.collection.chunk_delay_ms,
                        ))
                        .await;
                    }
                    WindowPhase::Paging {
                        direction,
                        total,
                        queue,
                    }
                }
                WindowPhase::Done => return Ok(()),
            };
        }
    }

    /// Decide from the artifact tree alone what the window needs.
    fn classify_window(&mut self, window: Window) -> Result<WindowPhase> {
        let artifacts = storage::list_artifacts(&self.config.storage.zip_dir(), window)?;
        let state = classify(&artifacts);
        let label = window.label();
        tracing::debug!(window = %label, %state, artifacts = artifacts.len(), "classified");

        let next = match state {
            WindowState::Complete => return Ok(self.skip_window(label, "complete")),
            WindowState::CappedForward if !self.config.collection.backward => {
                return Ok(self.skip_window(
                    label,
                    "forward pass capped, backward extension disabled",
                ));
            }
            WindowState::CappedForward => WindowPhase::Narrowing {
                direction: Direction::Backward,
            },
            WindowState::NeedsWork => WindowPhase::Narrowing {
                direction: Direction::Forward,
            },
        };

        self.summary.windows_processed += 1;
        self.progress.report(HarvestEvent::WindowStarted {
            window: label,
            state,
        });
        Ok(next)
    }

    fn skip_window(&mut self, label: String, reason: &str) -> WindowPhase {
        tracing::debug!(window = %label, reason, "skipped");
        self.summary.windows_skipped += 1;
        self.progress.report(HarvestEvent::WindowSkipped {
            window: label,
            reason: reason.to_string(),
        });
        WindowPhase::Done
    }

    async fn open_session(&mut self, fetcher: &mut dyn Fetcher) -> Result<(), Interrupt> {
        let limit = self.config.fetcher.session_timeout();
        match tokio::time::timeout(limit, fetcher.open_session()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(FetchError::Session(msg))) | Ok(Err(FetchError::Failed(msg))) => {
                Err(Interrupt::Session(FetchError::Session(msg)))
            }
            Ok(Err(FetchError::Timeout(d))) => Err(Interrupt::Session(FetchError::Session(
                format!("opening the session timed out after {:?}", d),
            ))),
            Err(_) => Err(Interrupt::Session(FetchError::Session(format!(
                "opening the session timed out after {:?}",
                limit
            )))),
        }
    }

    async fn narrow(
        &mut self,
        fetcher: &mut dyn Fetcher,
        window: Window,
        direction: Direction,
    ) -> Result<WindowPhase, Interrupt> {
        let label = window.label();
        let total = match self.narrow_with_attempts(fetcher, window).await {
            Ok(total) => total,
            Err(e) if e.is_session() => return Err(Interrupt::Session(e)),
            Err(e) => {
                self.abort_window(window, format!("narrowing failed: {}", e));
                return Ok(WindowPhase::Done);
            }
        };

        let queue = self.plan(window, direction, total);
        tracing::info!(window = %label, total, %direction, chunks = queue.len(), "narrowed");
        self.progress.report(HarvestEvent::WindowNarrowed {
            window: label,
            total,
            chunks: queue.len(),
        });
        Ok(WindowPhase::Paging {
            direction,
            total,
            queue,
        })
    }

    fn plan(&self, window: Window, direction: Direction, total: u32) -> VecDeque<Chunk> {
        if direction == Direction::Backward && !needs_backward(total) {
            return VecDeque::new();
        }
        plan_chunks(window, direction, total).into()
    }

    async fn page(
        &mut self,
        fetcher: &mut dyn Fetcher,
        window: Window,
        direction: Direction,
        total: u32,
        mut queue: VecDeque<Chunk>,
    ) -> Result<WindowPhase, Interrupt> {
        let zip_dir = self.config.storage.zip_dir();

        let chunk = match queue.pop_front() {
            Some(chunk) => chunk,
            None => {
                let extend = direction == Direction::Forward
                    && self.config.collection.backward
                    && needs_backward(total);
                if !extend {
                    return Ok(WindowPhase::Done);
                }
                let queue = self.plan(window, Direction::Backward, total);
                tracing::info!(window = %window, chunks = queue.len(), "extending backward");
                return Ok(WindowPhase::Paging {
                    direction: Direction::Backward,
                    total,
                    queue,
                });
            }
        };

        let path = storage::artifact_path(&zip_dir, &chunk);
        let artifact = artifact_label(&self.config.storage.data_dir, &path);
        if path.exists() {
            tracing::debug!(artifact = %artifact, "already stored");
            self.summary.chunks_skipped += 1;
            return Ok(WindowPhase::Decoding {
                direction,
                total,
                queue,
                chunk,
                payload: Payload::Stored,
            });
        }

        self.progress.report(HarvestEvent::ChunkDownloading {
            artifact: artifact.clone(),
        });
        match self.fetch_with_attempts(fetcher, &chunk).await {
            Ok(blob) => Ok(WindowPhase::Decoding {
                direction,
                total,
                queue,
                chunk,
                payload: Payload::Fetched(blob),
            }),
            Err(e) if e.is_session() => Err(Interrupt::Session(e)),
            Err(e) => {
                tracing::warn!(artifact = %artifact, "chunk failed: {}", e);
                self.summary.chunks_failed += 1;
                self.progress.report(HarvestEvent::ChunkFailed {
                    artifact,
                    error: e.to_string(),
                });
                Ok(WindowPhase::Paging {
                    direction,
                    total,
                    queue,
                })
            }
        }
    }

    /// Decode one chunk and, for a fresh download, persist its artifact
    /// after the records.
    async fn decode(&mut self, chunk: &Chunk, payload: Payload) -> Result<()> {
        let zip_dir = self.config.storage.zip_dir();
        let path = storage::artifact_path(&zip_dir, chunk);
        let artifact = artifact_label(&self.config.storage.data_dir, &path);

        match payload {
            Payload::Fetched(blob) => {
                let (result, blob) = self.decode_blob(blob).await?;
                self.settle(&artifact, result.map_err(anyhow::Error::from));
                storage::write_artifact(&zip_dir, chunk, &blob)?;
                self.summary.chunks_fetched += 1;
                self.progress.report(HarvestEvent::ChunkStored { artifact });
            }
            Payload::Stored => {
                let result = match tokio::fs::read(&path).await {
                    Ok(blob) => self.decode_blob(blob).await?.0.map_err(anyhow::Error::from),
                    Err(e) => Err(anyhow::Error::new(e)
                        .context(format!("Failed to read {}", path.display()))),
                };
                self.settle(&artifact, result);
            }
        }
        Ok(())
    }

    async fn decode_blob(
        &self,
        blob: Vec<u8>,
    ) -> Result<(Result<ChunkDecode, DecodeError>, Vec<u8>)> {
        let decoder = self.decoder.clone();
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || (decode_chunk(&decoder, &store, &blob), blob))
            .await
            .context("decode task panicked")
    }

    fn settle(&mut self, artifact: &str, result: Result<ChunkDecode>) {
        match result {
            Ok(decoded) => self.absorb(artifact, &decoded),
            Err(e) => {
                tracing::warn!(artifact, "cannot decode: {:#}", e);
                self.progress.report(HarvestEvent::ArchiveFailed {
                    artifact: artifact.to_string(),
                    error: format!("{:#}", e),
                });
            }
        }
    }

    fn absorb(&mut self, artifact: &str, decoded: &ChunkDecode) {
        self.summary.records_written += decoded.written();
        self.summary.records_unchanged += decoded.unchanged;
        self.summary.documents_dropped += decoded.dropped.len() as u64;
        report_decode(self.progress, artifact, decoded);
    }

    async fn narrow_with_attempts(
        &self,
        fetcher: &mut dyn Fetcher,
        window: Window,
    ) -> Result<u32, FetchError> {
        let limit = self.config.fetcher.narrow_timeout();
        let mut last_err = None;
        for attempt in 0..self.config.collection.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(retry_delay(attempt)).await;
            }
            let err = match tokio::time::timeout(limit, fetcher.narrow_to_window(window)).await {
                Ok(Ok(total)) => return Ok(total),
                Ok(Err(e)) => e,
                Err(_) => FetchError::Timeout(limit),
            };
            if !err.is_retryable() {
                return Err(err);
            }
            tracing::debug!(window = %window, attempt = attempt + 1, "narrowing timed out");
            last_err = Some(err);
        }
        Err(last_err.unwrap_or(FetchError::Timeout(limit)))
    }

    async fn fetch_with_attempts(
        &self,
        fetcher: &mut dyn Fetcher,
        chunk: &Chunk,
    ) -> Result<Vec<u8>, FetchError> {
        let limit = self.config.fetcher.fetch_timeout();
        let mut last_err = None;
        for attempt in 0..self.config.collection.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(retry_delay(attempt)).await;
            }
            let err = match tokio::time::timeout(limit, fetcher.fetch_chunk(chunk)).await {
                Ok(Ok(blob)) => return Ok(blob),
                Ok(Err(e)) => e,
                Err(_) => FetchError::Timeout(limit),
            };
            if !err.is_retryable() {
                return Err(err);
            }
            tracing::debug!(
                window = %chunk.window,
                range = %chunk.range_label(),
                attempt = attempt + 1,
                "fetch timed out"
            );
            last_err = Some(err);
        }
        Err(last_err.unwrap_or(FetchError::Timeout(limit)))
    }
}

/// Backoff between attempts: 1s, 2s, 4s, ... capped at 32s.
fn retry_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}
