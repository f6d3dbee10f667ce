//! # Archive Harvest
//!
//! Resumable, month-by-month harvesting of a document archive that is only
//! reachable through an interactive, paginated search session capped at
//! 1000 results per query ordering.
//!
//! The query is narrowed to one calendar month at a time. Each month is
//! paged through in chunks of at most 100 results, each chunk downloaded as
//! a ZIP archive of rich-text documents. Months holding more than the cap
//! are optionally paged a second time in descending order. Every downloaded
//! archive is decoded immediately into one JSON record per document.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  narrow / fetch  ┌──────────────┐  zip/  ┌──────────────┐
//! │   Fetcher    │◀────────────────│   Pipeline    │──────▶│   Storage    │
//! │ (helper proc)│─────────────────▶│ window states │       │ zip/ + json/ │
//! └──────────────┘   count / blob   └──────┬───────┘       └──────▲───────┘
//!                                          │ decode                │ records
//!                                          ▼                       │
//!                                   ┌──────────────┐               │
//!                                   │ Archive +    │───────────────┘
//!                                   │ RecordParser │
//!                                   └──────────────┘
//! ```
//!
//! The artifact tree is the only checkpoint: a window or chunk whose
//! artifacts exist is never requested again.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`fetcher`] | The session collaborator trait |
//! | [`fetcher_command`] | Fetcher backed by a helper process |
//! | [`archive`] | Chunk archive decoding |
//! | [`storage`] | Artifact and record layout on disk |
//! | [`pipeline`] | Per-window collection state machine |
//! | [`process`] | Chunk decoding and offline re-processing |
//! | [`status`] | Resume report and chunk plan preview |
//! | [`progress`] | Progress reporting on stderr |
//!
//! Pure planning and parsing logic lives in `archive-harvest-core`.

pub mod archive;
pub mod config;
pub mod fetcher;
pub mod fetcher_command;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod status;
pub mod storage;
