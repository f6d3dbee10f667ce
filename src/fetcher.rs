//! The session collaborator that narrows queries and downloads chunks.
//!
//! The harvester never looks at the source's UI. It drives a [`Fetcher`]
//! through two operations, narrowing the active query to a window and
//! materializing one chunk archive, plus session open/close around a run.
//!
//! Every method takes `&mut self`: there is exactly one interactive session
//! and it cannot be shared, so the borrow checker enforces that fetcher
//! calls are serialized.
//!
//! # Implementing a fetcher
//!
//! ```rust
//! use async_trait::async_trait;
//! use archive_harvest::fetcher::{FetchError, Fetcher};
//! use archive_harvest_core::chunk::Chunk;
//! use archive_harvest_core::window::Window;
//!
//! struct EmptySource;
//!
//! #[async_trait]
//! impl Fetcher for EmptySource {
//!     async fn narrow_to_window(&mut self, _window: Window) -> Result<u32, FetchError> {
//!         Ok(0)
//!     }
//!
//!     async fn fetch_chunk(&mut self, chunk: &Chunk) -> Result<Vec<u8>, FetchError> {
//!         Err(FetchError::Failed(format!("nothing at {}", chunk.range_label())))
//!     }
//! }
//! ```

use archive_harvest_core::chunk::Chunk;
use archive_harvest_core::window::Window;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a [`Fetcher`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// Login or navigation failed; the session is unusable.
    #[error("session error: {0}")]
    Session(String),
    /// The operation did not finish in time. Retryable.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The operation failed; the session itself is still usable.
    #[error("{0}")]
    Failed(String),
}

impl FetchError {
    pub fn is_session(&self) -> bool {
        matches!(self, FetchError::Session(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}

/// One interactive session against the paginated source.
#[async_trait]
pub trait Fetcher: Send {
    /// Log in and prepare the search. Called once per run attempt.
    async fn open_session(&mut self) -> Result<(), FetchError> {
        Ok(())
    }

    /// Constrain the active query to `window` and return how many results
    /// it holds.
    async fn narrow_to_window(&mut self, window: Window) -> Result<u32, FetchError>;

    /// Download the archive for `chunk` under the query last narrowed to
    /// `chunk.window`, sorted according to `chunk.direction`.
    async fn fetch_chunk(&mut self, chunk: &Chunk) -> Result<Vec<u8>, FetchError>;

    /// Release the session. Must not fail; problems are only logged.
    async fn close_session(&mut self) {}
}
