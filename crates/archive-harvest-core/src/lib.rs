//! # Archive Harvest Core
//!
//! Pure logic for archive-harvest: query window planning, cap extension,
//! resume classification, markup stripping, and record parsing.
//!
//! This crate performs no filesystem or network I/O. Everything here is
//! deterministic and can be exercised without a session, a runtime, or a
//! data directory.

pub mod chunk;
pub mod date;
pub mod record;
pub mod resume;
pub mod rtf;
pub mod window;
