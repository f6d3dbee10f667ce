//! Chunk archive decoding.
//!
//! A chunk archive is a ZIP with one rich-text document per entry plus an
//! index entry listing the documents. Each document entry is decoded as
//! Latin-1, stripped of RTF markup, has its non-breaking spaces turned into
//! plain spaces, and is trimmed.
//!
//! An archive that cannot be opened fails as a whole. A single unreadable
//! entry fails on its own and the rest of the archive is still decoded.

use std::io::{Cursor, Read};

use anyhow::Result;
use archive_harvest_core::rtf::strip_rtf;
use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;

/// Maximum decompressed bytes read from a single entry (zip-bomb protection).
const MAX_ENTRY_BYTES: u64 = 32 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cannot open archive: {0}")]
    Archive(String),
    #[error("cannot read entry {name}: {reason}")]
    Entry { name: String, reason: String },
}

/// One document entry, decoded to normalized text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEntry {
    pub name: String,
    pub text: String,
}

/// Opens chunk archives and yields normalized document text.
#[derive(Debug, Clone)]
pub struct ArchiveDecoder {
    skip: GlobSet,
}

impl ArchiveDecoder {
    /// `skip_entries` are globs for entries that are not documents (the
    /// archive's own index).
    pub fn new(skip_entries: &[String]) -> Result<Self> {
        Ok(Self {
            skip: build_globset(skip_entries)?,
        })
    }

    pub fn is_skipped(&self, entry_name: &str) -> bool {
        self.skip.is_match(entry_name)
    }

    /// Raw bytes of every document entry, in archive order.
    pub fn raw_entries(
        &self,
        blob: &[u8],
    ) -> Result<Vec<Result<(String, Vec<u8>), DecodeError>>, DecodeError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(blob))
            .map_err(|e| DecodeError::Archive(e.to_string()))?;

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = match archive.by_index(i) {
                Ok(entry) => entry,
                Err(e) => {
                    entries.push(Err(DecodeError::Entry {
                        name: format!("#{}", i),
                        reason: e.to_string(),
                    }));
                    continue;
                }
            };
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            if self.is_skipped(&name) {
                continue;
            }
            entries.push(read_bounded(entry, &name).map(|bytes| (name, bytes)));
        }
        Ok(entries)
    }

    /// Decode every document entry to normalized text.
    pub fn decode(&self, blob: &[u8]) -> Result<Vec<Result<DecodedEntry, DecodeError>>, DecodeError> {
        Ok(self
            .raw_entries(blob)?
            .into_iter()
            .map(|entry| {
                entry.map(|(name, bytes)| DecodedEntry {
                    text: normalize_text(&bytes),
                    name,
                })
            })
            .collect())
    }
}

fn read_bounded<R: Read>(entry: R, name: &str) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    entry
        .take(MAX_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| DecodeError::Entry {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
    if out.len() as u64 >= MAX_ENTRY_BYTES {
        return Err(DecodeError::Entry {
            name: name.to_string(),
            reason: format!("exceeds size limit ({} bytes)", MAX_ENTRY_BYTES),
        });
    }
    Ok(out)
}

/// Latin-1 bytes of an RTF document to trimmed plain text.
pub fn normalize_text(bytes: &[u8]) -> String {
    let rtf: String = bytes.iter().map(|&b| char::from(b)).collect();
    strip_rtf(&rtf)
        .replace('\u{a0}', " ")
        .trim()
        .to_string()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
