//! Chunk planning and artifact naming.
//!
//! The source only exposes results in page chunks of at most [`PAGE_SIZE`]
//! positions and refuses to page past [`RESULT_CAP`] positions for any one
//! ordering. A window with more results is covered by two passes:
//!
//! 1. **Forward**: ascending by date, positions `1..=min(N, 1000)`.
//! 2. **Backward**: descending by date, positions
//!    `1..=min(N - 1000, 1000)` of the reversed order, i.e. the tail the
//!    forward pass could not reach.
//!
//! Backward artifacts carry a `B` prefix, so the two passes never collide on
//! disk. Together they cover up to `min(N, 2000)` results; anything beyond
//! that is not retrievable under this policy.
//!
//! # Artifact names
//!
//! | Chunk | File name |
//! |-------|-----------|
//! | forward 1–100 | `1-100.zip` |
//! | forward, window with one result | `1.zip` |
//! | backward 1–100 | `B1-100.zip` |
//! | backward single position 7 | `B7.zip` |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::window::Window;

/// Maximum result positions in one chunk download.
pub const PAGE_SIZE: u32 = 100;

/// Maximum result positions retrievable for one query ordering.
pub const RESULT_CAP: u32 = 1000;

const ARTIFACT_EXT: &str = ".zip";
const BACKWARD_PREFIX: char = 'B';

/// Result ordering used for a pass over a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Ascending by date, paged from the oldest result.
    Forward,
    /// Descending by date, paged from the newest result.
    Backward,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `(direction, start, end)` part of an artifact's identity, as encoded
/// in its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArtifactName {
    pub direction: Direction,
    pub start: u32,
    pub end: u32,
}

impl ArtifactName {
    /// Parse a file name such as `B101-200.zip`. Anything that is not a
    /// well-formed artifact name (partial downloads, stray files) is `None`.
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(ARTIFACT_EXT)?;
        let (direction, range) = match stem.strip_prefix(BACKWARD_PREFIX) {
            Some(rest) => (Direction::Backward, rest),
            None => (Direction::Forward, stem),
        };
        let (start, end) = match range.split_once('-') {
            Some((a, b)) => (parse_position(a)?, parse_position(b)?),
            None => {
                let p = parse_position(range)?;
                (p, p)
            }
        };
        if start > end {
            return None;
        }
        Some(Self {
            direction,
            start,
            end,
        })
    }

    /// Number of result positions covered.
    pub fn width(&self) -> u32 {
        self.end - self.start + 1
    }

    /// The range as the source expects it: `1-100`, or `7` for a single
    /// position.
    pub fn range_label(&self) -> String {
        if self.start == self.end {
            self.start.to_string()
        } else {
            format!("{}-{}", self.start, self.end)
        }
    }

    pub fn file_name(&self) -> String {
        let prefix = match self.direction {
            Direction::Forward => "",
            Direction::Backward => "B",
        };
        format!("{}{}{}", prefix, self.range_label(), ARTIFACT_EXT)
    }
}

fn parse_position(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok().filter(|p| *p > 0)
}

/// One contiguous range of result positions requested as a single archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chunk {
    pub window: Window,
    pub direction: Direction,
    /// First position, 1-based, in the ordering of `direction`.
    pub start: u32,
    /// Last position, inclusive.
    pub end: u32,
}

impl Chunk {
    pub fn name(&self) -> ArtifactName {
        ArtifactName {
            direction: self.direction,
            start: self.start,
            end: self.end,
        }
    }

    pub fn width(&self) -> u32 {
        self.name().width()
    }

    pub fn range_label(&self) -> String {
        self.name().range_label()
    }

    pub fn file_name(&self) -> String {
        self.name().file_name()
    }

    /// Ascending result positions this chunk covers in a window of `total`
    /// results. Backward positions count from the newest result, so
    /// position `p` is ascending position `total - p + 1`.
    pub fn absolute_range(&self, total: u32) -> (u32, u32) {
        match self.direction {
            Direction::Forward => (self.start, self.end),
            Direction::Backward => (
                total.saturating_sub(self.end) + 1,
                total.saturating_sub(self.start) + 1,
            ),
        }
    }
}

/// Plan the chunks for one pass over a window holding `total` results.
///
/// Forward covers `1..=min(total, 1000)`. Backward only applies when the
/// forward pass was capped and covers `1..=min(total - 1000, 1000)` of the
/// descending order. Every chunk is at most [`PAGE_SIZE`] wide; only the last
/// one may be narrower.
pub fn plan_chunks(window: Window, direction: Direction, total: u32) -> Vec<Chunk> {
    let reachable = match direction {
        Direction::Forward => total,
        Direction::Backward => total.saturating_sub(RESULT_CAP),
    };
    let limit = reachable.min(RESULT_CAP);
    (0..limit)
        .step_by(PAGE_SIZE as usize)
        .map(|offset| Chunk {
            window,
            direction,
            start: offset + 1,
            end: (offset + PAGE_SIZE).min(reachable),
        })
        .collect()
}

/// Whether a window with `total` results needs a backward pass at all.
pub fn needs_backward(total: u32) -> bool {
    total > RESULT_CAP
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w() -> Window {
        Window::new(2020, 1)
    }

    #[test]
    fn forward_capped_at_ten_chunks() {
        let chunks = plan_chunks(w(), Direction::Forward, 2500);
        assert_eq!(chunks.len(), 10);
        assert_eq!(chunks[0].file_name(), "1-100.zip");
        assert_eq!(chunks[9].file_name(), "901-1000.zip");
        assert!(chunks.iter().all(|c| c.width() == PAGE_SIZE));
    }

    #[test]
    fn backward_covers_tail_without_colliding() {
        let forward = plan_chunks(w(), Direction::Forward, 2500);
        let backward = plan_chunks(w(), Direction::Backward, 2500);
        assert_eq!(backward.len(), 10);
        assert_eq!(backward[0].file_name(), "B1-100.zip");
        assert_eq!(backward[9].file_name(), "B901-1000.zip");
        for b in &backward {
            assert!(forward.iter().all(|f| f.file_name() != b.file_name()));
        }
    }

    #[test]
    fn backward_stops_at_remaining_results() {
        let backward = plan_chunks(w(), Direction::Backward, 1234);
        let names: Vec<String> = backward.iter().map(|c| c.file_name()).collect();
        assert_eq!(names, vec!["B1-100.zip", "B101-200.zip", "B201-234.zip"]);
    }

    #[test]
    fn backward_absolute_positions_follow_forward_cap() {
        let backward = plan_chunks(w(), Direction::Backward, 1234);
        // Newest 100 results, then the next 100, down to position 1001.
        assert_eq!(backward[0].absolute_range(1234), (1135, 1234));
        assert_eq!(backward[2].absolute_range(1234), (1001, 1034));
    }

    #[test]
    fn no_backward_when_under_cap() {
        assert!(plan_chunks(w(), Direction::Backward, 1000).is_empty());
        assert!(plan_chunks(w(), Direction::Backward, 10).is_empty());
        assert!(!needs_backward(1000));
        assert!(needs_backward(1001));
    }

    #[test]
    fn small_window_single_terminal_chunk() {
        let chunks = plan_chunks(w(), Direction::Forward, 47);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].file_name(), "1-47.zip");
    }

    #[test]
    fn single_position_ranges_omit_dash() {
        let chunks = plan_chunks(w(), Direction::Forward, 101);
        assert_eq!(chunks[1].range_label(), "101");
        assert_eq!(chunks[1].file_name(), "101.zip");
        let backward = plan_chunks(w(), Direction::Backward, 1001);
        assert_eq!(backward[0].file_name(), "B1.zip");
    }

    #[test]
    fn empty_window_has_no_chunks() {
        assert!(plan_chunks(w(), Direction::Forward, 0).is_empty());
    }

    #[test]
    fn parse_artifact_names() {
        let n = ArtifactName::parse("B101-200.zip").unwrap();
        assert_eq!(n.direction, Direction::Backward);
        assert_eq!((n.start, n.end), (101, 200));
        assert_eq!(n.width(), 100);

        let single = ArtifactName::parse("7.zip").unwrap();
        assert_eq!((single.start, single.end), (7, 7));
        assert_eq!(single.width(), 1);

        assert_eq!(ArtifactName::parse("1-100.zip.part"), None);
        assert_eq!(ArtifactName::parse("200-100.zip"), None);
        assert_eq!(ArtifactName::parse("x1-100.zip"), None);
        assert_eq!(ArtifactName::parse("0-99.zip"), None);
        assert_eq!(ArtifactName::parse("1--100.zip"), None);
    }

    #[test]
    fn planned_names_parse_back() {
        for c in plan_chunks(w(), Direction::Backward, 1750) {
            assert_eq!(ArtifactName::parse(&c.file_name()), Some(c.name()));
        }
    }
}
