//! Resume classification from stored artifacts.
//!
//! The artifact directory of a window is the only checkpoint: there is no
//! manifest and no job table. Before any session work is done for a window,
//! its existing artifact names are classified into a [`WindowState`].
//!
//! # Rules
//!
//! 1. Any artifact narrower than [`PAGE_SIZE`] is a terminal page, so the
//!    window was paged to its end: [`WindowState::Complete`].
//! 2. A forward artifact ending at [`RESULT_CAP`] together with a backward
//!    artifact ending at [`RESULT_CAP`] means both passes hit the cap;
//!    nothing more is retrievable: [`WindowState::Complete`].
//! 3. A forward artifact ending at [`RESULT_CAP`] with no backward artifact
//!    at all: [`WindowState::CappedForward`].
//! 4. Anything else, including no artifacts or a partial backward pass:
//!    [`WindowState::NeedsWork`].

use serde::Serialize;
use std::fmt;

use crate::chunk::{ArtifactName, Direction, PAGE_SIZE, RESULT_CAP};

/// What a window's stored artifacts say about the work left for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    /// Fully paged; skip without touching the session.
    Complete,
    /// The forward pass reached the cap and no backward pass has started.
    CappedForward,
    /// Fetching should start or resume.
    NeedsWork,
}

impl WindowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowState::Complete => "complete",
            WindowState::CappedForward => "capped_forward",
            WindowState::NeedsWork => "needs_work",
        }
    }
}

impl fmt::Display for WindowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a window from the names of the artifacts stored for it.
pub fn classify(artifacts: &[ArtifactName]) -> WindowState {
    if artifacts.iter().any(|a| a.width() != PAGE_SIZE) {
        return WindowState::Complete;
    }

    let capped = |direction: Direction| {
        artifacts
            .iter()
            .any(|a| a.direction == direction && a.end == RESULT_CAP)
    };
    let any_backward = artifacts.iter().any(|a| a.direction == Direction::Backward);

    if capped(Direction::Forward) {
        if capped(Direction::Backward) {
            return WindowState::Complete;
        }
        if !any_backward {
            return WindowState::CappedForward;
        }
    }

    WindowState::NeedsWork
}

/// Classify a window from raw file names, ignoring anything that is not an
/// artifact name.
pub fn classify_file_names<'a, I>(names: I) -> WindowState
where
    I: IntoIterator<Item = &'a str>,
{
    let parsed: Vec<ArtifactName> = names.into_iter().filter_map(ArtifactName::parse).collect();
    classify(&parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_artifacts_needs_work() {
        assert_eq!(classify(&[]), WindowState::NeedsWork);
    }

    #[test]
    fn full_page_without_terminal_needs_work() {
        assert_eq!(classify_file_names(["1-100.zip"]), WindowState::NeedsWork);
        assert_eq!(
            classify_file_names(["1-100.zip", "101-200.zip"]),
            WindowState::NeedsWork
        );
    }

    #[test]
    fn terminal_page_is_complete() {
        assert_eq!(classify_file_names(["1-47.zip"]), WindowState::Complete);
        assert_eq!(
            classify_file_names(["1-100.zip", "101-153.zip"]),
            WindowState::Complete
        );
        assert_eq!(classify_file_names(["101.zip"]), WindowState::Complete);
    }

    #[test]
    fn backward_terminal_page_is_complete() {
        assert_eq!(
            classify_file_names(["901-1000.zip", "B1-100.zip", "B101-137.zip"]),
            WindowState::Complete
        );
    }

    #[test]
    fn forward_cap_without_backward() {
        assert_eq!(
            classify_file_names(["801-900.zip", "901-1000.zip"]),
            WindowState::CappedForward
        );
    }

    #[test]
    fn partial_backward_pass_needs_work() {
        assert_eq!(
            classify_file_names(["901-1000.zip", "B1-100.zip"]),
            WindowState::NeedsWork
        );
    }

    #[test]
    fn both_passes_capped_is_complete() {
        assert_eq!(
            classify_file_names(["901-1000.zip", "B901-1000.zip"]),
            WindowState::Complete
        );
    }

    #[test]
    fn stray_files_are_ignored() {
        assert_eq!(
            classify_file_names(["1-100.zip", "101-200.zip.part", "notes.txt"]),
            WindowState::NeedsWork
        );
    }
}
