//! Resume state report and chunk plan preview.
//!
//! `harvest status` shows, for each planned window, what the next
//! collection run would do with it, computed from the artifact tree alone.
//! `harvest plan` prints the ranges the cap extension would request for a
//! window holding a given number of results.

use std::path::Path;

use anyhow::Result;
use archive_harvest_core::chunk::{needs_backward, plan_chunks, Chunk, Direction};
use archive_harvest_core::resume::{classify, WindowState};
use archive_harvest_core::window::{plan_windows, Window};
use serde::Serialize;

use crate::config::Config;
use crate::storage;

#[derive(Debug, Clone, Serialize)]
pub struct WindowStatus {
    pub window: String,
    pub state: WindowState,
    pub forward_artifacts: usize,
    pub backward_artifacts: usize,
}

pub fn window_statuses(zip_dir: &Path, windows: &[Window]) -> Result<Vec<WindowStatus>> {
    windows
        .iter()
        .map(|&window| {
            let artifacts = storage::list_artifacts(zip_dir, window)?;
            let backward = artifacts
                .iter()
                .filter(|a| a.direction == Direction::Backward)
                .count();
            Ok(WindowStatus {
                window: window.label(),
                state: classify(&artifacts),
                forward_artifacts: artifacts.len() - backward,
                backward_artifacts: backward,
            })
        })
        .collect()
}

pub fn run_status(config: &Config, json: bool) -> Result<()> {
    let windows = plan_windows(config.collection.start_year, config.collection.end_year);
    let statuses = window_statuses(&config.storage.zip_dir(), &windows)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    if statuses.is_empty() {
        println!("No windows in [{}, {}).", config.collection.start_year, config.collection.end_year);
        return Ok(());
    }

    println!("{:<9} {:<15} {:>8} {:>9}", "WINDOW", "STATE", "FORWARD", "BACKWARD");
    for s in &statuses {
        println!(
            "{:<9} {:<15} {:>8} {:>9}",
            s.window,
            s.state.as_str(),
            s.forward_artifacts,
            s.backward_artifacts
        );
    }

    let count = |state: WindowState| statuses.iter().filter(|s| s.state == state).count();
    println!();
    println!(
        "{} windows: {} complete, {} capped forward, {} need work",
        statuses.len(),
        count(WindowState::Complete),
        count(WindowState::CappedForward),
        count(WindowState::NeedsWork)
    );
    Ok(())
}

/// Every chunk both passes would request for a window with `total` results.
pub fn plan_for_total(total: u32, backward: bool) -> Vec<Chunk> {
    // The window only labels the chunks here.
    let window = Window::new(2000, 1);
    let mut chunks = plan_chunks(window, Direction::Forward, total);
    if backward && needs_backward(total) {
        chunks.extend(plan_chunks(window, Direction::Backward, total));
    }
    chunks
}

pub fn run_plan(total: u32, backward: bool) {
    let chunks = plan_for_total(total, backward);
    for chunk in &chunks {
        let (lo, hi) = chunk.absolute_range(total);
        println!(
            "{:<8} {:<14} results {}-{}",
            chunk.direction.as_str(),
            chunk.file_name(),
            lo,
            hi
        );
    }

    let covered: u32 = chunks.iter().map(|c| c.width()).sum();
    println!();
    println!("{} chunks, {} of {} results reachable", chunks.len(), covered, total);
    if covered < total {
        let hint = if !backward && needs_backward(total) {
            " (enable backward extension to reach more)"
        } else {
            ""
        };
        println!("{} results beyond the retrieval cap{}", total - covered, hint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_reflect_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let zip = tmp.path();
        let done = Window::new(2020, 1);
        let capped = Window::new(2020, 2);

        storage::write_artifact(
            zip,
            &Chunk {
                window: done,
                direction: Direction::Forward,
                start: 1,
                end: 42,
            },
            b"z",
        )
        .unwrap();
        for c in plan_chunks(capped, Direction::Forward, 5000) {
            storage::write_artifact(zip, &c, b"z").unwrap();
        }

        let statuses =
            window_statuses(zip, &[done, capped, Window::new(2020, 3)]).unwrap();
        assert_eq!(statuses[0].state, WindowState::Complete);
        assert_eq!(statuses[1].state, WindowState::CappedForward);
        assert_eq!(statuses[1].forward_artifacts, 10);
        assert_eq!(statuses[2].state, WindowState::NeedsWork);
        assert_eq!(statuses[2].forward_artifacts, 0);
    }

    #[test]
    fn plan_covers_two_slices() {
        let chunks = plan_for_total(2500, true);
        assert_eq!(chunks.len(), 20);
        assert_eq!(chunks.iter().map(|c| c.width()).sum::<u32>(), 2000);
        assert_eq!(plan_for_total(2500, false).len(), 10);
        assert_eq!(plan_for_total(800, true).len(), 8);
    }
}
