//! Snapshot retention: exponentially-decaying history under a size budget.
//!
//! The ideal time offset of the n-th snapshot (counting back from the
//! newest) is `n + r^n - 1` checkpoint intervals. Each pass deletes at
//! most one snapshot, the one whose removal minimizes the summed absolute
//! deviation of the survivors from those ideals; the caller repeats passes
//! until the directory fits the budget or the count reaches the floor.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SnapshotError;
use crate::store::list_snapshots;

/// Per-step spacing growth.
pub const RETENTION_DECAY: f64 = 1.1;

fn ideal_offset(n: usize) -> f64 {
    n as f64 + RETENTION_DECAY.powi(n as i32) - 1.0
}

/// Total deviation of `offsets` (in intervals, newest first) from the
/// ideal spacing.
fn deviation(offsets: &[f64]) -> f64 {
    offsets
        .iter()
        .enumerate()
        .map(|(n, off)| (off - ideal_offset(n)).abs())
        .sum()
}

/// Picks the snapshot whose removal best fits the ideal spacing.
///
/// `times` is sorted oldest first; the newest snapshot is never a
/// candidate. Returns an index into `times`, or `None` with fewer than
/// two snapshots.
pub fn select_victim(
    times: &[DateTime<Utc>],
    now: DateTime<Utc>,
    interval_secs: f64,
) -> Option<usize> {
    if times.len() < 2 {
        return None;
    }
    let interval = if interval_secs > 0.0 { interval_secs } else { 1.0 };
    // Offsets newest-first, in checkpoint intervals.
    let offsets: Vec<f64> = times
        .iter()
        .rev()
        .map(|t| (now - *t).num_milliseconds() as f64 / 1000.0 / interval)
        .collect();

    let mut best: Option<(usize, f64)> = None;
    // Skipping offset index 0 keeps the newest snapshot.
    for candidate in 1..offsets.len() {
        let remaining: Vec<f64> = offsets
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != candidate)
            .map(|(_, off)| *off)
            .collect();
        let score = deviation(&remaining);
        if best.map(|(_, s)| score < s).unwrap_or(true) {
            best = Some((candidate, score));
        }
    }
    // Offset index is newest-first; convert back to the oldest-first input.
    best.map(|(candidate, _)| times.len() - 1 - candidate)
}

/// Deletes snapshots until the directory fits `max_bytes` or only
/// `min_files` remain. Returns the deleted paths.
pub fn enforce_retention(
    dir: &Path,
    max_bytes: u64,
    min_files: usize,
    interval_secs: f64,
    now: DateTime<Utc>,
) -> Result<Vec<PathBuf>, SnapshotError> {
    let mut deleted = Vec::new();
    loop {
        let files = list_snapshots(dir)?;
        let total: u64 = files.iter().map(|f| f.size).sum();
        if total <= max_bytes || files.len() <= min_files.max(1) {
            return Ok(deleted);
        }
        let times: Vec<DateTime<Utc>> = files.iter().map(|f| f.time).collect();
        let victim = match select_victim(&times, now, interval_secs) {
            Some(i) => i,
            None => return Ok(deleted),
        };
        fs::remove_file(&files[victim].path)?;
        deleted.push(files[victim].path.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_ideal_offsets_grow() {
        assert_eq!(ideal_offset(0), 0.0);
        assert!(ideal_offset(1) > 1.0);
        assert!(ideal_offset(10) - ideal_offset(9) > ideal_offset(2) - ideal_offset(1));
    }

    #[test]
    fn test_select_victim_never_picks_newest() {
        let interval = 60.0;
        let times: Vec<DateTime<Utc>> = (0..6).map(|i| at(i * 60)).collect();
        let now = at(6 * 60);
        let victim = select_victim(&times, now, interval).unwrap();
        assert_ne!(victim, times.len() - 1);
    }

    #[test]
    fn test_select_victim_prefers_dense_old_region() {
        // Evenly spaced snapshots deviate most from the exponential ideal
        // in the middle-aged region; the chosen victim must not be one of
        // the two newest.
        let interval = 60.0;
        let times: Vec<DateTime<Utc>> = (0..10).map(|i| at(i * 60)).collect();
        let now = at(10 * 60);
        let victim = select_victim(&times, now, interval).unwrap();
        assert!(victim < times.len() - 2, "victim {} too new", victim);
    }

    #[test]
    fn test_too_few_snapshots() {
        assert_eq!(select_victim(&[at(0)], at(60), 60.0), None);
        assert_eq!(select_victim(&[], at(60), 60.0), None);
    }

    #[test]
    fn test_enforce_retention_respects_floor() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            let name = crate::store::snapshot_filename(at(i * 600));
            std::fs::write(dir.path().join(name), vec![0u8; 1000]).unwrap();
        }
        // Budget forces deletions but the floor keeps three files.
        let deleted = enforce_retention(dir.path(), 100, 3, 600.0, at(5 * 600)).unwrap();
        assert_eq!(deleted.len(), 2);
        assert_eq!(list_snapshots(dir.path()).unwrap().len(), 3);
    }

    #[test]
    fn test_enforce_retention_stops_under_budget() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..4 {
            let name = crate::store::snapshot_filename(at(i * 600));
            std::fs::write(dir.path().join(name), vec![0u8; 100]).unwrap();
        }
        let deleted = enforce_retention(dir.path(), 10_000, 0, 600.0, at(4 * 600)).unwrap();
        assert!(deleted.is_empty());
    }
}
