//! Per-source telemetry rows.
//!
//! Exactly one SourceRun exists per `(phase, source, run_group)` after the
//! phase completes; success and failure alike. Rows are append-only and
//! feed the source-health scorer's rolling window.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hardstop_core::{Error, Result, RunGroupId, UtcTimestamp};

/// Which half of the pipeline produced the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    /// Fetching from the source.
    Fetch,
    /// Normalizing and correlating fetched items.
    Ingest,
}

/// Outcome of one phase for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceRunStatus {
    /// The phase completed.
    Success,
    /// The phase failed; `error` carries the reason.
    Failure,
}

/// Telemetry row for one `(phase, source, run_group)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRun {
    /// The run group this row belongs to.
    pub run_group_id: RunGroupId,
    /// Phase that produced the row.
    pub phase: RunPhase,
    /// Source id.
    pub source_id: String,
    /// Outcome.
    pub status: SourceRunStatus,
    /// HTTP status code, when applicable.
    pub status_code: Option<u16>,
    /// Error message, truncated to 1000 characters.
    pub error: Option<String>,
    /// Wall time in milliseconds.
    pub duration_ms: u64,
    /// Items fetched (FETCH phase).
    pub items_fetched: u64,
    /// New items stored after dedupe (FETCH phase).
    pub items_new: u64,
    /// Items processed (INGEST phase).
    pub items_processed: u64,
    /// Items suppressed (INGEST phase).
    pub items_suppressed: u64,
    /// Events created (INGEST phase).
    pub items_events_created: u64,
    /// Alerts created or updated (INGEST phase).
    pub items_alerts_touched: u64,
    /// Bytes downloaded (FETCH phase).
    pub bytes_downloaded: u64,
    /// Structured diagnostics.
    #[serde(default)]
    pub diagnostics: BTreeMap<String, Value>,
    /// When the row was recorded.
    pub run_at_utc: UtcTimestamp,
}

/// Maximum stored length of the `error` field.
pub const MAX_ERROR_LEN: usize = 1000;

impl SourceRun {
    /// Truncates the error message to [`MAX_ERROR_LEN`] characters.
    pub fn truncate_error(&mut self) {
        if let Some(error) = &mut self.error {
            if error.chars().count() > MAX_ERROR_LEN {
                *error = error.chars().take(MAX_ERROR_LEN).collect();
            }
        }
    }
}

/// Repository contract for source runs.
pub trait SourceRunStore {
    /// Appends a row, enforcing uniqueness per `(phase, source, run_group)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on a duplicate triple.
    fn append(&self, run: SourceRun) -> Result<()>;

    /// The most recent rows for a source and phase, newest first, capped at
    /// `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failures.
    fn recent(&self, source_id: &str, phase: RunPhase, limit: usize) -> Result<Vec<SourceRun>>;

    /// All rows of one run group, ordered by `(phase, source_id)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failures.
    fn for_group(&self, run_group_id: &RunGroupId) -> Result<Vec<SourceRun>>;

    /// Timestamp of the most recent successful FETCH for a source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failures.
    fn last_success_at(&self, source_id: &str) -> Result<Option<UtcTimestamp>>;
}

/// In-memory reference implementation of [`SourceRunStore`].
#[derive(Debug, Default)]
pub struct MemorySourceRunStore {
    rows: RwLock<Vec<SourceRun>>,
}

impl MemorySourceRunStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<SourceRun>>> {
        self.rows
            .read()
            .map_err(|_| Error::storage("source-run store lock poisoned"))
    }
}

impl SourceRunStore for MemorySourceRunStore {
    fn append(&self, mut run: SourceRun) -> Result<()> {
        run.truncate_error();
        let mut rows = self
            .rows
            .write()
            .map_err(|_| Error::storage("source-run store lock poisoned"))?;
        let duplicate = rows.iter().any(|r| {
            r.phase == run.phase
                && r.source_id == run.source_id
                && r.run_group_id == run.run_group_id
        });
        if duplicate {
            return Err(Error::storage(format!(
                "source run already recorded for ({:?}, {}, {})",
                run.phase, run.source_id, run.run_group_id
            )));
        }
        rows.push(run);
        Ok(())
    }

    fn recent(&self, source_id: &str, phase: RunPhase, limit: usize) -> Result<Vec<SourceRun>> {
        let rows = self.read()?;
        let mut hits: Vec<SourceRun> = rows
            .iter()
            .filter(|r| r.source_id == source_id && r.phase == phase)
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.run_at_utc.cmp(&a.run_at_utc));
        hits.truncate(limit);
        Ok(hits)
    }

    fn for_group(&self, run_group_id: &RunGroupId) -> Result<Vec<SourceRun>> {
        let rows = self.read()?;
        let mut hits: Vec<SourceRun> = rows
            .iter()
            .filter(|r| &r.run_group_id == run_group_id)
            .cloned()
            .collect();
        hits.sort_by(|a, b| (a.phase as u8, &a.source_id).cmp(&(b.phase as u8, &b.source_id)));
        Ok(hits)
    }

    fn last_success_at(&self, source_id: &str) -> Result<Option<UtcTimestamp>> {
        let rows = self.read()?;
        Ok(rows
            .iter()
            .filter(|r| {
                r.source_id == source_id
                    && r.phase == RunPhase::Fetch
                    && r.status == SourceRunStatus::Success
            })
            .map(|r| r.run_at_utc)
            .max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> UtcTimestamp {
        s.parse().unwrap_or_else(|e| panic!("bad test timestamp {s}: {e}"))
    }

    fn run(group: &str, phase: RunPhase, source: &str, status: SourceRunStatus, at: &str) -> SourceRun {
        SourceRun {
            run_group_id: RunGroupId::from(group),
            phase,
            source_id: source.into(),
            status,
            status_code: None,
            error: None,
            duration_ms: 10,
            items_fetched: 0,
            items_new: 0,
            items_processed: 0,
            items_suppressed: 0,
            items_events_created: 0,
            items_alerts_touched: 0,
            bytes_downloaded: 0,
            diagnostics: BTreeMap::new(),
            run_at_utc: ts(at),
        }
    }

    #[test]
    fn one_row_per_phase_source_group() {
        let store = MemorySourceRunStore::new();
        store
            .append(run("grp-1", RunPhase::Fetch, "nws", SourceRunStatus::Success, "2025-12-29T17:00:00Z"))
            .unwrap();
        // Same triple again is rejected.
        assert!(store
            .append(run("grp-1", RunPhase::Fetch, "nws", SourceRunStatus::Failure, "2025-12-29T17:00:01Z"))
            .is_err());
        // Different phase is fine.
        store
            .append(run("grp-1", RunPhase::Ingest, "nws", SourceRunStatus::Success, "2025-12-29T17:00:02Z"))
            .unwrap();
    }

    #[test]
    fn recent_is_newest_first_and_capped() {
        let store = MemorySourceRunStore::new();
        for (i, at) in ["2025-12-27T00:00:00Z", "2025-12-28T00:00:00Z", "2025-12-29T00:00:00Z"]
            .iter()
            .enumerate()
        {
            store
                .append(run(&format!("grp-{i}"), RunPhase::Fetch, "nws", SourceRunStatus::Success, at))
                .unwrap();
        }
        let recent = store.recent("nws", RunPhase::Fetch, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].run_at_utc, ts("2025-12-29T00:00:00Z"));
    }

    #[test]
    fn error_is_truncated_to_limit() {
        let store = MemorySourceRunStore::new();
        let mut r = run("grp-1", RunPhase::Fetch, "nws", SourceRunStatus::Failure, "2025-12-29T17:00:00Z");
        r.error = Some("x".repeat(2000));
        store.append(r).unwrap();
        let stored = store.recent("nws", RunPhase::Fetch, 1).unwrap();
        assert_eq!(stored[0].error.as_ref().map(String::len), Some(MAX_ERROR_LEN));
    }

    #[test]
    fn last_success_ignores_failures_and_ingest() {
        let store = MemorySourceRunStore::new();
        store
            .append(run("g1", RunPhase::Fetch, "nws", SourceRunStatus::Success, "2025-12-27T00:00:00Z"))
            .unwrap();
        store
            .append(run("g2", RunPhase::Fetch, "nws", SourceRunStatus::Failure, "2025-12-29T00:00:00Z"))
            .unwrap();
        store
            .append(run("g3", RunPhase::Ingest, "nws", SourceRunStatus::Success, "2025-12-30T00:00:00Z"))
            .unwrap();
        assert_eq!(
            store.last_success_at("nws").unwrap(),
            Some(ts("2025-12-27T00:00:00Z"))
        );
        assert_eq!(store.last_success_at("ghost").unwrap(), None);
    }
}
