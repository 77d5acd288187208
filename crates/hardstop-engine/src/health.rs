//! Source health scoring.
//!
//! Computed on demand from SourceRun telemetry over a rolling window (last
//! 10 FETCH plus last 10 INGEST runs). The score starts at 100 and takes
//! fixed deductions; the band derives from the score. A source with no
//! history scores 30 and starts BLOCKED until its first successful run.
//! All arithmetic is integer so identical telemetry always produces the
//! identical score.

use serde::{Deserialize, Serialize};

use hardstop_core::{Result, UtcTimestamp};
use hardstop_store::{RunPhase, SourceRun, SourceRunStatus, SourceRunStore};

/// Rolling-window depth per phase.
const WINDOW_PER_PHASE: usize = 10;

/// A source's health band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BudgetState {
    /// Score ≥ 80.
    Healthy,
    /// 50 ≤ score < 80.
    Watch,
    /// Score < 50 (or no history yet).
    Blocked,
}

impl BudgetState {
    /// Derives the band from a clamped score.
    #[must_use]
    pub const fn from_score(score: i64) -> Self {
        if score >= 80 {
            Self::Healthy
        } else if score >= 50 {
            Self::Watch
        } else {
            Self::Blocked
        }
    }

    /// Stable SCREAMING_SNAKE_CASE name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Watch => "WATCH",
            Self::Blocked => "BLOCKED",
        }
    }
}

/// Derived health for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceHealth {
    /// Source id.
    pub source_id: String,
    /// Bounded score, `[0, 100]`.
    pub score: i64,
    /// Health band.
    pub budget_state: BudgetState,
    /// Hours since the last successful fetch, when one exists.
    pub stale_hours: Option<i64>,
    /// Consecutive FETCH failures, newest backwards.
    pub consecutive_failures: u64,
    /// Suppression ratio in integer percent.
    pub suppression_ratio_pct: i64,
    /// Deductions applied, in order.
    pub factors: Vec<String>,
}

/// The source-health operator.
#[derive(Debug)]
pub struct SourceHealthScorer {
    stale_threshold_hours: i64,
}

/// Operator identity recorded in RunRecords.
pub const OPERATOR_ID: &str = "source.health@1.0.0";

impl SourceHealthScorer {
    /// Creates a scorer with the given staleness threshold.
    #[must_use]
    pub const fn new(stale_threshold_hours: i64) -> Self {
        Self {
            stale_threshold_hours,
        }
    }

    /// Scores one source from its telemetry.
    ///
    /// # Errors
    ///
    /// Returns a storage error if telemetry cannot be read.
    pub fn score(
        &self,
        source_id: &str,
        runs: &dyn SourceRunStore,
        now: UtcTimestamp,
    ) -> Result<SourceHealth> {
        let fetch_runs = runs.recent(source_id, RunPhase::Fetch, WINDOW_PER_PHASE)?;
        let ingest_runs = runs.recent(source_id, RunPhase::Ingest, WINDOW_PER_PHASE)?;

        if fetch_runs.is_empty() && ingest_runs.is_empty() {
            return Ok(SourceHealth {
                source_id: source_id.to_owned(),
                score: 30,
                budget_state: BudgetState::Blocked,
                stale_hours: None,
                consecutive_failures: 0,
                suppression_ratio_pct: 0,
                factors: vec!["no_history".to_owned()],
            });
        }

        let mut score: i64 = 100;
        let mut factors = Vec::new();

        // −15 per recent fetch failure, capped at −45.
        let recent_failures = fetch_runs
            .iter()
            .filter(|r| r.status == SourceRunStatus::Failure)
            .count() as i64;
        if recent_failures > 0 {
            let deduction = (recent_failures * 15).min(45);
            score -= deduction;
            factors.push(format!("recent_failures={recent_failures} (-{deduction})"));
        }

        // −20 when stale beyond the threshold.
        let stale_hours = runs
            .last_success_at(source_id)?
            .map(|last| now.hours_since(&last));
        if let Some(hours) = stale_hours {
            if hours > self.stale_threshold_hours {
                score -= 20;
                factors.push(format!("stale={hours}h (-20)"));
            }
        }

        // −25 per 3 consecutive failures.
        let streak = consecutive_failures(&fetch_runs);
        let streak_deduction = (streak as i64 / 3) * 25;
        if streak_deduction > 0 {
            score -= streak_deduction;
            factors.push(format!("failure_streak={streak} (-{streak_deduction})"));
        }

        // −10 per 25% suppression ratio.
        let suppression_ratio_pct = suppression_ratio_pct(&ingest_runs);
        let suppression_deduction = (suppression_ratio_pct / 25) * 10;
        if suppression_deduction > 0 {
            score -= suppression_deduction;
            factors.push(format!(
                "suppression_ratio={suppression_ratio_pct}% (-{suppression_deduction})"
            ));
        }

        let score = score.clamp(0, 100);
        Ok(SourceHealth {
            source_id: source_id.to_owned(),
            score,
            budget_state: BudgetState::from_score(score),
            stale_hours,
            consecutive_failures: streak,
            suppression_ratio_pct,
            factors,
        })
    }
}

/// Counts consecutive failures from the newest run backwards. `runs` is
/// newest-first, as [`SourceRunStore::recent`] returns it.
fn consecutive_failures(runs: &[SourceRun]) -> u64 {
    runs.iter()
        .take_while(|r| r.status == SourceRunStatus::Failure)
        .count() as u64
}

/// Suppressed-over-processed across the ingest window, in integer percent.
fn suppression_ratio_pct(runs: &[SourceRun]) -> i64 {
    let suppressed: u64 = runs.iter().map(|r| r.items_suppressed).sum();
    let processed: u64 = runs.iter().map(|r| r.items_processed).sum();
    ((suppressed * 100) / processed.max(1)) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardstop_core::RunGroupId;
    use hardstop_store::MemorySourceRunStore;
    use std::collections::BTreeMap;

    fn ts(s: &str) -> UtcTimestamp {
        s.parse().unwrap_or_else(|e| panic!("bad test timestamp {s}: {e}"))
    }

    fn run(
        group: &str,
        phase: RunPhase,
        status: SourceRunStatus,
        at: &str,
        processed: u64,
        suppressed: u64,
    ) -> SourceRun {
        SourceRun {
            run_group_id: RunGroupId::from(group),
            phase,
            source_id: "nws_active_us".into(),
            status,
            status_code: None,
            error: None,
            duration_ms: 100,
            items_fetched: 5,
            items_new: 5,
            items_processed: processed,
            items_suppressed: suppressed,
            items_events_created: processed.saturating_sub(suppressed),
            items_alerts_touched: 0,
            bytes_downloaded: 1024,
            diagnostics: BTreeMap::new(),
            run_at_utc: ts(at),
        }
    }

    #[test]
    fn never_run_source_is_blocked_at_30() {
        let store = MemorySourceRunStore::new();
        let scorer = SourceHealthScorer::new(48);
        let health = scorer
            .score("brand_new_source", &store, ts("2025-12-29T17:00:00Z"))
            .unwrap();
        assert_eq!(health.score, 30);
        assert_eq!(health.budget_state, BudgetState::Blocked);
        assert_eq!(health.factors, ["no_history"]);
    }

    #[test]
    fn healthy_source_keeps_full_score() {
        let store = MemorySourceRunStore::new();
        store
            .append(run("g1", RunPhase::Fetch, SourceRunStatus::Success, "2025-12-29T16:00:00Z", 0, 0))
            .unwrap();
        store
            .append(run("g1", RunPhase::Ingest, SourceRunStatus::Success, "2025-12-29T16:01:00Z", 10, 0))
            .unwrap();

        let scorer = SourceHealthScorer::new(48);
        let health = scorer
            .score("nws_active_us", &store, ts("2025-12-29T17:00:00Z"))
            .unwrap();
        assert_eq!(health.score, 100);
        assert_eq!(health.budget_state, BudgetState::Healthy);
    }

    #[test]
    fn failure_deductions_cap_at_45() {
        let store = MemorySourceRunStore::new();
        for i in 0..5 {
            store
                .append(run(
                    &format!("g{i}"),
                    RunPhase::Fetch,
                    SourceRunStatus::Failure,
                    &format!("2025-12-2{i}T00:00:00Z"),
                    0,
                    0,
                ))
                .unwrap();
        }

        let scorer = SourceHealthScorer::new(48);
        let health = scorer
            .score("nws_active_us", &store, ts("2025-12-29T17:00:00Z"))
            .unwrap();
        // 100 − 45 (capped failures) − 25 (streak of 5 → one full triple);
        // no success history means no staleness deduction.
        assert_eq!(health.consecutive_failures, 5);
        assert_eq!(health.score, 30);
        assert_eq!(health.budget_state, BudgetState::Blocked);
    }

    #[test]
    fn staleness_deducts_20() {
        let store = MemorySourceRunStore::new();
        store
            .append(run("g1", RunPhase::Fetch, SourceRunStatus::Success, "2025-12-20T00:00:00Z", 0, 0))
            .unwrap();

        let scorer = SourceHealthScorer::new(48);
        let health = scorer
            .score("nws_active_us", &store, ts("2025-12-29T17:00:00Z"))
            .unwrap();
        assert_eq!(health.score, 80);
        assert!(health.stale_hours.unwrap() > 48);
        assert_eq!(health.budget_state, BudgetState::Healthy);
    }

    #[test]
    fn suppression_ratio_deducts_in_quarters() {
        let store = MemorySourceRunStore::new();
        store
            .append(run("g1", RunPhase::Fetch, SourceRunStatus::Success, "2025-12-29T16:00:00Z", 0, 0))
            .unwrap();
        // 6 of 10 suppressed → 60% → two full quarters → −20.
        store
            .append(run("g1", RunPhase::Ingest, SourceRunStatus::Success, "2025-12-29T16:01:00Z", 10, 6))
            .unwrap();

        let scorer = SourceHealthScorer::new(48);
        let health = scorer
            .score("nws_active_us", &store, ts("2025-12-29T17:00:00Z"))
            .unwrap();
        assert_eq!(health.suppression_ratio_pct, 60);
        assert_eq!(health.score, 80);
    }

    #[test]
    fn identical_telemetry_scores_identically() {
        let build = || {
            let store = MemorySourceRunStore::new();
            store
                .append(run("g1", RunPhase::Fetch, SourceRunStatus::Failure, "2025-12-29T16:00:00Z", 0, 0))
                .unwrap();
            store
                .append(run("g2", RunPhase::Fetch, SourceRunStatus::Success, "2025-12-28T16:00:00Z", 0, 0))
                .unwrap();
            let scorer = SourceHealthScorer::new(48);
            scorer
                .score("nws_active_us", &store, ts("2025-12-29T17:00:00Z"))
                .unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn band_edges() {
        assert_eq!(BudgetState::from_score(80), BudgetState::Healthy);
        assert_eq!(BudgetState::from_score(79), BudgetState::Watch);
        assert_eq!(BudgetState::from_score(50), BudgetState::Watch);
        assert_eq!(BudgetState::from_score(49), BudgetState::Blocked);
    }
}
