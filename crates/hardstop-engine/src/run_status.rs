//! The run-status evaluator.
//!
//! Folds fetch outcomes, ingest telemetry, config findings, schema state,
//! staleness, and budget states into an exit code. Broken rules are
//! evaluated top to bottom and the first match wins; warning rules
//! accumulate. Strict mode promotes any warning to broken. Messages are
//! deterministically ordered; rule precedence first, then source id.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fetch::FetchOutcome;
use crate::health::BudgetState;
use hardstop_store::{SourceRun, SourceRunStatus};

/// The user-visible outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Exit code 0.
    Healthy,
    /// Exit code 1.
    Warning,
    /// Exit code 2.
    Broken,
}

impl RunStatus {
    /// The process exit code for this status.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Healthy => 0,
            Self::Warning => 1,
            Self::Broken => 2,
        }
    }
}

/// Everything the evaluator looks at.
#[derive(Debug, Clone, Default)]
pub struct StatusFindings {
    /// Fatal config parse error, when one occurred.
    pub config_error: Option<String>,
    /// Schema drift description, when detected.
    pub schema_drift: Option<String>,
    /// Number of enabled sources in the resolved config.
    pub enabled_source_count: usize,
    /// Per-source fetch outcomes.
    pub fetch: Vec<FetchOutcome>,
    /// INGEST telemetry rows; `None` when the ingest phase never ran.
    pub ingest_runs: Option<Vec<SourceRun>>,
    /// Sources with no successful fetch inside the stale threshold.
    pub stale_sources: Vec<String>,
    /// The stale threshold the list was computed against.
    pub stale_threshold_hours: i64,
    /// Per-source budget states.
    pub budget_states: BTreeMap<String, BudgetState>,
    /// Duplicate suppression rule ids (loaded but flagged).
    pub suppression_duplicate_ids: Vec<String>,
}

/// Evaluates findings into `(status, ordered_messages)`.
#[must_use]
pub fn evaluate_run_status(findings: &StatusFindings, strict: bool) -> (RunStatus, Vec<String>) {
    // Broken rules, in precedence order; first match wins.
    if let Some(error) = &findings.config_error {
        return (RunStatus::Broken, vec![format!("Config error: {error}")]);
    }
    if let Some(drift) = &findings.schema_drift {
        return (RunStatus::Broken, vec![format!("Schema drift: {drift}")]);
    }
    if findings.enabled_source_count == 0 {
        return (RunStatus::Broken, vec!["No enabled sources configured".to_owned()]);
    }

    let failed: Vec<&FetchOutcome> = findings.fetch.iter().filter(|f| !f.success).collect();
    let succeeded = findings.fetch.iter().filter(|f| f.success).count();
    if !findings.fetch.is_empty() && succeeded == 0 {
        let mut messages = vec![format!("{} source(s) failed to fetch", failed.len())];
        messages.extend(sorted_source_lines(&failed));
        return (RunStatus::Broken, messages);
    }

    if let Some(ingest_runs) = &findings.ingest_runs {
        let had_items = findings.fetch.iter().any(|f| f.success && !f.items.is_empty());
        if had_items && ingest_runs.is_empty() {
            return (
                RunStatus::Broken,
                vec!["Ingest halted before processing any source".to_owned()],
            );
        }
    }

    let blocked: Vec<&String> = findings
        .budget_states
        .iter()
        .filter(|(_, state)| **state == BudgetState::Blocked)
        .map(|(id, _)| id)
        .collect();
    if !blocked.is_empty() {
        let mut messages = vec![format!(
            "{} source(s) exhausted their failure budget",
            blocked.len()
        )];
        messages.extend(blocked.iter().map(|id| format!("  {id}: BLOCKED")));
        return (RunStatus::Broken, messages);
    }

    // Warning rules accumulate in precedence order.
    let mut warnings: Vec<String> = Vec::new();

    if !failed.is_empty() {
        warnings.push(format!("{} source(s) failed to fetch", failed.len()));
        warnings.extend(sorted_source_lines(&failed));
    }

    if !findings.stale_sources.is_empty() {
        let mut stale = findings.stale_sources.clone();
        stale.sort();
        warnings.push(format!(
            "{} source(s) stale (no success in {}h)",
            stale.len(),
            findings.stale_threshold_hours
        ));
        warnings.extend(stale.iter().map(|id| format!("  {id}: stale")));
    }

    let watch: Vec<&String> = findings
        .budget_states
        .iter()
        .filter(|(_, state)| **state == BudgetState::Watch)
        .map(|(id, _)| id)
        .collect();
    if !watch.is_empty() {
        warnings.push(format!("{} source(s) near their failure budget", watch.len()));
        warnings.extend(watch.iter().map(|id| format!("  {id}: WATCH")));
    }

    if !findings.suppression_duplicate_ids.is_empty() {
        warnings.push(format!(
            "Suppression config has duplicate rule ids: {}",
            findings.suppression_duplicate_ids.join(", ")
        ));
    }

    if let Some(ingest_runs) = &findings.ingest_runs {
        let mut failed_ingests: Vec<&SourceRun> = ingest_runs
            .iter()
            .filter(|r| r.status == SourceRunStatus::Failure)
            .collect();
        if !failed_ingests.is_empty() {
            failed_ingests.sort_by(|a, b| a.source_id.cmp(&b.source_id));
            warnings.push(format!(
                "{} source(s) failed during ingest",
                failed_ingests.len()
            ));
            warnings.extend(
                failed_ingests
                    .iter()
                    .map(|r| format!("  {}: {}", r.source_id, r.error.as_deref().unwrap_or("unknown error"))),
            );
        }
    }

    if warnings.is_empty() {
        return (RunStatus::Healthy, vec!["All systems healthy".to_owned()]);
    }

    let status = if strict { RunStatus::Broken } else { RunStatus::Warning };
    (status, warnings)
}

fn sorted_source_lines(failed: &[&FetchOutcome]) -> Vec<String> {
    let mut lines: Vec<String> = failed
        .iter()
        .map(|f| {
            let code = f
                .status_code
                .map_or_else(|| "-".to_owned(), |c| c.to_string());
            format!("  {}: status {code}", f.source_id)
        })
        .collect();
    lines.sort();
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardstop_core::{RunGroupId, UtcTimestamp};
    use hardstop_store::RunPhase;

    fn ts(s: &str) -> UtcTimestamp {
        s.parse().unwrap_or_else(|e| panic!("bad test timestamp {s}: {e}"))
    }

    fn ingest_run(source: &str, status: SourceRunStatus) -> SourceRun {
        SourceRun {
            run_group_id: RunGroupId::from("grp-1"),
            phase: RunPhase::Ingest,
            source_id: source.into(),
            status,
            status_code: None,
            error: match status {
                SourceRunStatus::Failure => Some("boom".into()),
                SourceRunStatus::Success => None,
            },
            duration_ms: 5,
            items_fetched: 0,
            items_new: 0,
            items_processed: 1,
            items_suppressed: 0,
            items_events_created: 1,
            items_alerts_touched: 1,
            bytes_downloaded: 0,
            diagnostics: std::collections::BTreeMap::new(),
            run_at_utc: ts("2025-12-29T17:00:00Z"),
        }
    }

    fn healthy_findings() -> StatusFindings {
        StatusFindings {
            enabled_source_count: 2,
            fetch: vec![
                FetchOutcome::success("a_src", vec![]),
                FetchOutcome::success("b_src", vec![]),
            ],
            ingest_runs: Some(vec![ingest_run("a_src", SourceRunStatus::Success)]),
            stale_threshold_hours: 48,
            ..StatusFindings::default()
        }
    }

    #[test]
    fn healthy_run_exits_zero() {
        let (status, messages) = evaluate_run_status(&healthy_findings(), false);
        assert_eq!(status, RunStatus::Healthy);
        assert_eq!(status.exit_code(), 0);
        assert_eq!(messages, ["All systems healthy"]);
    }

    #[test]
    fn config_error_wins_over_everything() {
        let mut findings = healthy_findings();
        findings.config_error = Some("bad yaml at line 3".into());
        findings.schema_drift = Some("alerts.correlation_key missing".into());

        let (status, messages) = evaluate_run_status(&findings, false);
        assert_eq!(status, RunStatus::Broken);
        assert_eq!(messages[0], "Config error: bad yaml at line 3");
    }

    #[test]
    fn zero_enabled_sources_is_broken() {
        let findings = StatusFindings {
            enabled_source_count: 0,
            ..StatusFindings::default()
        };
        let (status, _) = evaluate_run_status(&findings, false);
        assert_eq!(status, RunStatus::Broken);
    }

    #[test]
    fn all_sources_failing_is_broken_with_leading_count() {
        let findings = StatusFindings {
            enabled_source_count: 6,
            fetch: (0..6)
                .map(|i| FetchOutcome::failure(format!("src_{i}"), Some(500), "HTTP 500"))
                .collect(),
            stale_threshold_hours: 48,
            ..StatusFindings::default()
        };
        let (status, messages) = evaluate_run_status(&findings, true);
        assert_eq!(status, RunStatus::Broken);
        assert_eq!(messages[0], "6 source(s) failed to fetch");
        // Per-source lines are sorted by source id.
        assert_eq!(messages[1], "  src_0: status 500");
    }

    #[test]
    fn clean_zero_fetch_keeps_all_failed_from_being_broken() {
        let findings = StatusFindings {
            enabled_source_count: 2,
            fetch: vec![
                FetchOutcome::failure("bad_src", Some(500), "HTTP 500"),
                FetchOutcome::success("quiet_src", vec![]),
            ],
            stale_threshold_hours: 48,
            ..StatusFindings::default()
        };
        let (status, messages) = evaluate_run_status(&findings, false);
        assert_eq!(status, RunStatus::Warning);
        assert_eq!(messages[0], "1 source(s) failed to fetch");
    }

    #[test]
    fn blocked_budget_state_is_broken() {
        let mut findings = healthy_findings();
        findings
            .budget_states
            .insert("brand_new_source".into(), BudgetState::Blocked);
        let (status, messages) = evaluate_run_status(&findings, false);
        assert_eq!(status, RunStatus::Broken);
        assert!(messages[0].contains("exhausted their failure budget"));
    }

    #[test]
    fn watch_state_is_a_warning_and_strict_promotes() {
        let mut findings = healthy_findings();
        findings
            .budget_states
            .insert("flaky_src".into(), BudgetState::Watch);

        let (status, _) = evaluate_run_status(&findings, false);
        assert_eq!(status, RunStatus::Warning);

        let (strict_status, _) = evaluate_run_status(&findings, true);
        assert_eq!(strict_status, RunStatus::Broken);
    }

    #[test]
    fn ingest_halt_before_any_source_is_broken() {
        let item = crate::fetch::FetchedItem {
            canonical_id: Some("c-1".into()),
            title: "t".into(),
            summary: String::new(),
            raw_text: String::new(),
            url: None,
            published_at_utc: None,
            payload: std::collections::BTreeMap::new(),
        };
        let findings = StatusFindings {
            enabled_source_count: 1,
            fetch: vec![FetchOutcome::success("a_src", vec![item])],
            ingest_runs: Some(vec![]),
            stale_threshold_hours: 48,
            ..StatusFindings::default()
        };
        let (status, messages) = evaluate_run_status(&findings, false);
        assert_eq!(status, RunStatus::Broken);
        assert!(messages[0].contains("Ingest halted"));
    }

    #[test]
    fn warning_messages_follow_rule_precedence_then_source_id() {
        let mut findings = healthy_findings();
        findings.fetch.push(FetchOutcome::failure("z_src", Some(503), "HTTP 503"));
        findings.stale_sources = vec!["m_src".into(), "a_src".into()];
        findings.suppression_duplicate_ids = vec!["dup_rule".into()];

        let (status, messages) = evaluate_run_status(&findings, false);
        assert_eq!(status, RunStatus::Warning);
        // Fetch failures first, then staleness (sorted), then suppression.
        assert_eq!(messages[0], "1 source(s) failed to fetch");
        assert_eq!(messages[1], "  z_src: status 503");
        assert_eq!(messages[2], "2 source(s) stale (no success in 48h)");
        assert_eq!(messages[3], "  a_src: stale");
        assert_eq!(messages[4], "  m_src: stale");
        assert!(messages[5].contains("duplicate rule ids"));
    }

    #[test]
    fn failed_ingest_rows_warn() {
        let mut findings = healthy_findings();
        findings.ingest_runs = Some(vec![
            ingest_run("a_src", SourceRunStatus::Success),
            ingest_run("b_src", SourceRunStatus::Failure),
        ]);
        let (status, messages) = evaluate_run_status(&findings, false);
        assert_eq!(status, RunStatus::Warning);
        assert_eq!(messages[0], "1 source(s) failed during ingest");
        assert_eq!(messages[1], "  b_src: boom");
    }
}
