//! Sources command - list configured sources, probe one, read health.

use anyhow::Result;
use clap::{Args, Subcommand};
use owo_colors::OwoColorize;

use hardstop_core::{RunGroupId, UtcTimestamp};
use hardstop_engine::{BudgetState, SourceHealthScorer};
use hardstop_store::{
    MemorySourceRunStore, RunPhase, SourceRun, SourceRunStatus, SourceRunStore,
};

use crate::ConfigPaths;

/// Arguments for the sources command.
#[derive(Debug, Args)]
pub struct SourcesArgs {
    /// Subcommand.
    #[command(subcommand)]
    pub action: SourcesAction,
}

/// Sources subcommands.
#[derive(Debug, Subcommand)]
pub enum SourcesAction {
    /// List configured sources with their resolved trust settings.
    List,
    /// Record a probe success for a source and show the resulting health.
    Test {
        /// Source id to probe.
        id: String,
    },
    /// Show the health a source would score with no run history.
    Health {
        /// Source id to inspect.
        id: String,
    },
}

/// Execute the sources command, returning the process exit code.
///
/// # Errors
///
/// Returns an error when configuration cannot be loaded.
pub fn execute(args: &SourcesArgs, paths: &ConfigPaths) -> Result<i32> {
    let config = super::load_resolved_config(paths)?;

    match &args.action {
        SourcesAction::List => {
            for source in &config.sources {
                let enabled = if source.enabled {
                    "enabled".green().to_string()
                } else {
                    "disabled".red().to_string()
                };
                println!(
                    "{}  [{}] {}  trust={} floor={} bias={}",
                    source.id,
                    source.tier.as_str(),
                    enabled,
                    source.trust_tier.get(),
                    source.classification_floor,
                    source.weighting_bias,
                );
            }
            Ok(0)
        }
        SourcesAction::Test { id } => {
            let Some(source) = config.source(id) else {
                eprintln!("unknown source '{id}'");
                return Ok(2);
            };

            // A probe is one synthetic successful FETCH run: enough to
            // flip a never-run source out of BLOCKED.
            let store = MemorySourceRunStore::new();
            let now = UtcTimestamp::new(chrono::Utc::now());
            store.append(SourceRun {
                run_group_id: RunGroupId::from("probe"),
                phase: RunPhase::Fetch,
                source_id: source.id.clone(),
                status: SourceRunStatus::Success,
                status_code: Some(200),
                error: None,
                duration_ms: 0,
                items_fetched: 0,
                items_new: 0,
                items_processed: 0,
                items_suppressed: 0,
                items_events_created: 0,
                items_alerts_touched: 0,
                bytes_downloaded: 0,
                diagnostics: std::collections::BTreeMap::new(),
                run_at_utc: now,
            })?;

            let health = SourceHealthScorer::new(config.runtime.stale_threshold_hours)
                .score(&source.id, &store, now)?;
            print_health(&health.source_id, health.score, health.budget_state);
            Ok(0)
        }
        SourcesAction::Health { id } => {
            if config.source(id).is_none() {
                eprintln!("unknown source '{id}'");
                return Ok(2);
            }
            let store = MemorySourceRunStore::new();
            let now = UtcTimestamp::new(chrono::Utc::now());
            let health = SourceHealthScorer::new(config.runtime.stale_threshold_hours)
                .score(id, &store, now)?;
            print_health(&health.source_id, health.score, health.budget_state);
            Ok(0)
        }
    }
}

fn print_health(source_id: &str, score: i64, state: BudgetState) {
    let badge = match state {
        BudgetState::Healthy => state.as_str().green().to_string(),
        BudgetState::Watch => state.as_str().yellow().to_string(),
        BudgetState::Blocked => state.as_str().red().to_string(),
    };
    println!("{source_id}: score={score} state={badge}");
}
