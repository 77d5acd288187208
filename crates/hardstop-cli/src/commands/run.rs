//! Run command - execute the pipeline and map status to an exit code.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use owo_colors::OwoColorize;

use hardstop_core::provenance::RunRecordWriter;
use hardstop_core::{ExecutionMode, ResolvedConfig};
use hardstop_engine::{
    evaluate_run_status, CancellationToken, Pipeline, PipelineStores, RunStatus,
    SourceHealthScorer, StatusFindings,
};
use hardstop_store::{MemoryStores, MigrationRegistry, SchemaState, SourceRunStore};

use super::DeterminismArgs;
use crate::{ConfigPaths, OutputFormat};

/// Arguments for the run command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// JSON file of per-source fetch outcomes (the adapter handoff).
    #[arg(long)]
    pub outcomes: PathBuf,

    /// JSON file with the network snapshot (facilities/lanes/shipments).
    #[arg(long)]
    pub network: Option<PathBuf>,

    /// Treat warnings as broken (exit 2).
    #[arg(long)]
    pub strict: bool,

    /// Evaluate suppression rules but never stamp items.
    #[arg(long)]
    pub no_suppress: bool,

    /// Directory RunRecord files are written to (overrides runtime config).
    #[arg(long)]
    pub run_records_dir: Option<PathBuf>,

    /// Determinism flags.
    #[command(flatten)]
    pub determinism: DeterminismArgs,
}

/// Execute the run command, returning the process exit code.
///
/// # Errors
///
/// Returns an error only for boundary failures (unreadable handoff
/// files); configuration and pipeline problems become exit codes.
pub fn execute(args: &RunArgs, paths: &ConfigPaths) -> Result<i32> {
    let config = match super::load_resolved_config(paths) {
        Ok(config) => config,
        Err(e) => {
            let findings = StatusFindings {
                config_error: Some(e.to_string()),
                ..StatusFindings::default()
            };
            let (status, messages) = evaluate_run_status(&findings, args.strict);
            print_status(status, &messages, paths.format);
            return Ok(status.exit_code());
        }
    };

    let outcomes = super::load_outcomes(&args.outcomes)?;
    let network = super::load_network(args.network.as_deref())?;
    let envelope = args.determinism.envelope()?;

    // Additive migrations run on every startup; a store at an older
    // version replays only what it is missing.
    let mut schema = SchemaState::default();
    MigrationRegistry::builtin().apply(&mut schema);
    if let Err(drift) = schema.require_column("alerts", "correlation_key") {
        let findings = StatusFindings {
            schema_drift: Some(drift.to_string()),
            ..StatusFindings::default()
        };
        let (status, messages) = evaluate_run_status(&findings, args.strict);
        print_status(status, &messages, paths.format);
        return Ok(status.exit_code());
    }

    let mode = if args.strict {
        ExecutionMode::Strict
    } else {
        ExecutionMode::BestEffort
    };

    let stores = MemoryStores::new();
    let pipeline_stores = PipelineStores {
        raw_items: &stores.raw_items,
        events: &stores.events,
        alerts: &stores.alerts,
        source_runs: &stores.source_runs,
        evidence: &stores.evidence,
    };

    let mut pipeline = Pipeline::new(&config, envelope, mode, CancellationToken::new())?;
    if args.no_suppress {
        pipeline = pipeline.with_no_suppress();
    }

    let report = match pipeline.run(&outcomes, &network, &pipeline_stores) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{} {e}", "pipeline halted:".red());
            return Ok(RunStatus::Broken.exit_code());
        }
    };

    let records_dir = args
        .run_records_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.runtime.run_records_dir));
    let writer = RunRecordWriter::new(records_dir);
    for record in &report.run_records {
        writer
            .write(record, None)
            .context("writing run record")?;
    }

    let findings = build_findings(&config, &outcomes, &stores, &report.run_group_id)?;
    let (status, messages) = evaluate_run_status(&findings, args.strict);
    print_status(status, &messages, paths.format);
    Ok(status.exit_code())
}

/// Folds store telemetry into the evaluator's findings.
pub(crate) fn build_findings(
    config: &ResolvedConfig,
    outcomes: &[hardstop_engine::FetchOutcome],
    stores: &MemoryStores,
    run_group_id: &hardstop_core::RunGroupId,
) -> Result<StatusFindings> {
    let scorer = SourceHealthScorer::new(config.runtime.stale_threshold_hours);
    // Health is read at the boundary after the run; the wall clock is fine
    // here because budget states feed the exit code, not any hashed
    // artifact.
    let now = hardstop_core::UtcTimestamp::new(chrono::Utc::now());

    let mut budget_states = BTreeMap::new();
    let mut stale_sources = Vec::new();
    for source in config.enabled_sources() {
        let health = scorer.score(&source.id, &stores.source_runs, now)?;
        if health
            .stale_hours
            .is_some_and(|h| h > config.runtime.stale_threshold_hours)
        {
            stale_sources.push(source.id.clone());
        }
        // A source that has simply never run reports BLOCKED from the
        // health scorer, but for the exit code it is a warning (WATCH)
        // until it earns a real failure history; strict mode still
        // escalates it to broken.
        let state = if health.factors == ["no_history"] {
            hardstop_engine::BudgetState::Watch
        } else {
            health.budget_state
        };
        budget_states.insert(source.id.clone(), state);
    }

    let ingest_runs = stores
        .source_runs
        .for_group(run_group_id)?
        .into_iter()
        .filter(|r| r.phase == hardstop_store::RunPhase::Ingest)
        .collect();

    Ok(StatusFindings {
        config_error: None,
        schema_drift: None,
        enabled_source_count: config.enabled_sources().len(),
        fetch: outcomes.to_vec(),
        ingest_runs: Some(ingest_runs),
        stale_sources,
        stale_threshold_hours: config.runtime.stale_threshold_hours,
        budget_states,
        suppression_duplicate_ids: config.suppression.duplicate_rule_ids(),
    })
}

fn print_status(status: RunStatus, messages: &[String], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "status": status,
                "exit_code": status.exit_code(),
                "messages": messages,
            });
            println!("{}", serde_json::to_string_pretty(&payload).unwrap_or_default());
        }
        OutputFormat::Text => {
            let banner = match status {
                RunStatus::Healthy => "HEALTHY".green().to_string(),
                RunStatus::Warning => "WARNING".yellow().to_string(),
                RunStatus::Broken => "BROKEN".red().to_string(),
            };
            println!("{banner}");
            for message in messages {
                println!("{message}");
            }
        }
    }
}
