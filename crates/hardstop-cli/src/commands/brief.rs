//! Brief command - run the pipeline and print the brief envelope.
//!
//! Rendering to Markdown or dashboards is downstream; this command emits
//! the read-model JSON exactly as the builder produced it.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use hardstop_core::canonical_json::to_canonical_string;
use hardstop_core::ExecutionMode;
use hardstop_engine::{BriefBuilder, BriefWindow, CancellationToken, Pipeline, PipelineStores};
use hardstop_store::MemoryStores;

use super::DeterminismArgs;
use crate::{ConfigPaths, OutputFormat};

/// Arguments for the brief command.
#[derive(Debug, Args)]
pub struct BriefArgs {
    /// JSON file of per-source fetch outcomes (the adapter handoff).
    #[arg(long)]
    pub outcomes: PathBuf,

    /// JSON file with the network snapshot.
    #[arg(long)]
    pub network: Option<PathBuf>,

    /// Brief window: 24h, 72h, or 168h.
    #[arg(long, default_value = "24h")]
    pub since: String,

    /// Per-section alert cap.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Cap on the top section.
    #[arg(long)]
    pub top_cap: Option<usize>,

    /// Include classification-0 alerts.
    #[arg(long)]
    pub include_class0: bool,

    /// Determinism flags.
    #[command(flatten)]
    pub determinism: DeterminismArgs,
}

/// Execute the brief command, returning the process exit code.
///
/// # Errors
///
/// Returns an error for unreadable handoff files or a malformed window.
pub fn execute(args: &BriefArgs, paths: &ConfigPaths) -> Result<i32> {
    let config = super::load_resolved_config(paths)?;
    let window = BriefWindow::parse(&args.since)?;

    let outcomes = super::load_outcomes(&args.outcomes)?;
    let network = super::load_network(args.network.as_deref())?;
    let envelope = args.determinism.envelope()?;
    let now = envelope.now();

    let stores = MemoryStores::new();
    let pipeline_stores = PipelineStores {
        raw_items: &stores.raw_items,
        events: &stores.events,
        alerts: &stores.alerts,
        source_runs: &stores.source_runs,
        evidence: &stores.evidence,
    };
    let pipeline = Pipeline::new(
        &config,
        envelope,
        ExecutionMode::BestEffort,
        CancellationToken::new(),
    )?;
    pipeline.run(&outcomes, &network, &pipeline_stores)?;

    let builder = BriefBuilder::new(
        args.limit.unwrap_or(config.runtime.brief_limit),
        args.top_cap.unwrap_or(config.runtime.brief_top_cap),
        args.include_class0,
    );
    let brief = builder.build(&stores.alerts, &stores.raw_items, window, now)?;

    match paths.format {
        OutputFormat::Json => println!("{}", to_canonical_string(&brief)?),
        OutputFormat::Text => println!("{}", serde_json::to_string_pretty(&brief)?),
    }
    Ok(0)
}
