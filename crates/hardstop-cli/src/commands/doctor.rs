//! Doctor command - validate configuration and report findings.

use anyhow::Result;
use clap::Args;
use owo_colors::OwoColorize;

use hardstop_engine::{evaluate_run_status, RunStatus, StatusFindings, SuppressionEngine};
use hardstop_store::{MigrationRegistry, SchemaState};

use crate::ConfigPaths;

/// Arguments for the doctor command.
#[derive(Debug, Args)]
pub struct DoctorArgs {
    /// Treat warnings as broken (exit 2).
    #[arg(long)]
    pub strict: bool,
}

/// Execute the doctor command, returning the process exit code.
///
/// # Errors
///
/// Never returns an error; every problem becomes an exit code.
pub fn execute(args: &DoctorArgs, paths: &ConfigPaths) -> Result<i32> {
    let mut findings = StatusFindings {
        stale_threshold_hours: 48,
        ..StatusFindings::default()
    };

    match super::load_resolved_config(paths) {
        Ok(config) => {
            findings.enabled_source_count = config.enabled_sources().len();
            findings.suppression_duplicate_ids = config.suppression.duplicate_rule_ids();
            findings.stale_threshold_hours = config.runtime.stale_threshold_hours;

            match config.fingerprint() {
                Ok(fingerprint) => println!("config fingerprint: {fingerprint}"),
                Err(e) => findings.config_error = Some(e.to_string()),
            }

            // Rules must compile now, not at first evaluation.
            if let Err(e) = SuppressionEngine::compile(&config.suppression) {
                findings.config_error = Some(e.to_string());
            }
            for source in &config.sources {
                let registry = hardstop_core::config::SuppressionRegistry {
                    version: config.suppression.version,
                    enabled: true,
                    rules: source.suppress.clone(),
                };
                if let Err(e) = SuppressionEngine::compile(&registry) {
                    findings.config_error = Some(format!("source '{}': {e}", source.id));
                }
            }
        }
        Err(e) => findings.config_error = Some(e.to_string()),
    }

    let mut schema = SchemaState::default();
    MigrationRegistry::builtin().apply(&mut schema);
    println!("schema version: {}", schema.version);
    if let Err(drift) = schema.require_column("alerts", "correlation_key") {
        findings.schema_drift = Some(drift.to_string());
    }

    let (status, messages) = evaluate_run_status(&findings, args.strict);
    let banner = match status {
        RunStatus::Healthy => "HEALTHY".green().to_string(),
        RunStatus::Warning => "WARNING".yellow().to_string(),
        RunStatus::Broken => "BROKEN".red().to_string(),
    };
    println!("{banner}");
    for message in messages {
        println!("{message}");
    }
    Ok(status.exit_code())
}
