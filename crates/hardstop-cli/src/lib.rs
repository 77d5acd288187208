//! # hardstop-cli
//!
//! Command-line interface for the Hardstop decision engine.
//!
//! ## Commands
//!
//! - `hardstop run` - Execute the pipeline over adapter-fetched outcomes
//! - `hardstop brief` - Run the pipeline and print the brief envelope
//! - `hardstop sources` - Inspect configured sources and their health
//! - `hardstop doctor` - Validate configuration and report findings
//!
//! The CLI is a thin shell: it loads configuration, builds the determinism
//! envelope (this is the only layer allowed to read the wall clock), hands
//! everything to `hardstop-engine`, and maps the run status onto the
//! process exit code (0 healthy, 1 warning, 2 broken; `--strict`
//! escalates 1 to 2).

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Hardstop CLI - local-first decision engine.
#[derive(Debug, Parser)]
#[command(name = "hardstop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Runtime config YAML path.
    #[arg(long, env = "HARDSTOP_CONFIG", default_value = "hardstop.config.yaml")]
    pub config: PathBuf,

    /// Sources registry YAML path.
    #[arg(long, env = "HARDSTOP_SOURCES", default_value = "config/sources.yaml")]
    pub sources: PathBuf,

    /// Suppression registry YAML path.
    #[arg(long, env = "HARDSTOP_SUPPRESSION", default_value = "config/suppression.yaml")]
    pub suppression: PathBuf,

    /// Output format.
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Execute the pipeline over fetched outcomes.
    Run(commands::run::RunArgs),
    /// Execute the pipeline and print the brief envelope.
    Brief(commands::brief::BriefArgs),
    /// Inspect configured sources and their health.
    Sources(commands::sources::SourcesArgs),
    /// Validate configuration and report findings.
    Doctor(commands::doctor::DoctorArgs),
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

/// Shared paths resolved from the top-level flags.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Runtime config YAML path.
    pub config: PathBuf,
    /// Sources registry YAML path.
    pub sources: PathBuf,
    /// Suppression registry YAML path.
    pub suppression: PathBuf,
    /// Output format.
    pub format: OutputFormat,
}

impl Cli {
    /// The effective configuration paths.
    #[must_use]
    pub fn paths(&self) -> ConfigPaths {
        ConfigPaths {
            config: self.config.clone(),
            sources: self.sources.clone(),
            suppression: self.suppression.clone(),
            format: self.format,
        }
    }
}
