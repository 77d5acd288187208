//! Hardstop CLI - the main entry point for the `hardstop` binary.

use anyhow::Result;
use clap::Parser;

use hardstop_cli::{Cli, Commands};
use hardstop_core::{init_logging, LogFormat};

fn main() -> Result<()> {
    init_logging(LogFormat::Pretty);

    let cli = Cli::parse();
    let paths = cli.paths();

    let exit_code = match cli.command {
        Commands::Run(args) => hardstop_cli::commands::run::execute(&args, &paths)?,
        Commands::Brief(args) => hardstop_cli::commands::brief::execute(&args, &paths)?,
        Commands::Sources(args) => hardstop_cli::commands::sources::execute(&args, &paths)?,
        Commands::Doctor(args) => hardstop_cli::commands::doctor::execute(&args, &paths)?,
    };

    std::process::exit(exit_code);
}
