//! Typeratchet CLI application
//!
//! Discovers the strictest mypy configuration the current project already
//! passes and persists it to mypy.ini, so future edits cannot silently
//! regress below it.
//!
//! # Commands
//!
//! - `typeratchet init [--overwrite]` generates an initial mypy.ini.
//! - `typeratchet tighten [--error-if-can-tighten]` re-derives the tightest
//!   configuration and updates the file, or reports that tightening is
//!   possible without writing (for CI).

mod args;
mod commands;
mod console;

use clap::Parser;

use args::{Cli, Commands};
use console::CliConsole;

fn main() {
    let cli = Cli::parse();

    // RUST_LOG takes precedence; --verbose raises the default to debug
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let console = CliConsole::new(cli.verbose);
    console.plain(&format!("typeratchet v{}\n", typeratchet_core::VERSION));

    let result = match cli.command {
        Commands::Init { overwrite } => commands::init::run(&console, overwrite),
        Commands::Tighten {
            error_if_can_tighten,
        } => commands::tighten::run(&console, error_if_can_tighten),
    };

    match result {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(error) => {
            console.error(&error.to_string());
            std::process::exit(1);
        }
    }
}
