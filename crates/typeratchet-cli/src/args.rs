//! CLI argument definitions using clap

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "typeratchet")]
#[command(about = "Discover and lock in the strictest mypy configuration your project passes")]
#[command(
    long_about = r#"Discover and lock in the strictest mypy configuration your project passes

USAGE:
  typeratchet init                       # Generate an initial mypy.ini
  typeratchet init --overwrite           # Replace an existing mypy.ini
  typeratchet tighten                    # Re-derive and update mypy.ini
  typeratchet tighten --error-if-can-tighten
                                         # CI mode: fail if tightening is possible

Extra global mypy settings can be supplied in pyproject.toml under
[tool.typeratchet.mypy_global_config].

For detailed help: typeratchet --help"#
)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate an initial mypy.ini file for your project
    Init {
        /// Overwrite an existing mypy.ini, if any
        #[arg(long)]
        overwrite: bool,
    },

    /// Attempt to tighten your project's existing mypy.ini file
    Tighten {
        /// Exit 1 and print the tighter configuration to stdout instead of
        /// overwriting mypy.ini. Intended for use in CI environments.
        #[arg(long)]
        error_if_can_tighten: bool,
    },
}
