//! Command-line interface definition.
//!
//! - `kiln build` - production (or development) build to the output directory
//! - `kiln dev` - development server with hot module replacement
//! - `kiln check` - load and validate configuration, print the result

mod commands;
pub mod enums;
mod tests;

use clap::Parser;

pub use commands::{BuildArgs, CheckArgs, Command, DevArgs, ProjectArgs};
pub use enums::*;

/// Kiln - build tooling for component-based web applications
#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    version,
    about = "Build tooling for component-based web applications",
    long_about = "Kiln turns a source tree of scripts, stylesheets, single-file components\n\
                  and media into a deployable bundle, and serves it with hot module\n\
                  replacement during development."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}
