use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::cli::enums::*;

/// Available kiln subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the application
    ///
    /// Runs the full pipeline and writes the result to the output directory.
    /// Production builds minify, fingerprint and clean the output directory.
    Build(BuildArgs),

    /// Start the development server
    ///
    /// Builds in memory, serves the result, rebuilds on file changes and
    /// pushes hot updates to connected pages.
    Dev(DevArgs),

    /// Validate configuration
    ///
    /// Loads kiln.toml with every override applied, validates it and prints
    /// the effective configuration for the selected mode.
    Check(CheckArgs),
}

/// Options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct ProjectArgs {
    /// Build mode: development or production
    ///
    /// Falls back to KILN_MODE, then NODE_ENV. Without any of them the mode
    /// is the command's default.
    #[arg(short, long, value_name = "MODE")]
    pub mode: Option<String>,

    /// Project root (defaults to the nearest directory with a kiln.toml)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Configuration file to use instead of <root>/kiln.toml
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Arguments for the build command
#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Output directory, relative to the project root
    #[arg(short = 'd', long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Skip the file size summary
    #[arg(long)]
    pub no_summary: bool,
}

/// Arguments for the dev command (development server)
#[derive(Args, Debug)]
pub struct DevArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Port for the development server
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Host name or address to bind
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Do not open a browser on start
    #[arg(long)]
    pub no_open: bool,
}

/// Arguments for the check command (configuration validation)
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Output format for the effective configuration
    #[arg(short, long, value_enum, default_value = "toml")]
    pub format: CheckFormat,

    /// Also check that the directories and files the configuration names exist
    #[arg(long)]
    pub fs: bool,
}
