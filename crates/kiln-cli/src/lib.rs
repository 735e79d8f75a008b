//! Kiln CLI: production builds, the development server and config checks.
//!
//! The heavy lifting lives in `kiln-bundler`; this crate owns everything a
//! user touches directly:
//!
//! - [`cli`] - argument definitions
//! - [`commands`] - `build`, `dev` and `check`
//! - [`dev`] - the development server: HTTP routes, hot module replacement
//!   and the file watcher
//! - [`error`] - [`CliError`] and its conversion to miette reports
//! - [`logger`] / [`ui`] - tracing setup and human-facing status lines
//!
//! # Example
//!
//! ```rust,no_run
//! use kiln_cli::{error::Result, logger};
//!
//! fn main() -> Result<()> {
//!     logger::init_logger(false, false, false);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod dev;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{CliError, Result, ResultExt, cli_error_to_miette};
