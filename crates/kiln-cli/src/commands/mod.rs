//! Command implementations for the kiln CLI.
//!
//! - [`build`] - run the pipeline once and write the output
//! - [`dev`] - development server with hot module replacement
//! - [`check`] - configuration validation
//!
//! Each command provides an `execute` function that takes its parsed
//! arguments and returns a Result.

pub mod build;
pub mod check;
pub mod dev;
pub(crate) mod utils;

pub use build::execute as build_execute;
pub use check::execute as check_execute;
pub use dev::execute as dev_execute;
