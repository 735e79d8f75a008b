//! Miette diagnostic conversion for CLI errors.

use ::miette::{MietteDiagnostic, Report};

use crate::error::CliError;

/// Convert a [`CliError`] into a report for `main` to print.
///
/// Bundler errors already implement [`miette::Diagnostic`](::miette::Diagnostic)
/// and are passed through unchanged.
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Build(e) => Report::new(e),
        CliError::Config(e) => {
            let mut diagnostic = MietteDiagnostic::new(e.to_string()).with_code("kiln::config");
            if let Some(hint) = e.hint() {
                diagnostic = diagnostic.with_help(hint);
            }
            Report::new(diagnostic)
        }
        CliError::Bind { .. } => Report::new(
            MietteDiagnostic::new(err.to_string())
                .with_code("kiln::dev_server")
                .with_help("another process is using the port; pass --port or set dev.port"),
        ),
        other => ::miette::miette!("{}", other),
    }
}
