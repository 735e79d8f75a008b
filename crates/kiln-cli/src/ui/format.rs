//! Formatting utilities for sizes, durations and build summaries.

use std::time::Duration;

use console::Term;
use kiln_bundler::{BuildOutput, Diagnostic, DiagnosticSeverity, OutputKind};
use owo_colors::OwoColorize;

use super::colors_enabled;

/// Format a byte count with the largest fitting unit.
///
/// ```
/// use kiln_cli::ui::format_size;
///
/// assert_eq!(format_size(0), "0 B");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;
    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Format a duration as `50ms`, `1.50s` or `1m 30s`.
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();

    if total_ms < 1000 {
        format!("{}ms", total_ms)
    } else if total_ms < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

fn kind_label(kind: OutputKind) -> &'static str {
    match kind {
        OutputKind::Script => "js",
        OutputKind::Style => "css",
        OutputKind::SourceMap => "map",
        OutputKind::Media => "media",
        OutputKind::Html => "html",
        OutputKind::Static => "public",
    }
}

/// Print the emitted files with their sizes, largest scripts first.
///
/// Source maps and copied public files are folded into the totals line.
pub fn print_build_summary(output: &BuildOutput, elapsed: Duration) {
    if super::is_quiet() {
        return;
    }
    let width = (Term::stderr().size().1 as usize).min(80);
    let color = colors_enabled();

    let mut rows: Vec<_> = output
        .files
        .iter()
        .filter(|f| !matches!(f.kind, OutputKind::SourceMap | OutputKind::Static))
        .collect();
    rows.sort_by(|a, b| {
        (a.kind as u8, std::cmp::Reverse(a.contents.len()))
            .cmp(&(b.kind as u8, std::cmp::Reverse(b.contents.len())))
    });

    eprintln!();
    eprintln!("{}", "─".repeat(width));
    for file in rows {
        let size = format_size(file.contents.len() as u64);
        let label = kind_label(file.kind);
        if color {
            eprintln!("  {:>10}  {:<6} {}", size.dimmed(), label.blue(), file.path.bold());
        } else {
            eprintln!("  {:>10}  {:<6} {}", size, label, file.path);
        }
    }
    eprintln!("{}", "─".repeat(width));

    let total = format_size(output.total_size() as u64);
    let summary = format!(
        "{} files, {} in {}",
        output.files.len(),
        total,
        format_duration(elapsed)
    );
    if color {
        eprintln!("  {} {}", "Total:".bold(), summary.green());
    } else {
        eprintln!("  Total: {}", summary);
    }
}

/// Print non-fatal diagnostics, one line each.
pub fn print_warnings(warnings: &[Diagnostic]) {
    for diagnostic in warnings {
        match diagnostic.severity {
            DiagnosticSeverity::Error => super::error(&diagnostic.to_string()),
            DiagnosticSeverity::Warning => super::warning(&diagnostic.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size_bytes() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1023), "1023 B");
    }

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(10_240), "10.00 KB");
        assert_eq!(format_size(1_572_864), "1.50 MB");
        assert_eq!(format_size(2_147_483_648), "2.00 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "61m 1s");
    }
}
