//! Status message functions for terminal output.

use owo_colors::OwoColorize;

use super::{colors_enabled, is_quiet};

fn line(symbol: String, plain_symbol: &str, message: String, plain: &str) {
    if colors_enabled() {
        eprintln!("{} {}", symbol, message);
    } else {
        eprintln!("{} {}", plain_symbol, plain);
    }
}

/// Print a success message to stderr.
pub fn success(message: &str) {
    if is_quiet() {
        return;
    }
    line("✓".green().bold().to_string(), "✓", message.to_string(), message);
}

/// Print an info message to stderr.
pub fn info(message: &str) {
    if is_quiet() {
        return;
    }
    line("ℹ".blue().bold().to_string(), "ℹ", message.to_string(), message);
}

/// Print a warning message to stderr.
pub fn warning(message: &str) {
    if is_quiet() {
        return;
    }
    line("⚠".yellow().bold().to_string(), "⚠", message.yellow().to_string(), message);
}

/// Print an error message to stderr.
pub fn error(message: &str) {
    line("✗".red().bold().to_string(), "✗", message.red().to_string(), message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_messages() {
        success("Success message");
        info("Info message");
        warning("Warning message");
        error("Error message");
    }
}
