//! Spinner for the long, silent stretch of a build.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use owo_colors::OwoColorize;

use super::colors_enabled;

pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    /// Start a spinner on stderr. Hidden outside a terminal, in CI and with
    /// `--quiet`.
    pub fn new(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if super::is_ci() || super::is_quiet() || !console::user_attended_stderr() {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["◐", "◓", "◑", "◒", "●"]);
        pb.set_style(style);
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    pub fn set_message(&self, message: &str) {
        self.pb.set_message(message.to_string());
    }

    pub fn finish(&self, message: &str) {
        let mark = if colors_enabled() { "✓".green().to_string() } else { "✓".to_string() };
        self.pb.finish_with_message(format!("{} {}", mark, message));
    }

    pub fn fail(&self, message: &str) {
        let mark = if colors_enabled() { "✗".red().to_string() } else { "✗".to_string() };
        self.pb.finish_with_message(format!("{} {}", mark, message));
    }
}
