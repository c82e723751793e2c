//! # Output Configuration
//!
//! Controls how results reach the operator: colors and status markers,
//! build progress spinners, and the end-of-run summary.
//!
//! ## Respecting User Preferences
//!
//! - `--color=never|always|auto` - CLI flag for color control
//! - `NO_COLOR` - Disables colors when set (per https://no-color.org/)
//! - `CLICOLOR=0` - Disables colors
//! - `CLICOLOR_FORCE=1` - Forces colors even in non-TTY
//! - `TERM=dumb` - Disables colors for dumb terminals
//!
//! Spinners are drawn on stderr only when it is a terminal, so reports
//! written to stdout or files stay clean.

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::env;
use std::fmt::Write as _;
use std::time::Duration;

use crate::report::{BuildReport, DistroOutcome, OutcomeStatus};

/// Output configuration for controlling colors and progress display.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and symbols should be used in output.
    pub use_color: bool,
    /// Whether spinners should be drawn.
    pub show_progress: bool,
}

impl OutputConfig {
    /// Create an output configuration from environment and the `--color` flag
    /// ("always", "never" or "auto").
    ///
    /// In auto mode, colors are disabled if:
    /// - `NO_COLOR` environment variable is set (any value, including empty)
    /// - `CLICOLOR=0` is set
    /// - `TERM=dumb` is set
    /// - stdout is not a TTY (unless `CLICOLOR_FORCE=1`)
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };
        let show_progress = console::Term::stderr().is_term();

        Self {
            use_color,
            show_progress,
        }
    }

    fn detect_color_support() -> bool {
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }
        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }
        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }
        console::Term::stdout().features().colors_supported()
    }

    /// Plain output: no colors, no spinners.
    pub fn plain() -> Self {
        Self {
            use_color: false,
            show_progress: false,
        }
    }

    #[cfg(test)]
    fn with_color() -> Self {
        Self {
            use_color: true,
            show_progress: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// Returns `symbol` when colors are enabled, otherwise `plain`.
pub fn emoji<'a>(config: &OutputConfig, symbol: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        symbol
    } else {
        plain
    }
}

/// A spinner on stderr, hidden unless progress display is enabled.
pub fn spinner(config: &OutputConfig, prefix: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if !config.show_progress {
        bar.set_draw_target(ProgressDrawTarget::hidden());
    }
    let template = ProgressStyle::default_spinner()
        .template("[{prefix}] {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    bar.set_style(template);
    bar.set_prefix(prefix.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Marker shown in front of an outcome line.
pub fn status_marker(config: &OutputConfig, status: &OutcomeStatus) -> String {
    let (symbol, plain) = match status {
        OutcomeStatus::Done => ("\u{2713}", "[OK]"),
        OutcomeStatus::Failed { .. } => ("\u{2717}", "[FAIL]"),
        OutcomeStatus::Skipped => ("-", "[SKIP]"),
    };
    let marker = emoji(config, symbol, plain);
    if !config.use_color {
        return marker.to_string();
    }
    match status {
        OutcomeStatus::Done => style(marker).green().to_string(),
        OutcomeStatus::Failed { .. } => style(marker).red().to_string(),
        OutcomeStatus::Skipped => style(marker).yellow().to_string(),
    }
}

fn render_outcome(config: &OutputConfig, outcome: &DistroOutcome, out: &mut String) {
    let _ = writeln!(out, "{} {}", status_marker(config, &outcome.status), outcome);
    for warning in &outcome.warnings {
        let _ = writeln!(out, "    warning: {}", warning);
    }
}

/// Human-readable summary of a build.
pub fn render_report(config: &OutputConfig, report: &BuildReport) -> String {
    let mut out = String::new();
    for outcome in &report.outcomes {
        render_outcome(config, outcome, &mut out);
    }
    let failed = report.failed().count();
    let summary = format!(
        "{} done, {} failed, {} skipped",
        report.done_count(),
        failed,
        report.skipped_count()
    );
    let summary = if !config.use_color {
        summary
    } else if report.is_success() {
        style(summary).green().bold().to_string()
    } else {
        style(summary).red().bold().to_string()
    };
    let _ = writeln!(out, "\n{}", summary);
    out
}
