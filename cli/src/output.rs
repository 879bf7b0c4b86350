//! Styled terminal output.

use std::fmt::Display;

use console::{Term, style};

/// Terminal output helper for consistent styled output.
pub struct Output {
    term: Term,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    pub fn new() -> Self {
        Self {
            term: Term::stdout(),
        }
    }

    /// Print a success message with a green checkmark.
    pub fn success(&self, message: impl Display) {
        drop(
            self.term
                .write_line(&format!("{} {}", style("✓").green().bold(), message)),
        );
    }

    /// Print an error message with a red X.
    pub fn error(&self, message: impl Display) {
        drop(
            self.term
                .write_line(&format!("{} {}", style("✗").red().bold(), message)),
        );
    }

    /// Print a plain message without any prefix.
    pub fn print(&self, message: impl Display) {
        drop(self.term.write_line(&message.to_string()));
    }

    /// Print a dim/muted message.
    pub fn dim(&self, message: impl Display) {
        drop(self.term.write_line(&style(message).dim().to_string()));
    }

    /// Print one step of a multi-file operation, e.g. `[2/5] reads.bam`.
    pub fn step(&self, current: usize, total: usize, message: impl Display) {
        drop(self.term.write_line(&format!(
            "{} {}",
            style(format!("[{current}/{total}]")).cyan(),
            message
        )));
    }

    /// Print a count summary.
    pub fn count(&self, label: impl Display, count: usize, noun: &str) {
        drop(self.term.write_line(&format!(
            "\n{}: {}",
            style(label).bold(),
            style(format!("{count} {noun}(s)")).cyan()
        )));
    }
}

pub fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes < KIB {
        format!("{bytes} B")
    } else if bytes < MIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else if bytes < GIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else {
        format!("{:.2} GB", bytes as f64 / GIB as f64)
    }
}

/// Epoch milliseconds as a local timestamp; blank when unknown.
pub fn format_millis(millis: i64) -> String {
    if millis == 0 {
        return String::new();
    }
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|time| {
            time.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_default()
}
