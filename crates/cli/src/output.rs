//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Render an optional statistic, `-` when absent
pub fn format_stat(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.3}", v),
        None => "-".to_string(),
    }
}

/// Render a before/after pair, highlighting changes
pub fn color_change(before: &str, after: &str) -> String {
    if before == after {
        after.to_string()
    } else {
        format!("{} → {}", before.dimmed(), after.green())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_stat() {
        assert_eq!(format_stat(Some(0.4)), "0.400");
        assert_eq!(format_stat(None), "-");
    }

    #[test]
    fn test_color_change_unchanged_is_plain() {
        assert_eq!(color_change("400m", "400m"), "400m");
        assert!(color_change("250m", "400m").contains("400m"));
    }
}
