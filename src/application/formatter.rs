//! Output formatting for analyses, import reports and store inventories.
//!
//! Supports a table view for people and JSON for scripts.

use std::collections::BTreeMap;

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};

use crate::domain::{BackupAnalysis, ImportReport};

use super::reset::ResetResult;

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table.
    #[default]
    Table,
    /// JSON for programmatic use.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {s}. Use: table, json")),
        }
    }
}

/// Formats a backup analysis in the requested format.
///
/// # Errors
/// Returns error if JSON serialization fails.
pub fn format_analysis(
    analysis: &BackupAnalysis,
    format: OutputFormat,
) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(analysis),
        OutputFormat::Table => Ok(format_analysis_table(analysis)),
    }
}

fn format_analysis_table(analysis: &BackupAnalysis) -> String {
    let status = if analysis.valid {
        "valid".green()
    } else {
        "invalid".red()
    };

    let mut out = format!("{} {}\n", "Backup is".bold(), status);

    if !analysis.counts.is_empty() {
        out.push_str(&counts_table(&analysis.counts));
        out.push('\n');
    }
    out.push_str(&format!(
        "  Total items: {}\n",
        analysis.total_items.to_string().cyan()
    ));

    for warning in &analysis.warnings {
        out.push_str(&format!("  {} {warning}\n", "⚠".yellow()));
    }
    out
}

/// Formats per-collection counts as a table.
#[must_use]
pub fn counts_table(counts: &BTreeMap<String, usize>) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Collection", "Items"]);
    for (name, count) in counts {
        table.add_row(vec![name.clone(), count.to_string()]);
    }
    table.to_string()
}

/// Formats one import log line, colored by its severity prefix.
#[must_use]
pub fn format_log_line(line: &str) -> String {
    if line.starts_with("ERROR") {
        line.red().to_string()
    } else if line.starts_with("WARNING") || line.starts_with("SKIPPING") {
        line.yellow().to_string()
    } else {
        line.to_string()
    }
}

/// Formats the closing summary of an import.
#[must_use]
pub fn format_import_summary(report: &ImportReport) -> String {
    let headline = if report.success {
        "✓ Restore complete".green().bold()
    } else {
        "✗ Restore failed".red().bold()
    };
    format!(
        "{headline}\n  Documents written: {}\n  Batches committed: {}\n  Skipped: {}",
        report.documents_written.to_string().cyan(),
        report.batches_committed.to_string().cyan(),
        report.documents_skipped.to_string().yellow()
    )
}

/// Formats the outcome of a reset.
#[must_use]
pub fn format_reset_summary(result: &ResetResult) -> String {
    format!(
        "{}\n  Documents deleted: {}\n  Collections cleared: {}\n  Cache entries removed: {}",
        "✓ Reset complete".green().bold(),
        result.documents_deleted.to_string().cyan(),
        result.collections_cleared.to_string().cyan(),
        result.cache_entries_removed.to_string().cyan()
    )
}
