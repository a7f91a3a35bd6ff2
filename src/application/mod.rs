//! Application layer - use cases and orchestration.
//!
//! This layer contains the sanitizers, the archive analyzer and the
//! export, restore and reset services.

pub mod analyzer;
pub mod exporter;
pub mod formatter;
pub mod importer;
pub mod progress;
pub mod reset;
pub mod sanitize;

pub use analyzer::analyze;
pub use exporter::{read_archive_file, write_archive, ExportService};
pub use formatter::{
    counts_table, format_analysis, format_import_summary, format_log_line, format_reset_summary,
    OutputFormat,
};
pub use importer::RestoreService;
pub use progress::ConsoleProgress;
pub use reset::ResetService;
