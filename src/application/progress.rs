//! Progress reporting for long-running export/import operations.

use colored::Colorize;

/// Receives `(processed, total, status)` updates. Owned by the caller.
pub trait ProgressReporter: Send + Sync {
    /// Called when progress is made.
    fn on_progress(&self, current: usize, total: usize, status: &str);
}

impl<F> ProgressReporter for F
where
    F: Fn(usize, usize, &str) + Send + Sync,
{
    fn on_progress(&self, current: usize, total: usize, status: &str) {
        self(current, total, status);
    }
}

/// Single-line console progress on stderr.
pub struct ConsoleProgress {
    prefix: String,
}

impl ConsoleProgress {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl ProgressReporter for ConsoleProgress {
    #[allow(clippy::cast_precision_loss)]
    fn on_progress(&self, current: usize, total: usize, status: &str) {
        let pct = if total > 0 {
            (current as f64 / total as f64) * 100.0
        } else {
            100.0
        };
        eprint!(
            "\r{} [{:>5.1}%] {} ({}/{})\x1b[K",
            self.prefix.bold(),
            pct,
            status,
            current,
            total
        );
        if current >= total {
            eprintln!();
        }
    }
}
