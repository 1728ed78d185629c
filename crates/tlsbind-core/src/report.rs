//! Reporting sink for human-readable diagnostics.
//!
//! The binding layer talks to the user-facing progress view through this
//! trait only. Reports never influence binding behaviour, and a sink must
//! not panic: it is called from inside handshake processing.

use std::sync::Mutex;

/// Severity of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLevel {
    Detail,
    Warning,
}

/// A single diagnostic line delivered to a `Reporter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub level: ReportLevel,
    pub message: String,
}

/// Best-effort diagnostic sink.
pub trait Reporter: Send + Sync {
    /// Informational progress line.
    fn detail(&self, message: &str);

    /// Anomaly worth the user's attention. Defaults to a detail line.
    fn warning(&self, message: &str) {
        self.detail(message);
    }
}

// ── Tracing ───────────────────────────────────────────────────────────────────

/// Forwards reports to `tracing`.
///
/// With `verbose` set, detail lines are logged at INFO; otherwise at DEBUG.
/// Warnings always go to WARN.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter {
    verbose: bool,
}

impl TracingReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Reporter for TracingReporter {
    fn detail(&self, message: &str) {
        if self.verbose {
            tracing::info!(target: "tlsbind::report", "{message}");
        } else {
            tracing::debug!(target: "tlsbind::report", "{message}");
        }
    }

    fn warning(&self, message: &str) {
        tracing::warn!(target: "tlsbind::report", "{message}");
    }
}

// ── In-memory ─────────────────────────────────────────────────────────────────

/// Collects every report in order. Used by tests and by the CLI summary.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    reports: Mutex<Vec<Report>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.lock().clone()
    }

    pub fn details(&self) -> Vec<String> {
        self.messages(ReportLevel::Detail)
    }

    pub fn warnings(&self) -> Vec<String> {
        self.messages(ReportLevel::Warning)
    }

    fn messages(&self, level: ReportLevel) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|r| r.level == level)
            .map(|r| r.message.clone())
            .collect()
    }

    fn push(&self, level: ReportLevel, message: &str) {
        self.lock().push(Report {
            level,
            message: message.to_string(),
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Report>> {
        // A poisoned sink still holds valid reports.
        self.reports
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Reporter for MemoryReporter {
    fn detail(&self, message: &str) {
        self.push(ReportLevel::Detail, message);
    }

    fn warning(&self, message: &str) {
        self.push(ReportLevel::Warning, message);
    }
}
