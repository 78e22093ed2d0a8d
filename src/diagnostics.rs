// src/diagnostics.rs

//! Diagnostics collector for the reconciliation pipeline.
//!
//! The merge and post-processing steps report conflicts, skipped renames
//! and other non-fatal findings here instead of writing to a global
//! stream, keeping those steps pure and testable. The CLI flushes the
//! collector through `tracing` at the end of each phase.

use tracing::{debug, warn};

/// How serious a collected diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Verbose trace output, hidden unless debug logging is enabled
    Debug,
    /// Something was skipped or ignored; the run continues
    Warning,
}

/// A single collected diagnostic message.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// Accumulates diagnostics during a reconciliation pass.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
        });
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            severity: Severity::Debug,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Number of collected warnings (excludes debug traces).
    pub fn warning_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    /// Emit every collected entry through tracing and clear the collector.
    pub fn flush(&mut self) {
        for entry in self.entries.drain(..) {
            match entry.severity {
                Severity::Debug => debug!("{}", entry.message),
                Severity::Warning => warn!("{}", entry.message),
            }
        }
    }
}
