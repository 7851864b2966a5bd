//! Logging sink for a generation pass
//!
//! Generators never print; they report through a [`LogSink`]. Any `Error` or
//! `Exception` entry marks the pass as failed, warnings never do.

use std::fmt;

/// Log severities understood by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Informational
    Message,
    /// Advisory, never fails the pass
    Warning,
    /// Fails the pass
    Error,
    /// Fails the pass, carries extra detail
    Exception,
}

impl Severity {
    /// Whether entries of this severity fail the pass
    pub fn is_error(self) -> bool {
        matches!(self, Self::Error | Self::Exception)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Message => "message",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Exception => "exception",
        })
    }
}

/// A single logged entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Severity
    pub severity: Severity,
    /// Human readable message
    pub message: String,
    /// Exception detail, if any
    pub detail: Option<String>,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

/// Destination for everything a pass reports
pub trait LogSink {
    /// Record one entry
    fn record(&mut self, entry: LogEntry);

    /// Whether any error-level entry has been recorded
    fn has_errors(&self) -> bool;

    /// Log an informational message
    fn message(&mut self, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.record(LogEntry {
            severity: Severity::Message,
            message: message.into(),
            detail: None,
        });
    }

    /// Log a warning
    fn warning(&mut self, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.record(LogEntry {
            severity: Severity::Warning,
            message: message.into(),
            detail: None,
        });
    }

    /// Log an error
    fn error(&mut self, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.record(LogEntry {
            severity: Severity::Error,
            message: message.into(),
            detail: None,
        });
    }

    /// Log an exception with detail
    fn exception(&mut self, message: impl Into<String>, detail: impl Into<String>)
    where
        Self: Sized,
    {
        self.record(LogEntry {
            severity: Severity::Exception,
            message: message.into(),
            detail: Some(detail.into()),
        });
    }
}

/// Convenience methods usable through `&mut dyn LogSink`
impl dyn LogSink + '_ {
    /// Log an informational message
    pub fn log_message(&mut self, message: impl Into<String>) {
        self.record(LogEntry {
            severity: Severity::Message,
            message: message.into(),
            detail: None,
        });
    }

    /// Log a warning
    pub fn log_warning(&mut self, message: impl Into<String>) {
        self.record(LogEntry {
            severity: Severity::Warning,
            message: message.into(),
            detail: None,
        });
    }

    /// Log an error
    pub fn log_error(&mut self, message: impl Into<String>) {
        self.record(LogEntry {
            severity: Severity::Error,
            message: message.into(),
            detail: None,
        });
    }
}

/// In-memory sink that keeps entries in order and mirrors them to `tracing`
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<LogEntry>,
}

impl Diagnostics {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries in the order they were logged
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Consume the sink
    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }

    /// Entries of one severity
    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.severity == severity)
    }

    /// Warning entries
    pub fn warnings(&self) -> impl Iterator<Item = &LogEntry> {
        self.with_severity(Severity::Warning)
    }

    /// Error and exception entries
    pub fn errors(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(|e| e.severity.is_error())
    }
}

impl LogSink for Diagnostics {
    fn record(&mut self, entry: LogEntry) {
        match entry.severity {
            Severity::Message => tracing::info!("{}", entry.message),
            Severity::Warning => tracing::warn!("{}", entry.message),
            Severity::Error => tracing::error!("{}", entry.message),
            Severity::Exception => tracing::error!(
                detail = entry.detail.as_deref().unwrap_or_default(),
                "{}",
                entry.message
            ),
        }
        self.entries.push(entry);
    }

    fn has_errors(&self) -> bool {
        self.entries.iter().any(|e| e.severity.is_error())
    }
}
