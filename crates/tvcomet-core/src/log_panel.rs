//! Passive, user-visible system log.
//!
//! Transport problems and listener failures are reported here rather than
//! raised to the caller. Every line is mirrored to `tracing`.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{error, info, warn};

/// Default number of lines retained.
pub const DEFAULT_CAPACITY: usize = 200;

/// Severity of a panel line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelLevel {
    /// Informational (e.g. "reconnected", server log messages).
    Info,
    /// Something is wrong but recovery is under way.
    Warn,
    /// A payload or listener failed.
    Error,
}

/// One line in the panel.
#[derive(Clone, Debug)]
pub struct LogLine {
    /// When the line was written.
    pub at: DateTime<Utc>,
    /// Severity.
    pub level: PanelLevel,
    /// Text shown to the user.
    pub text: String,
}

/// Bounded ring of recent log lines.
pub struct LogPanel {
    lines: Mutex<VecDeque<LogLine>>,
    capacity: usize,
}

impl LogPanel {
    /// Create a panel holding at most `capacity` lines (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append an informational line.
    pub fn info(&self, text: impl Into<String>) {
        let text = text.into();
        info!(target: "tvcomet::panel", "{text}");
        self.push(PanelLevel::Info, text);
    }

    /// Append a warning line.
    pub fn warn(&self, text: impl Into<String>) {
        let text = text.into();
        warn!(target: "tvcomet::panel", "{text}");
        self.push(PanelLevel::Warn, text);
    }

    /// Append an error line.
    pub fn error(&self, text: impl Into<String>) {
        let text = text.into();
        error!(target: "tvcomet::panel", "{text}");
        self.push(PanelLevel::Error, text);
    }

    fn push(&self, level: PanelLevel, text: String) {
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            let _ = lines.pop_front();
        }
        lines.push_back(LogLine {
            at: Utc::now(),
            level,
            text,
        });
    }

    /// Snapshot of the retained lines, oldest first.
    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().iter().cloned().collect()
    }

    /// Text of the retained lines, oldest first.
    pub fn texts(&self) -> Vec<String> {
        self.lines.lock().iter().map(|l| l.text.clone()).collect()
    }

    /// Number of retained lines at `level`.
    pub fn count(&self, level: PanelLevel) -> usize {
        self.lines.lock().iter().filter(|l| l.level == level).count()
    }

    /// Number of retained lines.
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// Whether the panel is empty.
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

impl Default for LogPanel {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_kept_in_order() {
        let panel = LogPanel::default();
        panel.info("one");
        panel.warn("two");
        panel.error("three");
        assert_eq!(panel.texts(), vec!["one", "two", "three"]);
        assert_eq!(panel.count(PanelLevel::Warn), 1);
    }

    #[test]
    fn oldest_line_evicted_at_capacity() {
        let panel = LogPanel::new(2);
        panel.info("a");
        panel.info("b");
        panel.info("c");
        assert_eq!(panel.texts(), vec!["b", "c"]);
        assert_eq!(panel.len(), 2);
    }

    #[test]
    fn zero_capacity_clamped() {
        let panel = LogPanel::new(0);
        panel.info("only");
        assert_eq!(panel.len(), 1);
    }

    #[test]
    fn starts_empty() {
        assert!(LogPanel::default().is_empty());
    }
}
