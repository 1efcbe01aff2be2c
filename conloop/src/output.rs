//! Leveled output lines and the sinks that receive them
//!
//! Everything the console shows to the user (command output, load reports,
//! dispatch errors) is an [`OutputLine`] handed to an [`OutputSink`]. How a
//! line is rendered (color, prefix, widget) is the sink's business.

use parking_lot::RwLock;
use std::fmt;

/// Severity/style of an output line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    /// Ordinary command output
    Plain,
    /// Secondary detail (list rows, key/value lines)
    Detail,
    /// Informational notices and headers
    Info,
    /// Completed operations
    Success,
    /// Warnings, candidate lists, suggestions
    Warning,
    /// Errors
    Error,
}

impl Level {
    /// Map a plugin ABI level code; unknown codes are plain output
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Level::Detail,
            2 => Level::Info,
            3 => Level::Success,
            4 => Level::Warning,
            5 => Level::Error,
            _ => Level::Plain,
        }
    }

    /// ABI level code for this level
    pub fn code(self) -> i32 {
        match self {
            Level::Plain => 0,
            Level::Detail => 1,
            Level::Info => 2,
            Level::Success => 3,
            Level::Warning => 4,
            Level::Error => 5,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Plain => "plain",
            Level::Detail => "detail",
            Level::Info => "info",
            Level::Success => "success",
            Level::Warning => "warning",
            Level::Error => "error",
        };
        f.write_str(name)
    }
}

/// One line of console output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    /// Level of the line
    pub level: Level,
    /// Who produced it: a plugin name or `Core`
    pub source: String,
    /// Text without trailing newline
    pub text: String,
}

impl OutputLine {
    pub fn new(level: Level, source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            level,
            source: source.into(),
            text: text.into(),
        }
    }
}

/// Destination for console output
///
/// Implementations must be callable from the background loader and from
/// command handlers concurrently.
pub trait OutputSink: Send + Sync {
    /// Emit one line
    fn emit(&self, line: OutputLine);

    /// Emit `text` as one or more lines, splitting on newlines
    fn write(&self, level: Level, source: &str, text: &str) {
        for part in text.split('\n') {
            self.emit(OutputLine::new(level, source, part));
        }
    }
}

/// In-memory sink, for tests and for embedding hosts that render later
pub struct MemorySink {
    lines: RwLock<Vec<OutputLine>>,
    max_lines: usize,
}

impl MemorySink {
    /// Create a new memory sink with default capacity (10000 lines)
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    /// Create a new memory sink with specified capacity
    pub fn with_capacity(max_lines: usize) -> Self {
        Self {
            lines: RwLock::new(Vec::with_capacity(max_lines.min(1000))),
            max_lines,
        }
    }

    /// All recorded lines
    pub fn lines(&self) -> Vec<OutputLine> {
        self.lines.read().clone()
    }

    /// Text of all recorded lines
    pub fn texts(&self) -> Vec<String> {
        self.lines.read().iter().map(|l| l.text.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.lines.read().len()
    }

    pub fn clear(&self) {
        self.lines.write().clear();
    }

    /// Lines produced by the given source
    pub fn find_by_source(&self, source: &str) -> Vec<OutputLine> {
        self.lines
            .read()
            .iter()
            .filter(|l| l.source == source)
            .cloned()
            .collect()
    }

    /// Lines at the given level
    pub fn find_by_level(&self, level: Level) -> Vec<OutputLine> {
        self.lines
            .read()
            .iter()
            .filter(|l| l.level == level)
            .cloned()
            .collect()
    }

    /// Whether any line contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.read().iter().any(|l| l.text.contains(needle))
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for MemorySink {
    fn emit(&self, line: OutputLine) {
        let mut lines = self.lines.write();
        if lines.len() >= self.max_lines {
            lines.remove(0); // FIFO eviction
        }
        lines.push(line);
    }
}

impl fmt::Debug for MemorySink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySink")
            .field("count", &self.count())
            .field("max_lines", &self.max_lines)
            .finish()
    }
}
