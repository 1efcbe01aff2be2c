//! Terminal front end: colored stdout sink and shell control

use anstyle::{AnsiColor, Style};
use conloop::{Level, OutputLine, OutputSink, SessionState, ShellControl};
use std::io::{IsTerminal, Write};

/// Style used for each output level
pub fn level_style(level: Level) -> Style {
    let color = match level {
        Level::Plain => return Style::new(),
        Level::Detail => AnsiColor::BrightBlack,
        Level::Info => AnsiColor::Cyan,
        Level::Success => AnsiColor::Green,
        Level::Warning => AnsiColor::Yellow,
        Level::Error => AnsiColor::Red,
    };
    Style::new().fg_color(Some(color.into()))
}

/// Writes console lines to stdout
#[derive(Debug, Clone, Copy)]
pub struct TerminalSink {
    color: bool,
}

impl TerminalSink {
    /// Color only when stdout is a terminal
    pub fn new() -> Self {
        Self::with_color(std::io::stdout().is_terminal())
    }

    pub fn with_color(color: bool) -> Self {
        Self { color }
    }

    /// Render one line as it appears on the terminal
    pub fn render(&self, line: &OutputLine) -> String {
        if !self.color {
            return line.text.clone();
        }
        let style = level_style(line.level);
        format!("{}{}{}", style.render(), line.text, style.render_reset())
    }
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for TerminalSink {
    fn emit(&self, line: OutputLine) {
        let mut out = std::io::stdout().lock();
        // A closed stdout has nowhere to report to.
        let _ = writeln!(out, "{}", self.render(&line));
        let _ = out.flush();
    }
}

/// Shell control for an interactive terminal
#[derive(Debug, Default)]
pub struct TerminalShell {
    state: SessionState,
}

impl TerminalShell {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ShellControl for TerminalShell {
    fn clear(&self) {
        self.state.clear();
        if std::io::stdout().is_terminal() {
            let mut out = std::io::stdout().lock();
            let _ = write!(out, "\x1b[2J\x1b[H");
            let _ = out.flush();
        }
    }

    fn close(&self) {
        self.state.close();
    }

    fn is_closed(&self) -> bool {
        self.state.is_closed()
    }
}
