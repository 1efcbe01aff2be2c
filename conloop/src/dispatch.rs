//! Line parsing, command resolution and invocation
//!
//! The dispatcher is the only caller of command handlers. It never holds the
//! registry lock while a handler runs, so handlers are free to register more
//! commands.

use crate::error::CommandError;
use crate::output::{Level, OutputSink};
use crate::registry::{CommandEntry, CommandRegistry, Resolution, CORE_OWNER};
use crate::suggest::{suggest, Suggestion};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// A command line split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    /// First token, lowercased
    pub command: String,
    /// Remaining tokens, case preserved
    pub args: Vec<String>,
}

/// Split a raw line on whitespace; `None` for blank input
pub fn parse_line(line: &str) -> Option<ParsedLine> {
    let mut tokens = line.split_whitespace();
    let command = tokens.next()?.to_lowercase();
    Some(ParsedLine {
        command,
        args: tokens.map(str::to_string).collect(),
    })
}

/// What happened to one input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Blank line, nothing done
    Empty,
    /// Handler ran to completion
    Executed { key: String },
    /// Handler reported an error or panicked
    Failed { key: String, error: CommandError },
    /// Several plugins define the command; display names of the candidates
    Ambiguous { input: String, candidates: Vec<String> },
    /// Nothing matched
    NotRecognized {
        input: String,
        suggestions: Vec<Suggestion>,
    },
}

impl DispatchOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, DispatchOutcome::Executed { .. })
    }
}

/// Resolves lines against a registry and reports to a sink
#[derive(Clone)]
pub struct Dispatcher {
    registry: CommandRegistry,
    sink: Arc<dyn OutputSink>,
}

impl Dispatcher {
    pub fn new(registry: CommandRegistry, sink: Arc<dyn OutputSink>) -> Self {
        Self { registry, sink }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Execute one input line
    pub fn dispatch(&self, line: &str) -> DispatchOutcome {
        let Some(parsed) = parse_line(line) else {
            return DispatchOutcome::Empty;
        };

        tracing::trace!(command = %parsed.command, args = parsed.args.len(), "Dispatching");

        match self.registry.resolve(&parsed.command) {
            Resolution::Found(entry) => self.invoke(entry, &parsed.args),
            Resolution::Ambiguous(entries) => self.report_ambiguous(&parsed.command, &entries),
            Resolution::NotFound => self.report_not_recognized(&parsed.command),
        }
    }

    fn invoke(&self, entry: CommandEntry, args: &[String]) -> DispatchOutcome {
        let handler = entry.handler.clone();
        let result = catch_unwind(AssertUnwindSafe(|| handler.call(args)))
            .unwrap_or_else(|panic| Err(CommandError::failed(panic_message(&*panic))));

        match result {
            Ok(()) => DispatchOutcome::Executed { key: entry.key },
            Err(error) => {
                tracing::debug!(key = %entry.key, error = %error, "Command failed");
                let text = match &error {
                    CommandError::Failed(msg) => {
                        format!("Error: Command '{}' failed: {}", entry.key, msg)
                    }
                    CommandError::Usage(msg) | CommandError::NotFound(msg) => {
                        format!("Error: {}", msg)
                    }
                };
                self.sink.write(Level::Error, CORE_OWNER, &text);
                DispatchOutcome::Failed {
                    key: entry.key,
                    error,
                }
            }
        }
    }

    fn report_ambiguous(&self, input: &str, entries: &[CommandEntry]) -> DispatchOutcome {
        self.sink.write(
            Level::Error,
            CORE_OWNER,
            &format!(
                "Error: Ambiguous command '{}'. Several plugins define this command. Use one of the following:",
                input
            ),
        );

        let candidates: Vec<String> = entries
            .iter()
            .map(|e| {
                if e.owner.is_core() {
                    e.key.clone()
                } else {
                    format!("{}:{}", e.owner, e.base_name())
                }
            })
            .collect();

        for (name, entry) in candidates.iter().zip(entries) {
            self.sink.write(
                Level::Warning,
                CORE_OWNER,
                &format!(
                    "  {} - {} [{}]",
                    name,
                    entry.description_or_default(),
                    entry.owner
                ),
            );
        }

        DispatchOutcome::Ambiguous {
            input: input.to_string(),
            candidates,
        }
    }

    fn report_not_recognized(&self, input: &str) -> DispatchOutcome {
        self.sink.write(
            Level::Error,
            CORE_OWNER,
            &format!("Error: Command '{}' not recognized.", input),
        );

        let suggestions = suggest(&self.registry.view(), input);
        if !suggestions.is_empty() {
            self.sink
                .write(Level::Warning, CORE_OWNER, "Did you mean one of these commands?");
            for s in &suggestions {
                self.sink.write(
                    Level::Warning,
                    CORE_OWNER,
                    &format!("  {} - {} [{}]", s.name, s.description, s.owner),
                );
            }
        }
        self.sink.write(
            Level::Warning,
            CORE_OWNER,
            "Type 'help' for a full list of available commands.",
        );

        DispatchOutcome::NotRecognized {
            input: input.to_string(),
            suggestions,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
