//! Source compiler service
//!
//! Turns plugin source text into a compiled [`Module`]. Text errors come from
//! `wat` (with line and column); validation errors come from wasmtime (with a
//! byte offset when it reports one).

use std::fmt;
use std::path::Path;
use thiserror::Error;
use wasmtime::{Engine, Module};

/// Where in the source a diagnostic points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLocation {
    /// 1-based line and column in the source text
    LineColumn { line: usize, column: usize },
    /// Byte offset in the encoded module
    Offset(usize),
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocation::LineColumn { line, column } => write!(f, "({},{})", line, column),
            SourceLocation::Offset(offset) => write!(f, "(offset 0x{:x})", offset),
        }
    }
}

/// One compiler message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{}: {}", location, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Compilation failed; `diagnostics` is never empty
#[derive(Debug, Clone, Error)]
#[error("Compilation errors in {label}")]
pub struct CompileError {
    pub label: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileError {
    fn single(label: &str, diagnostic: Diagnostic) -> Self {
        Self {
            label: label.to_string(),
            diagnostics: vec![diagnostic],
        }
    }

    /// Header line followed by one line per diagnostic
    pub fn report(&self) -> String {
        let mut out = format!("Compilation errors in {}:", self.label);
        for diagnostic in &self.diagnostics {
            out.push('\n');
            out.push_str(&diagnostic.to_string());
        }
        out
    }
}

/// Stateless compiler bound to the plugin engine
#[derive(Clone)]
pub struct SourceCompiler {
    engine: Engine,
}

impl SourceCompiler {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Compile `source`; `label` names the file in diagnostics
    pub fn compile(&self, source: &str, label: &str) -> Result<Module, CompileError> {
        let bytes = wat::parse_str(source).map_err(|mut err| {
            err.set_path(Path::new(label));
            CompileError::single(label, text_diagnostic(&err.to_string()))
        })?;

        Module::new(&self.engine, &bytes).map_err(|err| {
            let message = err.root_cause().to_string();
            CompileError::single(label, validation_diagnostic(&message))
        })
    }
}

impl fmt::Debug for SourceCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCompiler").finish_non_exhaustive()
    }
}

/// Parse wat's rendered error:
///
/// ```text
/// unknown operator or unexpected token
///      --> plugins/bad.wat:3:5
///       |
///     3 |     (oops)
/// ```
fn text_diagnostic(rendered: &str) -> Diagnostic {
    let message = rendered.lines().next().unwrap_or(rendered).trim().to_string();
    let location = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("--> "))
        .and_then(|target| {
            let mut parts = target.rsplitn(3, ':');
            let column = parts.next()?.trim().parse().ok()?;
            let line = parts.next()?.trim().parse().ok()?;
            Some(SourceLocation::LineColumn { line, column })
        });
    Diagnostic { message, location }
}

/// Parse wasmtime's validation error, e.g.
/// `type mismatch: expected i32, found i64 (at offset 0x4a)`
fn validation_diagnostic(message: &str) -> Diagnostic {
    let marker = "(at offset 0x";
    match message.rfind(marker) {
        Some(start) => {
            let hex = &message[start + marker.len()..];
            let offset = hex
                .find(')')
                .and_then(|end| usize::from_str_radix(&hex[..end], 16).ok());
            Diagnostic {
                message: message[..start].trim_end().to_string(),
                location: offset.map(SourceLocation::Offset),
            }
        }
        None => Diagnostic {
            message: message.to_string(),
            location: None,
        },
    }
}
