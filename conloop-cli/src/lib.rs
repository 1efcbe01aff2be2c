//! conloop-cli: the interactive `conloop` console
//!
//! Wires the core registry and dispatcher to the WebAssembly plugin host,
//! registers the built-in commands and provides a terminal front end.

pub mod builtins;
pub mod config;
pub mod console;
pub mod terminal;

pub use config::{CliArgs, ConfigError, ConsoleConfig, LogFormat};
pub use console::{Console, ConsoleError, ScaffoldError};
pub use terminal::{TerminalShell, TerminalSink};
