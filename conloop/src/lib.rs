//! # conloop: extensible command console core
//!
//! The pieces every console front end shares:
//!
//! - [`CommandRegistry`]: one lock-guarded table of built-in and plugin commands
//! - [`Dispatcher`]: parses a line, resolves it (exact, suffix, ambiguous) and
//!   runs the handler, or reports suggestions
//! - [`HostApi`]: the capability object built-ins and plugins register through
//! - [`OutputSink`] and [`ShellControl`]: what the core needs from the front end
//!
//! ## Quick Start
//!
//! ```
//! use conloop::{CommandError, CommandRegistry, Dispatcher, HostApi, Level, MemorySink, SessionState};
//! use std::sync::Arc;
//!
//! let registry = CommandRegistry::new();
//! let sink = Arc::new(MemorySink::new());
//! let api = HostApi::core(registry.clone(), sink.clone(), Arc::new(SessionState::new()));
//!
//! let out = api.clone();
//! api.register_command(
//!     "ping",
//!     move |_: &[String]| -> Result<(), CommandError> {
//!         out.log("pong", Level::Plain);
//!         Ok(())
//!     },
//!     Some("Replies with pong"),
//! )
//! .unwrap();
//!
//! let dispatcher = Dispatcher::new(registry, sink.clone());
//! assert!(dispatcher.dispatch("PING").is_executed());
//! assert!(sink.contains("pong"));
//! ```

pub mod build_info;
pub mod dispatch;
pub mod error;
pub mod host_api;
pub mod output;
pub mod registry;
pub mod shell;
pub mod suggest;
pub mod tracing_support;

pub use build_info::{version_info, version_short};
pub use dispatch::{parse_line, DispatchOutcome, Dispatcher, ParsedLine};
pub use error::{CommandError, RegisterError};
pub use host_api::HostApi;
pub use output::{Level, MemorySink, OutputLine, OutputSink};
pub use registry::{
    CommandEntry, CommandHandler, CommandRegistry, Owner, RegistryView, Resolution, CORE_OWNER,
    NO_DESCRIPTION,
};
pub use shell::{SessionState, ShellControl};
pub use suggest::{levenshtein, suggest, Suggestion, MAX_SUGGESTIONS};
pub use tracing_support::{init_subscriber_with_config, TracingConfig, TracingFormat};
