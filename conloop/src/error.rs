//! Error types shared by command handlers and the registry

use thiserror::Error;

/// Failure signalled by a command handler
///
/// The dispatcher reports these to the user; none of them ends the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Missing or malformed arguments; the message carries the usage string
    #[error("{0}")]
    Usage(String),

    /// The thing the command operates on does not exist
    #[error("{0}")]
    NotFound(String),

    /// The handler ran and failed
    #[error("{0}")]
    Failed(String),
}

impl CommandError {
    /// Convenience constructor for usage errors
    pub fn usage(message: impl Into<String>) -> Self {
        CommandError::Usage(message.into())
    }

    /// Convenience constructor for not-found errors
    pub fn not_found(message: impl Into<String>) -> Self {
        CommandError::NotFound(message.into())
    }

    /// Convenience constructor for handler failures
    pub fn failed(message: impl Into<String>) -> Self {
        CommandError::Failed(message.into())
    }
}

/// Errors that can occur when registering a command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("Command name is empty")]
    EmptyName,

    #[error("Command name '{0}' contains whitespace")]
    Whitespace(String),
}
