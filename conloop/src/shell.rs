//! Control surface of the interactive shell
//!
//! The shell owns the input line and the visible output area. The core only
//! needs to ask it to clear the output and to end the session.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Requests the core can make of the shell
pub trait ShellControl: Send + Sync {
    /// Clear the visible console output
    fn clear(&self);

    /// End the interactive session
    fn close(&self);

    /// Whether `close` has been requested
    fn is_closed(&self) -> bool;
}

/// Plain session state: records clear/close requests
#[derive(Debug, Default)]
pub struct SessionState {
    closed: AtomicBool,
    clears: AtomicUsize,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of clear requests seen so far
    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl ShellControl for SessionState {
    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
