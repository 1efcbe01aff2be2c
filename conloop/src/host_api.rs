//! Capability object handed to built-ins and plugins
//!
//! A [`HostApi`] is bound to one owner at construction. Everything a plugin
//! can do to the console goes through it: register commands, write output,
//! clear the screen.

use crate::error::RegisterError;
use crate::output::{Level, OutputSink};
use crate::registry::{CommandHandler, CommandRegistry, Owner};
use crate::shell::ShellControl;
use std::sync::Arc;

#[derive(Clone)]
pub struct HostApi {
    owner: Owner,
    registry: CommandRegistry,
    sink: Arc<dyn OutputSink>,
    shell: Arc<dyn ShellControl>,
}

impl HostApi {
    pub fn new(
        owner: Owner,
        registry: CommandRegistry,
        sink: Arc<dyn OutputSink>,
        shell: Arc<dyn ShellControl>,
    ) -> Self {
        Self {
            owner,
            registry,
            sink,
            shell,
        }
    }

    /// API for built-in commands
    pub fn core(
        registry: CommandRegistry,
        sink: Arc<dyn OutputSink>,
        shell: Arc<dyn ShellControl>,
    ) -> Self {
        Self::new(Owner::Core, registry, sink, shell)
    }

    /// Same registry, sink and shell, bound to another owner
    pub fn scoped(&self, owner: Owner) -> Self {
        Self {
            owner,
            registry: self.registry.clone(),
            sink: self.sink.clone(),
            shell: self.shell.clone(),
        }
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn sink(&self) -> &Arc<dyn OutputSink> {
        &self.sink
    }

    pub fn shell(&self) -> &Arc<dyn ShellControl> {
        &self.shell
    }

    /// Register a command under this API's owner
    pub fn register_command<H>(
        &self,
        command: &str,
        handler: H,
        description: Option<&str>,
    ) -> Result<String, RegisterError>
    where
        H: CommandHandler + 'static,
    {
        self.register_handler(command, Arc::new(handler), description)
    }

    /// Register an already shared handler
    pub fn register_handler(
        &self,
        command: &str,
        handler: Arc<dyn CommandHandler>,
        description: Option<&str>,
    ) -> Result<String, RegisterError> {
        let description = description
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        let key = self
            .registry
            .register(command, handler, description, self.owner.clone())?;
        self.log(&format!("Registered command: {}", key), Level::Info);
        Ok(key)
    }

    /// Write a message attributed to this owner
    pub fn log(&self, message: &str, level: Level) {
        self.sink.write(level, self.owner.name(), message);
    }

    pub fn clear_console(&self) {
        self.shell.clear();
    }
}

impl std::fmt::Debug for HostApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostApi")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}
