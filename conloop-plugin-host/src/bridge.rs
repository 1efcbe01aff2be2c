//! Bridge between wasm plugins and the command registry
//!
//! Each command a plugin registers becomes a [`WasmCommand`]: a handler that
//! calls back into the plugin's `plugin_invoke` export with its handler id.

use crate::loader::PluginInstance;
use conloop::{CommandError, CommandHandler};
use parking_lot::Mutex;
use std::sync::Weak;

/// A registry handler backed by a plugin instance
///
/// Holds only a weak reference: once the plugin is disabled or reloaded the
/// instance is dropped and the handler reports that instead of running.
#[derive(Clone)]
pub struct WasmCommand {
    instance: Weak<Mutex<PluginInstance>>,
    handler_id: i32,
    plugin: String,
}

impl WasmCommand {
    pub fn new(instance: Weak<Mutex<PluginInstance>>, handler_id: i32, plugin: String) -> Self {
        Self {
            instance,
            handler_id,
            plugin,
        }
    }

    pub fn handler_id(&self) -> i32 {
        self.handler_id
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Whether the backing instance is still loaded
    pub fn is_live(&self) -> bool {
        self.instance.strong_count() > 0
    }
}

impl CommandHandler for WasmCommand {
    fn call(&self, args: &[String]) -> Result<(), CommandError> {
        let instance = self.instance.upgrade().ok_or_else(|| {
            CommandError::failed(format!("plugin {} is no longer loaded", self.plugin))
        })?;

        let mut instance = instance.lock();
        instance.invoke(self.handler_id, args).map_err(|e| {
            tracing::debug!(
                plugin = %self.plugin,
                handler_id = self.handler_id,
                error = %e,
                "Plugin command failed"
            );
            CommandError::failed(e.to_string())
        })
    }
}

impl std::fmt::Debug for WasmCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmCommand")
            .field("plugin", &self.plugin)
            .field("handler_id", &self.handler_id)
            .field("live", &self.is_live())
            .finish()
    }
}
