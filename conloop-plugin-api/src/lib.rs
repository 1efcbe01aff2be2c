//! conloop-plugin-api: Shared ABI for conloop plugins
//!
//! This crate defines the protocol between the console host and guest plugins.
//! Plugins are WebAssembly text (`.wat`) files compiled by the host at run time.
//! Strings cross the boundary as packed `(ptr << 32) | len` pairs pointing into
//! the guest's exported linear memory; the manifest is a UTF-8 JSON document.

use serde::{Deserialize, Serialize};

pub mod scaffold;

/// API version for compatibility checking
pub const API_VERSION: u32 = 1;

/// Import module name under which the host API is linked
pub const HOST_MODULE: &str = "console";

/// Names of the functions a plugin must export
pub mod exports {
    /// Linear memory shared with the host
    pub const MEMORY: &str = "memory";
    /// `() -> i64`: packed pointer to the JSON manifest
    pub const MANIFEST: &str = "plugin_manifest";
    /// `() -> i32`: Initialize, 0 on success
    pub const INIT: &str = "plugin_init";
    /// `(handler_id: i32) -> i32`: run a registered command, 0 on success
    pub const INVOKE: &str = "plugin_invoke";
}

/// Names of the host functions available under [`HOST_MODULE`]
pub mod imports {
    /// `(name_ptr, name_len, desc_ptr, desc_len, handler_id)`
    pub const REGISTER_COMMAND: &str = "register_command";
    /// `(ptr, len, level)`
    pub const LOG: &str = "log";
    /// `()`
    pub const CLEAR_CONSOLE: &str = "clear_console";
    /// `() -> i32`
    pub const ARG_COUNT: &str = "arg_count";
    /// `(index) -> i32`, -1 when out of range
    pub const ARG_LEN: &str = "arg_len";
    /// `(index, dst_ptr, dst_cap) -> i32`, bytes copied or -1
    pub const ARG_READ: &str = "arg_read";
    /// `(ptr, len)`: mark the current call as failed
    pub const FAIL: &str = "fail";
}

/// Output level codes accepted by the `log` import
pub mod level {
    pub const PLAIN: i32 = 0;
    pub const DETAIL: i32 = 1;
    pub const INFO: i32 = 2;
    pub const SUCCESS: i32 = 3;
    pub const WARNING: i32 = 4;
    pub const ERROR: i32 = 5;
}

/// Plugin manifest returned by the plugin's `plugin_manifest()` export
///
/// `name`, `version` and `description` are the plugin's identity; `commands`
/// is the self-reported command list (informational only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// API version for compatibility
    #[serde(default = "default_api_version")]
    pub api_version: u32,

    /// Plugin name (1-32 chars, no whitespace)
    #[serde(default)]
    pub name: String,

    /// Plugin version
    #[serde(default)]
    pub version: String,

    /// Short description for `pinfo`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Declared command names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
}

fn default_api_version() -> u32 {
    API_VERSION
}

impl PluginManifest {
    /// Create a new manifest
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            api_version: API_VERSION,
            name: name.into(),
            version: version.into(),
            description: None,
            commands: Vec::new(),
        }
    }

    /// Add description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare a command
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.commands.push(command.into());
        self
    }

    /// Parse a manifest from guest memory
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Serialize to the JSON form embedded in plugin sources
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Pack ptr and len into a single i64
#[inline]
pub fn pack_ptr_len(ptr: i32, len: i32) -> i64 {
    ((ptr as i64) << 32) | (len as i64 & 0xFFFFFFFF)
}

/// Unpack ptr and len from a packed i64
#[inline]
pub fn unpack_ptr_len(packed: i64) -> (i32, i32) {
    let ptr = (packed >> 32) as i32;
    let len = (packed & 0xFFFFFFFF) as i32;
    (ptr, len)
}
