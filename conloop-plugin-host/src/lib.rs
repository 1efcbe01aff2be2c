//! conloop-plugin-host: WebAssembly text plugin host for conloop
//!
//! Discovers `.wat` files in a plugins directory, compiles them at run time,
//! checks them against the plugin contract and merges the commands they
//! register into the console's command registry.

pub mod bridge;
pub mod compiler;
pub mod discovery;
pub mod loader;
pub mod manager;

pub use bridge::WasmCommand;
pub use compiler::{CompileError, Diagnostic, SourceCompiler, SourceLocation};
pub use discovery::{default_plugin_dir, discover, DiscoveryError, DEFAULT_EXTENSION};
pub use loader::{
    plugin_engine, ContractError, LoadedPlugin, LoaderError, PluginInstance, PluginLoader,
    DEFAULT_FUEL,
};
pub use manager::{
    LoadReport, ManagerConfig, PluginInfo, PluginLoadError, PluginManager, ValidationError,
    MAX_NAME_LEN,
};
pub use conloop_plugin_api::PluginManifest;
