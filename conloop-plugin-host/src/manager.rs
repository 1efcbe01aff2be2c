//! Live plugin set
//!
//! The manager owns every loaded plugin and runs the per-file pipeline:
//! read, compile, contract check, instantiate, validate, initialize. A file
//! that fails any step is reported and skipped; nothing from it stays in the
//! live set or the command registry.

use crate::compiler::{CompileError, SourceCompiler};
use crate::discovery::{discover, file_label, find_by_stem, DiscoveryError, DEFAULT_EXTENSION};
use crate::loader::{
    plugin_engine, ContractError, LoaderError, PluginInstance, PluginLoader, DEFAULT_FUEL,
};
use chrono::{DateTime, Local};
use conloop::{HostApi, Level, Owner};
use conloop_plugin_api::PluginManifest;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Longest accepted plugin name, in characters
pub const MAX_NAME_LEN: usize = 32;

/// Manifest rule violations, checked in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Plugin {name} does not specify a version.")]
    MissingVersion { name: String },

    #[error("Plugin in {file} has empty name.")]
    EmptyName { file: String },

    #[error("Plugin name '{name}' exceeds 32 characters.")]
    NameTooLong { name: String },

    #[error("Plugin name '{name}' contains whitespace.")]
    NameContainsWhitespace { name: String },

    #[error("Plugin name '{name}' is already used by another plugin.")]
    DuplicateName { name: String },
}

/// Why a plugin file was not loaded
///
/// The display text is the line reported to the console.
#[derive(Debug, Error)]
pub enum PluginLoadError {
    #[error("Error loading plugin from {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{}", .0.report())]
    Compile(#[from] CompileError),

    #[error("No valid plugin contract found in {file}: {source}")]
    Contract {
        file: String,
        #[source]
        source: ContractError,
    },

    #[error("Error loading plugin from {file}: {source}")]
    Load {
        file: String,
        #[source]
        source: LoaderError,
    },

    #[error("Error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Error: Plugin {plugin} failed to initialize: {source}")]
    Init {
        plugin: String,
        #[source]
        source: LoaderError,
    },

    #[error("Plugin file for {0} not found in plugins directory.")]
    FileNotFound(String),

    #[error("{0}")]
    Discovery(#[from] DiscoveryError),
}

impl PluginLoadError {
    fn from_loader(file: &str, error: LoaderError) -> Self {
        match error {
            LoaderError::Contract(source) => PluginLoadError::Contract {
                file: file.to_string(),
                source,
            },
            source => PluginLoadError::Load {
                file: file.to_string(),
                source,
            },
        }
    }
}

/// Where and how plugins are loaded
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub plugins_dir: PathBuf,
    /// File extension without the dot
    pub extension: String,
    /// Fuel per guest call
    pub fuel: u64,
}

impl ManagerConfig {
    pub fn new(plugins_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
            extension: DEFAULT_EXTENSION.to_string(),
            fuel: DEFAULT_FUEL,
        }
    }
}

/// A plugin in the live set
struct Plugin {
    name: String,
    version: String,
    description: Option<String>,
    declared_commands: Vec<String>,
    source: PathBuf,
    loaded_at: DateTime<Local>,
    // Dropping this releases the module; registered commands only hold a Weak.
    _instance: Arc<Mutex<PluginInstance>>,
}

/// Snapshot of a loaded plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    /// Commands the manifest declares
    pub declared_commands: Vec<String>,
    /// Registry keys the plugin currently owns
    pub registered_commands: Vec<String>,
    /// Always true for plugins in the live set
    pub enabled: bool,
    pub source: PathBuf,
    pub loaded_at: DateTime<Local>,
}

/// Outcome of a bulk load
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<PluginInfo>,
    pub failed: Vec<(PathBuf, PluginLoadError)>,
}

impl LoadReport {
    /// Returns true if every discovered file loaded
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total_found(&self) -> usize {
        self.loaded.len() + self.failed.len()
    }
}

/// Owner of the live plugin set
pub struct PluginManager {
    compiler: SourceCompiler,
    loader: PluginLoader,
    api: HostApi,
    config: ManagerConfig,
    plugins: Mutex<Vec<Plugin>>,
    /// Serializes bulk loads and enables
    load_lock: Mutex<()>,
}

impl PluginManager {
    /// `api` is the core API; plugins get copies scoped to their own name
    pub fn new(api: HostApi, config: ManagerConfig) -> Result<Self, LoaderError> {
        let engine = plugin_engine()?;
        Ok(Self {
            compiler: SourceCompiler::new(engine.clone()),
            loader: PluginLoader::new(engine, config.fuel)?,
            api,
            config,
            plugins: Mutex::new(Vec::new()),
            load_lock: Mutex::new(()),
        })
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.config.plugins_dir
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Create the plugins directory if needed and report where it is
    pub fn prepare_directory(&self) -> std::io::Result<()> {
        let dir = &self.config.plugins_dir;
        match std::fs::create_dir_all(dir) {
            Ok(()) => {
                self.api
                    .log(&format!("Plugin directory: {}", dir.display()), Level::Info);
                Ok(())
            }
            Err(e) => {
                self.api
                    .log(&format!("Error creating plugin directory: {}", e), Level::Error);
                Err(e)
            }
        }
    }

    /// Replace the live set with whatever the plugins directory holds now
    ///
    /// Every plugin-owned command is purged first. A missing directory is
    /// reported and yields an empty report; an unreadable one is an error.
    /// Concurrent calls run one after the other.
    pub fn load_all(&self) -> Result<LoadReport, PluginLoadError> {
        let _serial = self.load_lock.lock();
        {
            let mut plugins = self.plugins.lock();
            let unloaded = plugins.len();
            plugins.clear();
            let purged = self.api.registry().purge_plugins();
            tracing::debug!(unloaded, purged, "Live plugin set cleared");
        }

        let files = match discover(&self.config.plugins_dir, &self.config.extension) {
            Ok(files) => files,
            Err(e @ DiscoveryError::DirectoryNotFound(_)) => {
                self.api.log(&e.to_string(), Level::Error);
                return Ok(LoadReport::default());
            }
            Err(e) => return Err(e.into()),
        };

        if files.is_empty() {
            self.api
                .log("No plugins found in plugins directory.", Level::Warning);
        }

        let mut report = LoadReport::default();
        for path in files {
            match self.load_file(&path, "Loaded") {
                Ok(info) => report.loaded.push(info),
                Err(e) => {
                    self.report_failure(&path, &e);
                    report.failed.push((path, e));
                }
            }
        }

        tracing::info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            dir = %self.config.plugins_dir.display(),
            "Plugin load finished"
        );
        Ok(report)
    }

    /// Load the plugin file whose stem matches `name`, adding to the live set
    pub fn enable(&self, name: &str) -> Result<PluginInfo, PluginLoadError> {
        let _serial = self.load_lock.lock();
        let path = match find_by_stem(&self.config.plugins_dir, &self.config.extension, name) {
            Ok(Some(path)) => path,
            Ok(None) => {
                let e = PluginLoadError::FileNotFound(name.to_string());
                self.api.log(&e.to_string(), Level::Error);
                return Err(e);
            }
            Err(e) => {
                let e = PluginLoadError::from(e);
                self.api.log(&e.to_string(), Level::Error);
                return Err(e);
            }
        };

        self.load_file(&path, "Enabled")
            .inspect_err(|e| self.report_failure(&path, e))
    }

    /// Remove a plugin from the live set and purge its commands
    pub fn disable(&self, name: &str) -> bool {
        let mut plugins = self.plugins.lock();
        let Some(index) = plugins.iter().position(|p| same_name(&p.name, name)) else {
            drop(plugins);
            self.api
                .log(&format!("No plugin {} found.", name), Level::Error);
            return false;
        };

        let plugin = plugins.remove(index);
        let purged = self.api.registry().purge_owner(&plugin.name);
        drop(plugins);

        tracing::info!(plugin = %plugin.name, purged, "Plugin disabled");
        self.api
            .log(&format!("Disabled plugin: {}", plugin.name), Level::Warning);
        true
    }

    /// Snapshot of the live set, in load order
    pub fn plugins(&self) -> Vec<PluginInfo> {
        let plugins = self.plugins.lock();
        plugins.iter().map(|p| self.info(p)).collect()
    }

    /// Loaded plugin by name (case-insensitive)
    pub fn find(&self, name: &str) -> Option<PluginInfo> {
        let plugins = self.plugins.lock();
        plugins
            .iter()
            .find(|p| same_name(&p.name, name))
            .map(|p| self.info(p))
    }

    pub fn len(&self) -> usize {
        self.plugins.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.lock().is_empty()
    }

    fn info(&self, plugin: &Plugin) -> PluginInfo {
        PluginInfo {
            name: plugin.name.clone(),
            version: plugin.version.clone(),
            description: plugin.description.clone(),
            declared_commands: plugin.declared_commands.clone(),
            registered_commands: self.api.registry().keys_of(&plugin.name),
            enabled: true,
            source: plugin.source.clone(),
            loaded_at: plugin.loaded_at,
        }
    }

    /// Run the whole pipeline for one file
    fn load_file(&self, path: &Path, verb: &str) -> Result<PluginInfo, PluginLoadError> {
        let file = file_label(path);
        self.api.log(
            &format!("Attempting to load plugin from: {}", file),
            Level::Info,
        );

        let source = std::fs::read_to_string(path).map_err(|source| PluginLoadError::Io {
            file: file.clone(),
            source,
        })?;

        // Compile and instantiate without holding any lock.
        let module = self.compiler.compile(&source, &file)?;
        let loaded = self
            .loader
            .load(&module)
            .map_err(|e| PluginLoadError::from_loader(&file, e))?;

        let mut plugins = self.plugins.lock();
        validate(&loaded.manifest, &file, &plugins)?;

        let name = loaded.manifest.name.clone();
        let init = {
            let mut instance = loaded.instance.lock();
            instance.bind(self.api.scoped(Owner::plugin(name.clone())));
            instance.init()
        };
        if let Err(source) = init {
            let purged = self.api.registry().purge_owner(&name);
            tracing::debug!(plugin = %name, purged, "Partial registrations purged");
            return Err(PluginLoadError::Init {
                plugin: name,
                source,
            });
        }

        let PluginManifest {
            version,
            description,
            commands,
            ..
        } = loaded.manifest;
        let plugin = Plugin {
            name,
            version,
            description,
            declared_commands: commands,
            source: path.to_path_buf(),
            loaded_at: Local::now(),
            _instance: loaded.instance,
        };
        let info = self.info(&plugin);
        plugins.push(plugin);
        drop(plugins);

        tracing::info!(plugin = %info.name, path = %path.display(), "Plugin loaded");
        self.api.log(
            &format!("{} plugin: {} v{}", verb, info.name, info.version),
            Level::Success,
        );
        Ok(info)
    }

    fn report_failure(&self, path: &Path, error: &PluginLoadError) {
        tracing::warn!(path = %path.display(), error = %error, "Plugin not loaded");
        self.api.log(&error.to_string(), Level::Error);
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("config", &self.config)
            .field("plugins", &self.len())
            .finish_non_exhaustive()
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Manifest rules, first failure wins
fn validate(manifest: &PluginManifest, file: &str, live: &[Plugin]) -> Result<(), ValidationError> {
    let name = &manifest.name;

    if manifest.version.is_empty() {
        return Err(ValidationError::MissingVersion { name: name.clone() });
    }
    if name.is_empty() {
        return Err(ValidationError::EmptyName {
            file: file.to_string(),
        });
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong { name: name.clone() });
    }
    if name.chars().any(char::is_whitespace) {
        return Err(ValidationError::NameContainsWhitespace { name: name.clone() });
    }
    if live.iter().any(|p| same_name(&p.name, name)) {
        return Err(ValidationError::DuplicateName { name: name.clone() });
    }
    Ok(())
}
