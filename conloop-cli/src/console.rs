//! Console wiring
//!
//! A [`Console`] owns one registry, the plugin manager that feeds it and the
//! dispatcher that reads it. Front ends supply the sink and the shell.

use crate::builtins;
use crate::config::{ConfigError, ConsoleConfig};
use conloop::{
    CommandRegistry, DispatchOutcome, Dispatcher, HostApi, Level, OutputSink, RegisterError,
    ShellControl,
};
use conloop_plugin_api::scaffold::PluginScaffold;
use conloop_plugin_host::{LoaderError, PluginManager, MAX_NAME_LEN};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Errors building a console
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("plugin runtime unavailable: {0}")]
    Runtime(#[from] LoaderError),

    #[error("built-in command rejected: {0}")]
    Builtin(#[from] RegisterError),
}

/// Errors writing a starter plugin
#[derive(Debug, Error)]
pub enum ScaffoldError {
    #[error("'{0}' is not a valid plugin name (1-32 characters, no whitespace)")]
    InvalidName(String),

    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct Console {
    config: ConsoleConfig,
    api: HostApi,
    manager: Arc<PluginManager>,
    dispatcher: Dispatcher,
}

impl Console {
    pub fn new(
        config: ConsoleConfig,
        sink: Arc<dyn OutputSink>,
        shell: Arc<dyn ShellControl>,
    ) -> Result<Self, ConsoleError> {
        config.validate()?;

        let registry = CommandRegistry::new();
        let api = HostApi::core(registry.clone(), sink.clone(), shell);
        let manager = Arc::new(PluginManager::new(api.clone(), config.manager_config())?);
        builtins::register(&api, &manager)?;

        tracing::debug!(
            plugins_dir = %config.plugins_dir.display(),
            builtins = registry.len(),
            "Console ready"
        );

        Ok(Self {
            dispatcher: Dispatcher::new(registry, sink),
            config,
            api,
            manager,
        })
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn api(&self) -> &HostApi {
        &self.api
    }

    pub fn registry(&self) -> &CommandRegistry {
        self.api.registry()
    }

    pub fn manager(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    /// Prepare the plugins directory and start the background load
    ///
    /// Must be called from within a tokio runtime when autoload is on.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if self.config.create_dir {
            if let Err(e) = self.manager.prepare_directory() {
                tracing::warn!(error = %e, "Plugins directory unavailable");
            }
        }

        self.config.autoload.then(|| self.spawn_plugin_load())
    }

    /// Load all plugins on the blocking pool
    ///
    /// Commands typed meanwhile see whatever has been registered so far.
    pub fn spawn_plugin_load(&self) -> JoinHandle<()> {
        let manager = self.manager.clone();
        let api = self.api.clone();

        tokio::spawn(async move {
            match tokio::task::spawn_blocking(move || manager.load_all()).await {
                Ok(Ok(report)) => {
                    tracing::debug!(loaded = report.loaded.len(), "Background load finished");
                    api.log("Plugin loading completed.", Level::Info);
                }
                Ok(Err(e)) => {
                    api.log(&format!("Error during plugin loading: {}", e), Level::Error);
                }
                Err(e) => {
                    api.log(&format!("Error during plugin loading: {}", e), Level::Error);
                }
            }
        })
    }

    /// Run one input line
    pub fn execute(&self, line: &str) -> DispatchOutcome {
        self.dispatcher.dispatch(line)
    }

    pub fn is_closed(&self) -> bool {
        self.api.shell().is_closed()
    }

    /// Write the starter plugin `<name>.<extension>` into the plugins directory
    pub fn write_starter_plugin(&self, name: &str) -> Result<PathBuf, ScaffoldError> {
        if name.is_empty()
            || name.chars().count() > MAX_NAME_LEN
            || name.chars().any(char::is_whitespace)
        {
            return Err(ScaffoldError::InvalidName(name.to_string()));
        }

        let dir = &self.config.plugins_dir;
        let path = dir.join(format!("{}.{}", name.to_lowercase(), self.config.extension));
        if path.exists() {
            return Err(ScaffoldError::AlreadyExists(path));
        }

        let io_error = |source| ScaffoldError::Io {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(dir).map_err(io_error)?;
        std::fs::write(&path, PluginScaffold::starter(name).render()).map_err(io_error)?;

        tracing::info!(plugin = %name, path = %path.display(), "Starter plugin written");
        Ok(path)
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("config", &self.config)
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}
