//! Console configuration
//!
//! Command-line flags (with environment fallbacks) are parsed by clap into
//! [`CliArgs`], then turned into a validated [`ConsoleConfig`].

use clap::{Parser, ValueEnum};
use conloop::{TracingConfig, TracingFormat};
use conloop_plugin_host::{default_plugin_dir, ManagerConfig, DEFAULT_EXTENSION, DEFAULT_FUEL};
use std::path::PathBuf;
use thiserror::Error;

/// Application name, used for the fallback data directory
pub const APP_NAME: &str = "conloop";

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("plugin extension must not be empty")]
    EmptyExtension,

    #[error("plugin extension '{0}' must not contain '.' or path separators")]
    InvalidExtension(String),

    #[error("fuel per call must be greater than zero")]
    ZeroFuel,
}

/// Runtime settings of one console
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    pub plugins_dir: PathBuf,
    /// Plugin file extension without the dot
    pub extension: String,
    /// Fuel granted to each guest call
    pub fuel: u64,
    /// Load plugins in the background at startup
    pub autoload: bool,
    /// Create the plugins directory at startup if missing
    pub create_dir: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            plugins_dir: default_plugin_dir(APP_NAME),
            extension: DEFAULT_EXTENSION.to_string(),
            fuel: DEFAULT_FUEL,
            autoload: true,
            create_dir: true,
        }
    }
}

impl ConsoleConfig {
    /// Defaults with a specific plugins directory
    pub fn with_plugins_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            plugins_dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extension.is_empty() {
            return Err(ConfigError::EmptyExtension);
        }
        if self
            .extension
            .chars()
            .any(|c| c == '.' || std::path::is_separator(c))
        {
            return Err(ConfigError::InvalidExtension(self.extension.clone()));
        }
        if self.fuel == 0 {
            return Err(ConfigError::ZeroFuel);
        }
        Ok(())
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            plugins_dir: self.plugins_dir.clone(),
            extension: self.extension.clone(),
            fuel: self.fuel,
        }
    }
}

/// Diagnostic log format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl From<LogFormat> for TracingFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Pretty => TracingFormat::Pretty,
            LogFormat::Compact => TracingFormat::Compact,
            LogFormat::Json => TracingFormat::Json,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "conloop", about = "Extensible command console with WebAssembly plugins")]
#[command(version)]
pub struct CliArgs {
    /// Directory scanned for plugin sources
    #[arg(long, env = "CONLOOP_PLUGINS_DIR")]
    pub plugins_dir: Option<PathBuf>,

    /// Plugin file extension
    #[arg(long, default_value = DEFAULT_EXTENSION)]
    pub extension: String,

    /// Fuel units per plugin call
    #[arg(long, env = "CONLOOP_FUEL", default_value_t = DEFAULT_FUEL)]
    pub fuel: u64,

    /// Do not load plugins at startup
    #[arg(long)]
    pub no_autoload: bool,

    /// Do not create the plugins directory
    #[arg(long)]
    pub no_create_dir: bool,

    /// Diagnostic log format (stderr)
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Diagnostic log level; overrides RUST_LOG
    #[arg(long)]
    pub log_level: Option<tracing::Level>,

    /// Run this line after plugins load, then exit (repeatable)
    #[arg(long = "exec", value_name = "LINE")]
    pub exec: Vec<String>,

    /// Write a starter plugin with this name into the plugins directory and exit
    #[arg(long, value_name = "NAME")]
    pub scaffold: Option<String>,
}

impl CliArgs {
    pub fn console_config(&self) -> ConsoleConfig {
        ConsoleConfig {
            plugins_dir: self
                .plugins_dir
                .clone()
                .unwrap_or_else(|| default_plugin_dir(APP_NAME)),
            extension: self.extension.clone(),
            fuel: self.fuel,
            autoload: !self.no_autoload,
            create_dir: !self.no_create_dir,
        }
    }

    pub fn tracing_config(&self) -> TracingConfig {
        TracingConfig {
            level: self.log_level,
            format: self.log_format.into(),
            ..TracingConfig::default()
        }
    }
}
