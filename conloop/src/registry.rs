//! Command registry
//!
//! A thread-safe table of every dispatchable command, shared by the
//! dispatcher, the built-ins and the plugin loader. Core commands are stored
//! under their bare name, plugin commands under `plugin:command`.

use crate::error::{CommandError, RegisterError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Owner name rendered for built-in commands
pub const CORE_OWNER: &str = "Core";

/// Rendered in place of a missing description
pub const NO_DESCRIPTION: &str = "<no description>";

/// Something that can run a command
pub trait CommandHandler: Send + Sync {
    /// Run with the arguments that followed the command word
    fn call(&self, args: &[String]) -> Result<(), CommandError>;
}

impl<F> CommandHandler for F
where
    F: Fn(&[String]) -> Result<(), CommandError> + Send + Sync,
{
    fn call(&self, args: &[String]) -> Result<(), CommandError> {
        self(args)
    }
}

/// Who contributed a command
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Owner {
    /// Built into the console
    Core,
    /// Contributed by the named plugin
    Plugin(String),
}

impl Owner {
    pub fn plugin(name: impl Into<String>) -> Self {
        Owner::Plugin(name.into())
    }

    pub fn is_core(&self) -> bool {
        matches!(self, Owner::Core)
    }

    /// Display name: the plugin name, or `Core`
    pub fn name(&self) -> &str {
        match self {
            Owner::Core => CORE_OWNER,
            Owner::Plugin(name) => name,
        }
    }

    /// Case-insensitive match against a plugin name
    pub fn is_plugin(&self, name: &str) -> bool {
        match self {
            Owner::Core => false,
            Owner::Plugin(own) => own.to_lowercase() == name.to_lowercase(),
        }
    }

    /// Storage key for `command` registered by this owner
    pub fn qualify(&self, command: &str) -> String {
        match self {
            Owner::Core => command.to_lowercase(),
            Owner::Plugin(name) => format!("{}:{}", name.to_lowercase(), command.to_lowercase()),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Base command word of a key: the part after the last `:`
pub fn base_name(key: &str) -> &str {
    key.rsplit(':').next().unwrap_or(key)
}

/// One dispatchable command
#[derive(Clone)]
pub struct CommandEntry {
    /// Lowercase storage key
    pub key: String,
    pub handler: Arc<dyn CommandHandler>,
    pub description: Option<String>,
    pub owner: Owner,
}

impl CommandEntry {
    pub fn base_name(&self) -> &str {
        base_name(&self.key)
    }

    /// Description, or the `<no description>` placeholder
    pub fn description_or_default(&self) -> &str {
        match self.description.as_deref() {
            Some(d) if !d.is_empty() => d,
            _ => NO_DESCRIPTION,
        }
    }
}

impl fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEntry")
            .field("key", &self.key)
            .field("description", &self.description)
            .field("owner", &self.owner)
            .finish()
    }
}

/// Result of resolving one command token
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Exactly one command matches
    Found(CommandEntry),
    /// Several owners define this command; sorted by owner name
    Ambiguous(Vec<CommandEntry>),
    /// Nothing matches
    NotFound,
}

/// Consistent snapshot of the registry with per-base-name owner counts
///
/// Help listing, suggestion ranking and ambiguity reports all render names
/// through [`RegistryView::display_name`] so they always agree.
#[derive(Debug, Clone)]
pub struct RegistryView {
    entries: Vec<CommandEntry>,
    conflicts: HashMap<String, usize>,
}

impl RegistryView {
    fn new(mut entries: Vec<CommandEntry>) -> Self {
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        let mut conflicts = HashMap::new();
        for entry in &entries {
            *conflicts.entry(entry.base_name().to_string()).or_insert(0) += 1;
        }
        Self { entries, conflicts }
    }

    /// Entries sorted by key
    pub fn entries(&self) -> &[CommandEntry] {
        &self.entries
    }

    /// Number of owners that define `base`
    pub fn conflict_count(&self, base: &str) -> usize {
        self.conflicts.get(base).copied().unwrap_or(0)
    }

    /// Name the user should type for this entry
    ///
    /// Core commands are always bare. Plugin commands are bare unless the
    /// base name is shared with another owner, then `Owner:base`.
    pub fn display_name(&self, entry: &CommandEntry) -> String {
        if entry.owner.is_core() {
            return entry.key.clone();
        }
        let base = entry.base_name();
        if self.conflict_count(base) > 1 {
            format!("{}:{}", entry.owner, base)
        } else {
            base.to_string()
        }
    }
}

/// Thread-safe command table
#[derive(Clone, Default)]
pub struct CommandRegistry {
    inner: Arc<Mutex<HashMap<String, CommandEntry>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or overwrite) a command; returns the storage key
    pub fn register(
        &self,
        raw_key: &str,
        handler: Arc<dyn CommandHandler>,
        description: Option<String>,
        owner: Owner,
    ) -> Result<String, RegisterError> {
        let raw_key = raw_key.trim();
        if raw_key.is_empty() {
            return Err(RegisterError::EmptyName);
        }
        if raw_key.chars().any(char::is_whitespace) {
            return Err(RegisterError::Whitespace(raw_key.to_string()));
        }

        let key = owner.qualify(raw_key);
        let entry = CommandEntry {
            key: key.clone(),
            handler,
            description,
            owner,
        };

        let replaced = self.inner.lock().insert(key.clone(), entry).is_some();
        tracing::debug!(key = %key, replaced, "Command registered");
        Ok(key)
    }

    /// Exact lookup by storage key
    pub fn get(&self, key: &str) -> Option<CommandEntry> {
        self.inner.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().contains_key(key)
    }

    /// Resolve a lowercase command token
    ///
    /// An exact key match wins. Otherwise every entry whose key equals the
    /// token or ends with `:token` is a candidate.
    pub fn resolve(&self, token: &str) -> Resolution {
        let inner = self.inner.lock();

        if let Some(entry) = inner.get(token) {
            return Resolution::Found(entry.clone());
        }

        let suffix = format!(":{}", token);
        let mut matches: Vec<CommandEntry> = inner
            .values()
            .filter(|e| e.key == token || e.key.ends_with(&suffix))
            .cloned()
            .collect();
        drop(inner);

        match matches.len() {
            0 => Resolution::NotFound,
            1 => Resolution::Found(matches.remove(0)),
            _ => {
                matches.sort_by(|a, b| {
                    a.owner
                        .name()
                        .cmp(b.owner.name())
                        .then_with(|| a.key.cmp(&b.key))
                });
                Resolution::Ambiguous(matches)
            }
        }
    }

    /// Snapshot for listing and suggestions
    pub fn view(&self) -> RegistryView {
        let entries = self.inner.lock().values().cloned().collect();
        RegistryView::new(entries)
    }

    /// Remove every command owned by the named plugin
    pub fn purge_owner(&self, plugin: &str) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.len();
        inner.retain(|_, e| !e.owner.is_plugin(plugin));
        let removed = before - inner.len();
        if removed > 0 {
            tracing::debug!(plugin = %plugin, removed, "Plugin commands purged");
        }
        removed
    }

    /// Remove every plugin-owned command, keeping built-ins
    pub fn purge_plugins(&self) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.len();
        inner.retain(|_, e| e.owner.is_core());
        before - inner.len()
    }

    /// Storage keys owned by the named plugin, sorted
    pub fn keys_of(&self, plugin: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .inner
            .lock()
            .values()
            .filter(|e| e.owner.is_plugin(plugin))
            .map(|e| e.key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("len", &self.len())
            .finish()
    }
}
