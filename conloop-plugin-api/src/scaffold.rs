//! WebAssembly text generator for simple plugins
//!
//! Produces a complete `.wat` plugin from a manifest and a list of commands
//! with canned behaviors. Used by `conloop --scaffold` to write starter
//! plugins, and by tests that need real plugin sources.
//!
//! ```
//! use conloop_plugin_api::scaffold::{CommandScaffold, PluginScaffold};
//!
//! let source = PluginScaffold::new("Greeter", "1.0")
//!     .command(CommandScaffold::new("hello").prints("Hello from Greeter!"))
//!     .render();
//!
//! assert!(source.contains("plugin_manifest"));
//! ```

use crate::{exports, imports, level, PluginManifest, HOST_MODULE};
use std::fmt::Write;

const DATA_START: u32 = 16;
const SCRATCH_LEN: u32 = 1024;
const PAGE_SIZE: u32 = 65536;

/// What a scaffolded command does when invoked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    /// Emit one line at the given level code
    Log { level: i32, text: String },
    /// Emit each argument on its own line
    EchoArgs,
    /// Fail with a message
    Fail(String),
    /// Execute `unreachable`
    Trap,
    /// Loop forever (until fuel runs out)
    Spin,
    /// Ask the shell to clear the console
    Clear,
    /// Register another (deferred) command of this plugin
    Register(String),
}

/// One command of a scaffolded plugin
#[derive(Debug, Clone)]
pub struct CommandScaffold {
    name: String,
    description: Option<String>,
    action: CommandAction,
    deferred: bool,
}

impl CommandScaffold {
    /// Create a command that prints its own name
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            action: CommandAction::Log {
                level: level::PLAIN,
                text: name.clone(),
            },
            name,
            description: None,
            deferred: false,
        }
    }

    /// Set description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Print a plain line
    pub fn prints(self, text: impl Into<String>) -> Self {
        self.logs(level::PLAIN, text)
    }

    /// Print a line at a specific level code
    pub fn logs(mut self, level: i32, text: impl Into<String>) -> Self {
        self.action = CommandAction::Log {
            level,
            text: text.into(),
        };
        self
    }

    /// Set an arbitrary action
    pub fn action(mut self, action: CommandAction) -> Self {
        self.action = action;
        self
    }

    /// Do not register this command during `plugin_init`
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }
}

/// Generator for a whole plugin source file
#[derive(Debug, Clone)]
pub struct PluginScaffold {
    manifest: PluginManifest,
    commands: Vec<CommandScaffold>,
    init_failure: Option<String>,
    raw_manifest: Option<String>,
}

impl PluginScaffold {
    /// Create a scaffold with the given identity
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            manifest: PluginManifest::new(name, version),
            commands: Vec::new(),
            init_failure: None,
            raw_manifest: None,
        }
    }

    /// Starter plugin written by `conloop --scaffold`
    pub fn starter(name: &str) -> Self {
        Self::new(name, "0.1.0")
            .description(format!("{} plugin", name))
            .command(
                CommandScaffold::new("hello")
                    .description("Prints a greeting")
                    .prints(format!("Hello from {}!", name)),
            )
            .command(
                CommandScaffold::new("echo")
                    .description("Prints each argument on its own line")
                    .action(CommandAction::EchoArgs),
            )
    }

    /// Set description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.manifest.description = Some(description.into());
        self
    }

    /// Add a command; it is also declared in the manifest
    pub fn command(mut self, command: CommandScaffold) -> Self {
        self.manifest.commands.push(command.name.clone());
        self.commands.push(command);
        self
    }

    /// Make `plugin_init` fail after registering its commands
    pub fn init_fails(mut self, message: impl Into<String>) -> Self {
        self.init_failure = Some(message.into());
        self
    }

    /// Override the API version declared in the manifest
    pub fn api_version(mut self, version: u32) -> Self {
        self.manifest.api_version = version;
        self
    }

    /// Embed this text instead of the generated manifest JSON
    pub fn raw_manifest(mut self, json: impl Into<String>) -> Self {
        self.raw_manifest = Some(json.into());
        self
    }

    /// Render the `.wat` source
    pub fn render(&self) -> String {
        let mut data = DataLayout::new();

        let manifest_json = self
            .raw_manifest
            .clone()
            .unwrap_or_else(|| self.manifest.to_json());
        let manifest = data.place(manifest_json.as_bytes());

        let mut registrations = String::new();
        let mut handlers = String::new();

        for (id, command) in self.commands.iter().enumerate() {
            let name = data.place(command.name.as_bytes());
            let description = command
                .description
                .as_ref()
                .map(|d| data.place(d.as_bytes()))
                .unwrap_or((0, 0));

            if !command.deferred {
                let _ = writeln!(
                    registrations,
                    "    (call $register_command (i32.const {}) (i32.const {}) (i32.const {}) (i32.const {}) (i32.const {}))",
                    name.0, name.1, description.0, description.1, id
                );
            }

            let body = self.action_body(&command.action, &mut data);
            let _ = writeln!(
                handlers,
                "    (if (i32.eq (local.get $id) (i32.const {}))\n      (then\n{}      ))",
                id, body
            );
        }

        let init_tail = match &self.init_failure {
            Some(message) => {
                let (ptr, len) = data.place(message.as_bytes());
                format!(
                    "    (call $fail (i32.const {}) (i32.const {}))\n    (i32.const 1)",
                    ptr, len
                )
            }
            None => "    (i32.const 0)".to_string(),
        };

        let scratch = data.scratch();
        let pages = (scratch + SCRATCH_LEN).div_ceil(PAGE_SIZE).max(1);
        // Echo handlers read arguments into the scratch area.
        let handlers = handlers.replace("$SCRATCH", &scratch.to_string());

        let mut out = String::new();
        let _ = writeln!(out, ";; conloop plugin: {}", self.manifest.name);
        let _ = writeln!(out, "(module");
        for (name, signature) in [
            (imports::REGISTER_COMMAND, "(param i32 i32 i32 i32 i32)"),
            (imports::LOG, "(param i32 i32 i32)"),
            (imports::CLEAR_CONSOLE, ""),
            (imports::ARG_COUNT, "(result i32)"),
            (imports::ARG_READ, "(param i32 i32 i32) (result i32)"),
            (imports::FAIL, "(param i32 i32)"),
        ] {
            let _ = writeln!(
                out,
                "  (import \"{}\" \"{}\" (func ${} {}))",
                HOST_MODULE, name, name, signature
            );
        }
        let _ = writeln!(out, "  (memory (export \"{}\") {})", exports::MEMORY, pages);
        for (offset, bytes) in &data.segments {
            let _ = writeln!(out, "  (data (i32.const {}) \"{}\")", offset, escape(bytes));
        }
        let _ = writeln!(
            out,
            "  (func (export \"{}\") (result i64)\n    (i64.or (i64.shl (i64.const {}) (i64.const 32)) (i64.const {})))",
            exports::MANIFEST,
            manifest.0,
            manifest.1
        );
        let _ = writeln!(
            out,
            "  (func (export \"{}\") (result i32)\n{}{})",
            exports::INIT,
            registrations,
            init_tail
        );
        let _ = writeln!(
            out,
            "  (func (export \"{}\") (param $id i32) (result i32)\n    (local $i i32)\n    (local $n i32)\n{}    (i32.const 1))",
            exports::INVOKE,
            handlers
        );
        out.push_str(")\n");
        out
    }

    fn action_body(&self, action: &CommandAction, data: &mut DataLayout) -> String {
        match action {
            CommandAction::Log { level, text } => {
                let (ptr, len) = data.place(text.as_bytes());
                format!(
                    "        (call $log (i32.const {}) (i32.const {}) (i32.const {}))\n        (return (i32.const 0))\n",
                    ptr, len, level
                )
            }
            CommandAction::EchoArgs => concat!(
                "        (local.set $i (i32.const 0))\n",
                "        (block $done\n",
                "          (loop $next\n",
                "            (br_if $done (i32.ge_s (local.get $i) (call $arg_count)))\n",
                "            (local.set $n (call $arg_read (local.get $i) (i32.const $SCRATCH) (i32.const 1024)))\n",
                "            (call $log (i32.const $SCRATCH) (local.get $n) (i32.const 0))\n",
                "            (local.set $i (i32.add (local.get $i) (i32.const 1)))\n",
                "            (br $next)))\n",
                "        (return (i32.const 0))\n",
            )
            .to_string(),
            CommandAction::Fail(message) => {
                let (ptr, len) = data.place(message.as_bytes());
                format!(
                    "        (call $fail (i32.const {}) (i32.const {}))\n        (return (i32.const 1))\n",
                    ptr, len
                )
            }
            CommandAction::Trap => "        unreachable\n".to_string(),
            CommandAction::Spin => {
                "        (loop $spin (br $spin))\n        (return (i32.const 0))\n".to_string()
            }
            CommandAction::Clear => {
                "        (call $clear_console)\n        (return (i32.const 0))\n".to_string()
            }
            CommandAction::Register(target) => {
                match self.commands.iter().position(|c| &c.name == target) {
                    Some(id) => {
                        let command = &self.commands[id];
                        let name = data.place(command.name.as_bytes());
                        let description = command
                            .description
                            .as_ref()
                            .map(|d| data.place(d.as_bytes()))
                            .unwrap_or((0, 0));
                        format!(
                            "        (call $register_command (i32.const {}) (i32.const {}) (i32.const {}) (i32.const {}) (i32.const {}))\n        (return (i32.const 0))\n",
                            name.0, name.1, description.0, description.1, id
                        )
                    }
                    None => "        (return (i32.const 1))\n".to_string(),
                }
            }
        }
    }
}

struct DataLayout {
    next: u32,
    segments: Vec<(u32, Vec<u8>)>,
}

impl DataLayout {
    fn new() -> Self {
        Self {
            next: DATA_START,
            segments: Vec::new(),
        }
    }

    /// Place bytes in linear memory; returns (ptr, len)
    fn place(&mut self, bytes: &[u8]) -> (u32, u32) {
        let offset = self.next;
        self.segments.push((offset, bytes.to_vec()));
        self.next = align(offset + bytes.len() as u32, 8);
        (offset, bytes.len() as u32)
    }

    fn scratch(&self) -> u32 {
        align(self.next, 16)
    }
}

fn align(value: u32, to: u32) -> u32 {
    value.div_ceil(to) * to
}

fn escape(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if (0x20..0x7f).contains(&b) && b != b'"' && b != b'\\' {
            out.push(b as char);
        } else {
            let _ = write!(out, "\\{:02x}", b);
        }
    }
    out
}
