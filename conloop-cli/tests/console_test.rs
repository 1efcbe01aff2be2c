//! End-to-end console scenarios: built-ins, plugins and dispatch

use conloop::{CommandError, DispatchOutcome, Level, MemorySink, SessionState, ShellControl};
use conloop_cli::{Console, ConsoleConfig, ConsoleError};
use conloop_plugin_api::scaffold::{CommandScaffold, PluginScaffold};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    dir: TempDir,
    sink: Arc<MemorySink>,
    shell: Arc<SessionState>,
    console: Console,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = ConsoleConfig::with_plugins_dir(dir.path());
        config.autoload = false;

        let sink = Arc::new(MemorySink::new());
        let shell = Arc::new(SessionState::new());
        let console =
            Console::new(config, sink.clone(), shell.clone()).expect("Failed to create console");

        Self {
            dir,
            sink,
            shell,
            console,
        }
    }

    fn write(&self, file: &str, scaffold: PluginScaffold) {
        fs::write(self.dir.path().join(file), scaffold.render()).expect("Failed to write plugin");
    }

    /// Run a line and return only what it printed
    fn run(&self, line: &str) -> Vec<String> {
        self.sink.clear();
        self.console.execute(line);
        self.sink.texts()
    }

    fn load(&self) {
        self.console.manager().load_all().expect("Load failed");
    }
}

fn greeter() -> PluginScaffold {
    PluginScaffold::new("Greeter", "1.0")
        .description("Greets people")
        .command(
            CommandScaffold::new("hello")
                .description("Says hello")
                .prints("Hello from Greeter!"),
        )
}

#[test]
fn test_greeter_plugin() {
    let h = Harness::new();
    h.write("greeter.wat", greeter());
    h.load();

    assert!(h.sink.contains("Loaded plugin: Greeter v1.0"));
    assert_eq!(h.run("hello"), vec!["Hello from Greeter!"]);

    let help = h.run("help");
    assert_eq!(help[0], "Available commands:");
    assert!(help.contains(&"  clear - Clears the console output [Core]".to_string()));
    assert!(help.contains(&"----- commands from plugins -----".to_string()));
    assert_eq!(help.last().unwrap(), "  hello - Says hello [Greeter]");
}

#[test]
fn test_help_without_plugins() {
    let h = Harness::new();

    let help = h.run("help");

    assert!(!help.contains(&"----- commands from plugins -----".to_string()));
    // Core commands are listed in key order
    let names: Vec<&str> = help[1..]
        .iter()
        .map(|l| l.trim_start().split(' ').next().unwrap())
        .collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
    assert!(names.contains(&"preload"));
    assert!(names.contains(&"q"));
}

#[test]
fn test_same_command_from_two_plugins() {
    let h = Harness::new();
    h.write(
        "alpha.wat",
        PluginScaffold::new("Alpha", "1.0").command(CommandScaffold::new("x").prints("from alpha")),
    );
    h.write(
        "beta.wat",
        PluginScaffold::new("Beta", "1.0").command(CommandScaffold::new("x").prints("from beta")),
    );
    h.load();

    assert_eq!(
        h.run("x"),
        vec![
            "Error: Ambiguous command 'x'. Several plugins define this command. Use one of the following:",
            "  Alpha:x - <no description> [Alpha]",
            "  Beta:x - <no description> [Beta]",
        ]
    );
    assert_eq!(h.run("alpha:x"), vec!["from alpha"]);
    assert_eq!(h.run("Beta:X"), vec!["from beta"]);

    let help = h.run("help");
    assert!(help.contains(&"  Alpha:x - <no description> [Alpha]".to_string()));
    assert!(help.contains(&"  Beta:x - <no description> [Beta]".to_string()));
}

#[test]
fn test_misspelled_command_gets_suggestions() {
    let h = Harness::new();

    let out = h.run("hepl");

    assert_eq!(out[0], "Error: Command 'hepl' not recognized.");
    assert_eq!(out[1], "Did you mean one of these commands?");
    assert_eq!(
        out[2],
        "  help - Displays available commands with descriptions [Core]"
    );
    assert!(out.len() <= 2 + 5 + 1);
    assert_eq!(
        out.last().unwrap(),
        "Type 'help' for a full list of available commands."
    );
    // Suggestions are never executed
    assert!(!out.contains(&"Available commands:".to_string()));
}

#[test]
fn test_plist_and_pinfo() {
    let h = Harness::new();
    assert_eq!(h.run("plist"), vec!["Loaded plugins:", "  No plugins loaded."]);

    h.write("greeter.wat", greeter());
    h.load();

    assert_eq!(
        h.run("plist"),
        vec!["Loaded plugins:", "  Greeter v1.0 (loaded)"]
    );

    let info = h.run("pinfo greeter");
    assert_eq!(info[0], "Plugin information for Greeter:");
    assert_eq!(info[1], "  Name: Greeter");
    assert_eq!(info[2], "  Version: 1.0");
    assert_eq!(info[3], "  Status: loaded");
    assert_eq!(info[4], "  Description: Greets people");
    assert_eq!(info[5], "  Commands: hello");
    assert!(info[6].starts_with("  Source: "));
    assert!(info[7].starts_with("  Loaded: "));
}

#[test]
fn test_bundled_greeter_sample() {
    let h = Harness::new();
    let sample = concat!(env!("CARGO_MANIFEST_DIR"), "/plugins/greeter.wat");
    fs::copy(sample, h.dir.path().join("greeter.wat")).expect("Failed to copy sample plugin");
    h.load();

    assert!(h.sink.contains("Loaded plugin: Greeter v1.0"));
    assert_eq!(h.run("hello"), vec!["Hello from Greeter!"]);
    assert_eq!(h.run("greet Ada"), vec!["Hello, Ada"]);
    assert_eq!(h.run("greet Ada Grace"), vec!["Hello, Ada", "Hello, Grace"]);
    assert_eq!(
        h.run("greet"),
        vec!["Error: Command 'greeter:greet' failed: Usage: greet <name>..."]
    );

    let info = h.run("pinfo Greeter");
    assert_eq!(info[4], "  Description: Says hello");
    assert_eq!(info[5], "  Commands: hello, greet");
}

#[test]
fn test_pinfo_errors() {
    let h = Harness::new();

    let outcome = h.console.execute("pinfo");
    assert_eq!(
        outcome,
        DispatchOutcome::Failed {
            key: "pinfo".into(),
            error: CommandError::usage("Plugin name not provided. Usage: pinfo <plugin_name>"),
        }
    );
    assert!(h
        .sink
        .contains("Error: Plugin name not provided. Usage: pinfo <plugin_name>"));

    assert_eq!(h.run("pinfo ghost"), vec!["Error: Plugin 'ghost' not found."]);
}

#[test]
fn test_disable_and_enable() {
    let h = Harness::new();
    h.write("greeter.wat", greeter());
    h.load();

    h.run("pdisable Greeter");
    assert!(h.sink.contains("Disabled plugin: Greeter"));
    assert_eq!(h.run("hello")[0], "Error: Command 'hello' not recognized.");
    assert_eq!(h.run("plist")[1], "  No plugins loaded.");

    h.run("penable greeter");
    assert!(h.sink.contains("Enabled plugin: Greeter v1.0"));
    assert_eq!(h.run("hello"), vec!["Hello from Greeter!"]);

    // Failures are reported once, by the manager
    let out = h.run("penable nothing");
    assert_eq!(
        out.iter()
            .filter(|l| l.contains("not found in plugins directory"))
            .count(),
        1
    );
}

#[test]
fn test_preload_is_idempotent() {
    let h = Harness::new();
    h.write("greeter.wat", greeter());
    h.load();
    let before = h.console.registry().len();

    let out = h.run("preload");

    assert!(out.contains(&"Plugin loading completed. 1 loaded, 0 failed.".to_string()));
    assert_eq!(h.console.registry().len(), before);
    assert_eq!(h.run("plist"), vec!["Loaded plugins:", "  Greeter v1.0 (loaded)"]);
}

#[test]
fn test_syntax_error_reports_and_continues() {
    let h = Harness::new();
    fs::write(h.dir.path().join("broken.wat"), "(module (func $f (i32.add)").unwrap();
    h.write("greeter.wat", greeter());

    let out = h.run("preload");

    assert!(out.iter().any(|l| l == "Compilation errors in broken.wat:"));
    assert!(out.contains(&"Plugin loading completed. 1 loaded, 1 failed.".to_string()));
    assert_eq!(h.run("hello"), vec!["Hello from Greeter!"]);
}

#[test]
fn test_clear_and_close() {
    let h = Harness::new();

    h.run("clear");
    assert_eq!(h.shell.clear_count(), 1);

    assert!(!h.console.is_closed());
    h.run("QUIT");
    assert!(h.console.is_closed());
}

#[test]
fn test_every_exit_alias_closes() {
    for alias in ["close", "quit", "q"] {
        let h = Harness::new();
        h.run(alias);
        assert!(h.shell.is_closed(), "{} did not close the session", alias);
    }
}

#[test]
fn test_info_and_versions() {
    let h = Harness::new();

    let info = h.run("info");
    assert_eq!(info[0], "conloop: extensible command console");
    assert!(info.iter().any(|l| l.starts_with("  conloop ")));
    assert!(info.iter().any(|l| l == "  Plugins loaded: 0"));

    let versions = h.run("versions");
    assert_eq!(versions[0], "Component versions:");
    assert!(versions.contains(&"  plugin ABI v1".to_string()));
    assert!(versions.iter().any(|l| l.starts_with("  wasmtime ")));
}

#[test]
fn test_native_handler_panic_is_contained() {
    let h = Harness::new();
    h.console
        .api()
        .register_command(
            "boom",
            |_: &[String]| -> Result<(), CommandError> { panic!("kaboom") },
            Some("Always panics"),
        )
        .unwrap();

    let out = h.run("boom");

    assert_eq!(out, vec!["Error: Command 'boom' failed: panicked: kaboom"]);
    assert!(h.console.execute("help").is_executed());
}

#[test]
fn test_reregistering_overwrites() {
    let h = Harness::new();
    let api = h.console.api().clone();

    let first = api.clone();
    api.register_command(
        "ping",
        move |_: &[String]| -> Result<(), CommandError> {
            first.log("first", Level::Plain);
            Ok(())
        },
        None,
    )
    .unwrap();
    let second = api.clone();
    api.register_command(
        "PING",
        move |_: &[String]| -> Result<(), CommandError> {
            second.log("second", Level::Plain);
            Ok(())
        },
        None,
    )
    .unwrap();

    assert_eq!(h.run("ping"), vec!["second"]);
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = ConsoleConfig::with_plugins_dir("/tmp/conloop-test-plugins");
    config.fuel = 0;

    let result = Console::new(
        config,
        Arc::new(MemorySink::new()),
        Arc::new(SessionState::new()),
    );

    assert!(matches!(result, Err(ConsoleError::Config(_))));
}

#[test]
fn test_write_starter_plugin() {
    let h = Harness::new();

    let path = h.console.write_starter_plugin("Demo").expect("Scaffold failed");
    assert!(path.ends_with("demo.wat"));
    assert!(h.console.write_starter_plugin("Demo").is_err());
    assert!(h.console.write_starter_plugin("two words").is_err());

    h.load();
    assert_eq!(h.run("hello"), vec!["Hello from Demo!"]);
    assert_eq!(h.run("echo a b"), vec!["a", "b"]);
}

#[tokio::test]
async fn test_startup_loads_in_background() {
    let dir = TempDir::new().unwrap();
    let plugins = dir.path().join("plugins");
    fs::create_dir(&plugins).unwrap();
    fs::write(plugins.join("greeter.wat"), greeter().render()).unwrap();

    let sink = Arc::new(MemorySink::new());
    let console = Console::new(
        ConsoleConfig::with_plugins_dir(&plugins),
        sink.clone(),
        Arc::new(SessionState::new()),
    )
    .unwrap();

    // Built-ins work before plugins arrive
    assert!(console.execute("plist").is_executed());

    let handle = console.start().expect("Autoload is on by default");
    handle.await.unwrap();

    assert!(sink.contains(&format!("Plugin directory: {}", plugins.display())));
    assert!(sink.contains("Plugin loading completed."));
    assert!(console.execute("hello").is_executed());
}

#[tokio::test]
async fn test_startup_creates_missing_directory() {
    let dir = TempDir::new().unwrap();
    let plugins = dir.path().join("new-plugins");

    let sink = Arc::new(MemorySink::new());
    let console = Console::new(
        ConsoleConfig::with_plugins_dir(&plugins),
        sink.clone(),
        Arc::new(SessionState::new()),
    )
    .unwrap();

    console.start().unwrap().await.unwrap();

    assert!(plugins.is_dir());
    assert!(sink.contains("No plugins found in plugins directory."));
    assert_eq!(
        sink.find_by_level(Level::Info).last().map(|l| l.text.clone()),
        Some("Plugin loading completed.".to_string())
    );
}
