//! Integration tests for plugin discovery, loading and dispatch

use conloop::{
    CommandRegistry, DispatchOutcome, Dispatcher, HostApi, Level, MemorySink, SessionState,
};
use conloop_plugin_api::scaffold::{CommandAction, CommandScaffold, PluginScaffold};
use conloop_plugin_api::level;
use conloop_plugin_host::{ManagerConfig, PluginLoadError, PluginManager, ValidationError};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

struct Console {
    dir: TempDir,
    registry: CommandRegistry,
    sink: Arc<MemorySink>,
    shell: Arc<SessionState>,
    manager: PluginManager,
    dispatcher: Dispatcher,
}

impl Console {
    fn new() -> Self {
        Self::with_fuel(conloop_plugin_host::DEFAULT_FUEL)
    }

    fn with_fuel(fuel: u64) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let registry = CommandRegistry::new();
        let sink = Arc::new(MemorySink::new());
        let shell = Arc::new(SessionState::new());
        let api = HostApi::core(registry.clone(), sink.clone(), shell.clone());

        let mut config = ManagerConfig::new(dir.path());
        config.fuel = fuel;
        let manager = PluginManager::new(api, config).expect("Failed to create manager");
        let dispatcher = Dispatcher::new(registry.clone(), sink.clone());

        Self {
            dir,
            registry,
            sink,
            shell,
            manager,
            dispatcher,
        }
    }

    fn write(&self, file: &str, scaffold: &PluginScaffold) {
        write_plugin(self.dir.path(), file, &scaffold.render());
    }

    fn load(&self) -> conloop_plugin_host::LoadReport {
        self.manager.load_all().expect("Load failed")
    }
}

fn write_plugin(dir: &Path, file: &str, source: &str) {
    fs::write(dir.join(file), source).expect("Failed to write plugin");
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
fn test_load_and_dispatch_greeter() {
    let console = Console::new();
    console.write("greeter.wat", &greeter());

    let report = console.load();

    assert_eq!(report.loaded.len(), 1);
    assert!(report.is_success());
    assert!(console.sink.contains("Attempting to load plugin from: greeter.wat"));
    assert!(console.sink.contains("Registered command: greeter:hello"));
    assert!(console.sink.contains("Loaded plugin: Greeter v1.0"));

    console.sink.clear();
    let outcome = console.dispatcher.dispatch("HELLO");

    assert_eq!(
        outcome,
        DispatchOutcome::Executed {
            key: "greeter:hello".into()
        }
    );
    let lines = console.sink.lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].text, "Hello from Greeter!");
    assert_eq!(lines[0].source, "Greeter");
    assert!(console.dispatcher.dispatch("greeter:hello").is_executed());
}

#[test]
fn test_plugin_info_snapshot() {
    let console = Console::new();
    console.write("greeter.wat", &greeter());
    console.load();

    let info = console.manager.find("GREETER").expect("Greeter not loaded");

    assert_eq!(info.name, "Greeter");
    assert_eq!(info.version, "1.0");
    assert_eq!(info.description.as_deref(), Some("Greets people"));
    assert_eq!(info.declared_commands, vec!["hello"]);
    assert_eq!(info.registered_commands, vec!["greeter:hello"]);
    assert!(info.enabled);
    assert!(info.source.ends_with("greeter.wat"));
}

#[test]
fn test_reload_is_idempotent() {
    let console = Console::new();
    console.write("greeter.wat", &greeter());
    console.write(
        "other.wat",
        &PluginScaffold::new("Other", "2.0").command(CommandScaffold::new("x")),
    );

    console.load();
    let first: Vec<String> = console.manager.plugins().into_iter().map(|p| p.name).collect();
    let registered = console.registry.len();

    console.load();
    let second: Vec<String> = console.manager.plugins().into_iter().map(|p| p.name).collect();

    assert_eq!(first, vec!["Greeter", "Other"]);
    assert_eq!(first, second);
    assert_eq!(console.registry.len(), registered);
}

#[test]
fn test_reload_drops_removed_files() {
    let console = Console::new();
    console.write("greeter.wat", &greeter());
    console.load();
    assert!(console.registry.contains("greeter:hello"));

    fs::remove_file(console.dir.path().join("greeter.wat")).unwrap();
    console.load();

    assert!(console.manager.is_empty());
    assert!(console.registry.is_empty());
    assert!(console.sink.contains("No plugins found in plugins directory."));
}

#[test]
fn test_syntax_error_does_not_stop_loading() {
    let console = Console::new();
    write_plugin(console.dir.path(), "a_broken.wat", "(module\n  (func (oops)))");
    console.write("greeter.wat", &greeter());

    let report = console.load();

    assert_eq!(report.loaded.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(report.failed[0].1, PluginLoadError::Compile(_)));
    assert!(console.sink.contains("Compilation errors in a_broken.wat:"));
    assert!(console.sink.contains("(2,"));
    assert!(console.dispatcher.dispatch("hello").is_executed());
}

#[test]
fn test_module_without_contract_is_skipped() {
    let console = Console::new();
    write_plugin(console.dir.path(), "plain.wat", "(module (memory (export \"memory\") 1))");

    let report = console.load();

    assert!(report.loaded.is_empty());
    assert!(console
        .sink
        .contains("No valid plugin contract found in plain.wat: missing export 'plugin_manifest'"));
}

#[test]
fn test_api_version_mismatch_is_contract_error() {
    let console = Console::new();
    console.write("future.wat", &greeter().api_version(2));

    let report = console.load();

    assert!(matches!(report.failed[0].1, PluginLoadError::Contract { .. }));
    assert!(console.registry.is_empty());
}

#[test]
fn test_manifest_rules() {
    let console = Console::new();
    console.write("a.wat", &PluginScaffold::new("NoVersion", ""));
    console.write("b.wat", &PluginScaffold::new("", "1.0"));
    console.write("c.wat", &PluginScaffold::new("x".repeat(33), "1.0"));
    console.write("d.wat", &PluginScaffold::new("Two Words", "1.0"));
    console.write("e.wat", &PluginScaffold::new("Dup", "1.0"));
    console.write("f.wat", &PluginScaffold::new("DUP", "2.0"));

    let report = console.load();

    let loaded: Vec<&str> = report.loaded.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(loaded, vec!["Dup"]);

    let errors: Vec<ValidationError> = report
        .failed
        .iter()
        .filter_map(|(_, e)| match e {
            PluginLoadError::Validation(v) => Some(v.clone()),
            _ => None,
        })
        .collect();
    assert!(matches!(errors[0], ValidationError::MissingVersion { .. }));
    assert!(matches!(errors[1], ValidationError::EmptyName { .. }));
    assert!(matches!(errors[2], ValidationError::NameTooLong { .. }));
    assert!(matches!(errors[3], ValidationError::NameContainsWhitespace { .. }));
    assert!(matches!(errors[4], ValidationError::DuplicateName { .. }));

    assert!(console
        .sink
        .contains("Error: Plugin NoVersion does not specify a version."));
    assert!(console.sink.contains("Error: Plugin in b.wat has empty name."));
    assert!(console
        .sink
        .contains("Error: Plugin name 'DUP' is already used by another plugin."));
}

#[test]
fn test_failed_init_leaves_no_commands() {
    let console = Console::new();
    console.write(
        "broken.wat",
        &PluginScaffold::new("Broken", "1.0")
            .command(CommandScaffold::new("half"))
            .init_fails("database unavailable"),
    );

    let report = console.load();

    assert!(report.loaded.is_empty());
    assert!(console.manager.is_empty());
    assert!(!console.registry.contains("broken:half"));
    assert!(console
        .sink
        .contains("Error: Plugin Broken failed to initialize: database unavailable"));
}

#[test]
fn test_disable_purges_commands() {
    let console = Console::new();
    console.write("greeter.wat", &greeter());
    console.load();

    assert!(console.manager.disable("greeter"));
    assert!(console.sink.contains("Disabled plugin: Greeter"));
    assert!(console.manager.find("Greeter").is_none());

    console.sink.clear();
    let outcome = console.dispatcher.dispatch("hello");

    assert!(matches!(outcome, DispatchOutcome::NotRecognized { .. }));
    assert!(console.sink.contains("Error: Command 'hello' not recognized."));
}

#[test]
fn test_disable_unknown_plugin() {
    let console = Console::new();

    assert!(!console.manager.disable("ghost"));
    assert!(console.sink.contains("No plugin ghost found."));
}

#[test]
fn test_enable_by_file_stem() {
    let console = Console::new();
    console.write("Greeter.wat", &greeter());
    console.load();
    console.manager.disable("Greeter");

    let info = console.manager.enable("greeter").expect("Enable failed");

    assert_eq!(info.name, "Greeter");
    assert!(console.sink.contains("Enabled plugin: Greeter v1.0"));
    assert!(console.dispatcher.dispatch("hello").is_executed());

    // Enabling again collides with the live copy
    assert!(matches!(
        console.manager.enable("greeter"),
        Err(PluginLoadError::Validation(ValidationError::DuplicateName { .. }))
    ));
}

#[test]
fn test_enable_missing_file() {
    let console = Console::new();

    let result = console.manager.enable("nothing");

    assert!(matches!(result, Err(PluginLoadError::FileNotFound(_))));
    assert!(console
        .sink
        .contains("Plugin file for nothing not found in plugins directory."));
}

#[test]
fn test_missing_directory_is_reported() {
    let console = Console::new();
    let missing = console.dir.path().join("nope");
    let api = HostApi::core(
        console.registry.clone(),
        console.sink.clone(),
        console.shell.clone(),
    );
    let manager = PluginManager::new(api, ManagerConfig::new(&missing)).unwrap();

    let report = manager.load_all().unwrap();

    assert_eq!(report.total_found(), 0);
    assert!(console.sink.contains("does not exist."));

    manager.prepare_directory().unwrap();
    assert!(missing.is_dir());
    assert!(console.sink.contains("Plugin directory: "));
}

#[test]
fn test_same_command_in_two_plugins_is_ambiguous() {
    let console = Console::new();
    console.write(
        "alpha.wat",
        &PluginScaffold::new("Alpha", "1.0").command(CommandScaffold::new("x").prints("alpha")),
    );
    console.write(
        "beta.wat",
        &PluginScaffold::new("Beta", "1.0").command(CommandScaffold::new("x").prints("beta")),
    );
    console.load();
    console.sink.clear();

    let outcome = console.dispatcher.dispatch("x");

    assert_eq!(
        outcome,
        DispatchOutcome::Ambiguous {
            input: "x".into(),
            candidates: vec!["Alpha:x".into(), "Beta:x".into()],
        }
    );
    assert!(console.sink.find_by_level(Level::Plain).is_empty());

    console.sink.clear();
    assert!(console.dispatcher.dispatch("beta:x").is_executed());
    assert_eq!(console.sink.texts(), vec!["beta"]);
}

#[test]
fn test_runaway_command_runs_out_of_fuel() {
    let console = Console::with_fuel(200_000);
    console.write(
        "spin.wat",
        &PluginScaffold::new("Spinner", "1.0")
            .command(CommandScaffold::new("spin").action(CommandAction::Spin))
            .command(CommandScaffold::new("ok").prints("still alive")),
    );
    console.load();

    let outcome = console.dispatcher.dispatch("spin");

    assert!(matches!(outcome, DispatchOutcome::Failed { .. }));
    assert!(console
        .sink
        .contains("Error: Command 'spinner:spin' failed: Fuel exhausted (CPU limit exceeded)"));
    assert!(console.dispatcher.dispatch("ok").is_executed());
    assert!(console.sink.contains("still alive"));
}

#[test]
fn test_plugin_host_calls() {
    let console = Console::new();
    console.write(
        "tools.wat",
        &PluginScaffold::new("Tools", "1.0")
            .command(CommandScaffold::new("echo").action(CommandAction::EchoArgs))
            .command(CommandScaffold::new("cls").action(CommandAction::Clear))
            .command(CommandScaffold::new("warn").logs(level::WARNING, "careful"))
            .command(CommandScaffold::new("oops").action(CommandAction::Fail("bad input".into())))
            .command(CommandScaffold::new("later").prints("late arrival").deferred())
            .command(CommandScaffold::new("arm").action(CommandAction::Register("later".into()))),
    );
    console.load();
    console.sink.clear();

    console.dispatcher.dispatch("echo One two");
    assert_eq!(console.sink.texts(), vec!["One", "two"]);

    console.dispatcher.dispatch("cls");
    assert_eq!(console.shell.clear_count(), 1);

    console.dispatcher.dispatch("warn");
    assert_eq!(console.sink.find_by_level(Level::Warning)[0].text, "careful");

    console.dispatcher.dispatch("oops");
    assert!(console
        .sink
        .contains("Error: Command 'tools:oops' failed: bad input"));

    // Registered at run time, from inside a running command
    assert!(!console.registry.contains("tools:later"));
    assert!(console.dispatcher.dispatch("arm").is_executed());
    assert!(console.dispatcher.dispatch("later").is_executed());
    assert!(console.sink.contains("late arrival"));
}

#[tokio::test]
async fn test_background_load() {
    let console = Arc::new(Console::new());
    console.write("greeter.wat", &greeter());

    let loader = console.clone();
    let report = tokio::task::spawn_blocking(move || loader.manager.load_all())
        .await
        .expect("Load task panicked")
        .expect("Load failed");

    assert_eq!(report.loaded.len(), 1);
    assert!(console.dispatcher.dispatch("hello").is_executed());
}

#[test]
fn test_concurrent_loads_are_serialized() {
    let console = Console::new();
    console.write("greeter.wat", &greeter());
    console.write(
        "other.wat",
        &PluginScaffold::new("Other", "2.0").command(CommandScaffold::new("x")),
    );

    let reports: Vec<_> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..2)
            .map(|_| scope.spawn(|| console.manager.load_all()))
            .collect();
        workers
            .into_iter()
            .map(|w| w.join().expect("Load thread panicked").expect("Load failed"))
            .collect()
    });

    for report in &reports {
        assert!(report.is_success(), "Unexpected failures: {:?}", report.failed);
        assert_eq!(report.loaded.len(), 2);
    }
    let names: Vec<String> = console.manager.plugins().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["Greeter", "Other"]);
    assert!(!console.sink.contains("already used by another plugin"));
    assert!(console.dispatcher.dispatch("hello").is_executed());
}
