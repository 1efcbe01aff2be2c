//! Built-in console commands
//!
//! Core commands go straight into the registry under the `Core` owner; unlike
//! plugin registrations they are not announced on the console.

use conloop::{
    CommandEntry, CommandError, CommandHandler, CommandRegistry, HostApi, Level, Owner,
    RegisterError, RegistryView, NO_DESCRIPTION,
};
use conloop_plugin_api::API_VERSION;
use conloop_plugin_host::PluginManager;
use std::sync::{Arc, Weak};

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Commands that end the session
pub const EXIT_COMMANDS: [&str; 3] = ["close", "quit", "q"];

type HandlerResult = Result<(), CommandError>;

/// Register every built-in command
///
/// Handlers hold only a weak reference to the manager, so the registry never
/// keeps the plugin set alive.
pub fn register(api: &HostApi, manager: &Arc<PluginManager>) -> Result<(), RegisterError> {
    let plugins = Arc::downgrade(manager);
    let registry = api.registry();

    add(registry, "clear", "Clears the console output", with_api(api, clear))?;
    add(
        registry,
        "help",
        "Displays available commands with descriptions",
        with_api(api, help),
    )?;
    add(
        registry,
        "info",
        "Shows conloop version and information",
        with_manager(api, &plugins, info),
    )?;
    add(
        registry,
        "versions",
        "Shows the versions of the console components",
        with_api(api, versions),
    )?;
    add(
        registry,
        "plist",
        "Lists loaded plugins",
        with_manager(api, &plugins, plist),
    )?;
    add(
        registry,
        "pinfo",
        "Shows details of a loaded plugin. Usage: pinfo <plugin_name>",
        with_manager(api, &plugins, pinfo),
    )?;
    add(
        registry,
        "penable",
        "Loads a plugin from the plugins directory. Usage: penable <plugin_name>",
        with_manager(api, &plugins, penable),
    )?;
    add(
        registry,
        "pdisable",
        "Unloads a plugin and removes its commands. Usage: pdisable <plugin_name>",
        with_manager(api, &plugins, pdisable),
    )?;
    add(
        registry,
        "preload",
        "Reloads every plugin in the plugins directory",
        with_manager(api, &plugins, preload),
    )?;
    for name in EXIT_COMMANDS {
        add(registry, name, "Closes the console", with_api(api, close))?;
    }

    Ok(())
}

fn add<H>(
    registry: &CommandRegistry,
    name: &str,
    description: &str,
    handler: H,
) -> Result<(), RegisterError>
where
    H: CommandHandler + 'static,
{
    registry.register(
        name,
        Arc::new(handler),
        Some(description.to_string()),
        Owner::Core,
    )?;
    Ok(())
}

fn with_api<F>(api: &HostApi, f: F) -> impl Fn(&[String]) -> HandlerResult + Send + Sync + 'static
where
    F: Fn(&HostApi, &[String]) -> HandlerResult + Send + Sync + 'static,
{
    let api = api.clone();
    move |args: &[String]| f(&api, args)
}

fn with_manager<F>(
    api: &HostApi,
    manager: &Weak<PluginManager>,
    f: F,
) -> impl Fn(&[String]) -> HandlerResult + Send + Sync + 'static
where
    F: Fn(&HostApi, &PluginManager, &[String]) -> HandlerResult + Send + Sync + 'static,
{
    let api = api.clone();
    let manager = manager.clone();
    move |args: &[String]| {
        let manager = manager
            .upgrade()
            .ok_or_else(|| CommandError::failed("plugin manager has shut down"))?;
        f(&api, &manager, args)
    }
}

fn required_name<'a>(args: &'a [String], usage: &str) -> Result<&'a str, CommandError> {
    args.first()
        .map(String::as_str)
        .ok_or_else(|| CommandError::usage(format!("Plugin name not provided. Usage: {}", usage)))
}

/// `  name - description [owner]`
fn listing_line(view: &RegistryView, entry: &CommandEntry) -> String {
    format!(
        "  {} - {} [{}]",
        view.display_name(entry),
        entry.description_or_default(),
        entry.owner
    )
}

fn clear(api: &HostApi, _args: &[String]) -> HandlerResult {
    api.clear_console();
    Ok(())
}

fn close(api: &HostApi, _args: &[String]) -> HandlerResult {
    api.shell().close();
    Ok(())
}

fn help(api: &HostApi, _args: &[String]) -> HandlerResult {
    let view = api.registry().view();
    let (core, mut plugin): (Vec<&CommandEntry>, Vec<&CommandEntry>) =
        view.entries().iter().partition(|e| e.owner.is_core());

    api.log("Available commands:", Level::Info);
    for entry in core {
        api.log(&listing_line(&view, entry), Level::Detail);
    }

    if !plugin.is_empty() {
        plugin.sort_by(|a, b| {
            a.owner
                .name()
                .cmp(b.owner.name())
                .then_with(|| a.key.cmp(&b.key))
        });
        api.log("----- commands from plugins -----", Level::Info);
        for entry in plugin {
            api.log(&listing_line(&view, entry), Level::Detail);
        }
    }
    Ok(())
}

fn info(api: &HostApi, manager: &PluginManager, _args: &[String]) -> HandlerResult {
    api.log("conloop: extensible command console", Level::Info);
    for line in conloop::version_info().lines() {
        api.log(&format!("  {}", line), Level::Detail);
    }
    api.log(
        &format!("  Plugin directory: {}", manager.plugins_dir().display()),
        Level::Detail,
    );
    api.log(
        &format!("  Plugins loaded: {}", manager.len()),
        Level::Detail,
    );
    Ok(())
}

/// Version of a crate in the resolved dependency graph
fn dependency_version(name: &str) -> Option<&'static str> {
    built_info::DEPENDENCIES
        .iter()
        .find(|(dep, _)| *dep == name)
        .map(|(_, version)| *version)
}

fn versions(api: &HostApi, _args: &[String]) -> HandlerResult {
    api.log("Component versions:", Level::Info);
    api.log(
        &format!("  conloop {}", conloop::version_short()),
        Level::Detail,
    );
    api.log(
        &format!("  {} {}", built_info::PKG_NAME, built_info::PKG_VERSION),
        Level::Detail,
    );
    api.log(&format!("  plugin ABI v{}", API_VERSION), Level::Detail);
    api.log(
        &format!(
            "  wasmtime {}",
            dependency_version("wasmtime").unwrap_or("unknown")
        ),
        Level::Detail,
    );
    Ok(())
}

fn plist(api: &HostApi, manager: &PluginManager, _args: &[String]) -> HandlerResult {
    let plugins = manager.plugins();

    api.log("Loaded plugins:", Level::Info);
    if plugins.is_empty() {
        api.log("  No plugins loaded.", Level::Detail);
    }
    for plugin in plugins {
        api.log(
            &format!(
                "  {} v{} ({})",
                plugin.name,
                plugin.version,
                status(plugin.enabled)
            ),
            Level::Detail,
        );
    }
    Ok(())
}

fn status(enabled: bool) -> &'static str {
    if enabled {
        "loaded"
    } else {
        "unloaded"
    }
}

fn pinfo(api: &HostApi, manager: &PluginManager, args: &[String]) -> HandlerResult {
    let name = required_name(args, "pinfo <plugin_name>")?;
    let plugin = manager
        .find(name)
        .ok_or_else(|| CommandError::not_found(format!("Plugin '{}' not found.", name)))?;

    let commands = if plugin.declared_commands.is_empty() {
        "<none>".to_string()
    } else {
        plugin.declared_commands.join(", ")
    };

    api.log(
        &format!("Plugin information for {}:", plugin.name),
        Level::Info,
    );
    for line in [
        format!("  Name: {}", plugin.name),
        format!("  Version: {}", plugin.version),
        format!("  Status: {}", status(plugin.enabled)),
        format!(
            "  Description: {}",
            plugin.description.as_deref().unwrap_or(NO_DESCRIPTION)
        ),
        format!("  Commands: {}", commands),
        format!("  Source: {}", plugin.source.display()),
        format!("  Loaded: {}", plugin.loaded_at.format("%Y-%m-%d %H:%M:%S")),
    ] {
        api.log(&line, Level::Detail);
    }
    Ok(())
}

fn penable(_api: &HostApi, manager: &PluginManager, args: &[String]) -> HandlerResult {
    let name = required_name(args, "penable <plugin_name>")?;
    // Failures are already on the console.
    if let Err(e) = manager.enable(name) {
        tracing::debug!(plugin = %name, error = %e, "Enable failed");
    }
    Ok(())
}

fn pdisable(_api: &HostApi, manager: &PluginManager, args: &[String]) -> HandlerResult {
    let name = required_name(args, "pdisable <plugin_name>")?;
    manager.disable(name);
    Ok(())
}

fn preload(api: &HostApi, manager: &PluginManager, _args: &[String]) -> HandlerResult {
    let report = manager
        .load_all()
        .map_err(|e| CommandError::failed(e.to_string()))?;
    api.log(
        &format!(
            "Plugin loading completed. {} loaded, {} failed.",
            report.loaded.len(),
            report.failed.len()
        ),
        Level::Info,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_name() {
        let args = vec!["Greeter".to_string(), "extra".to_string()];
        assert_eq!(required_name(&args, "pinfo <plugin_name>"), Ok("Greeter"));
        assert_eq!(
            required_name(&[], "pinfo <plugin_name>"),
            Err(CommandError::usage(
                "Plugin name not provided. Usage: pinfo <plugin_name>"
            ))
        );
    }

    #[test]
    fn test_wasmtime_is_in_dependency_graph() {
        assert!(dependency_version("wasmtime").is_some());
        assert!(dependency_version("no-such-crate").is_none());
    }
}
