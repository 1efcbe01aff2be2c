//! Plugin discovery and directory scanning

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default plugin file extension
pub const DEFAULT_EXTENSION: &str = "wat";

/// Errors that can occur during plugin discovery
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Plugin directory {} does not exist.", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("Failed to read directory {}: {source}", .path.display())]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Plugin files directly inside `dir`, sorted by file name
///
/// Non-recursive; the extension match is case-insensitive.
pub fn discover(dir: impl AsRef<Path>, extension: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
    let dir = dir.as_ref();

    if !dir.is_dir() {
        return Err(DiscoveryError::DirectoryNotFound(dir.to_path_buf()));
    }

    let read_error = |source| DiscoveryError::ReadDirectory {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_error)? {
        let path = entry.map_err(read_error)?.path();
        if path.is_file() && has_extension(&path, extension) {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Find the plugin file whose stem matches `name` (case-insensitive)
pub fn find_by_stem(
    dir: impl AsRef<Path>,
    extension: &str,
    name: &str,
) -> Result<Option<PathBuf>, DiscoveryError> {
    let wanted = name.to_lowercase();
    Ok(discover(dir, extension)?.into_iter().find(|path| {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().to_lowercase() == wanted)
            .unwrap_or(false)
    }))
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

/// Default plugin directory for the current process
///
/// `<executable dir>/plugins`, falling back to `./plugins` and then to the
/// user's local data directory.
pub fn default_plugin_dir(app_name: &str) -> PathBuf {
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.join("plugins")))
    {
        return dir;
    }

    if let Ok(cwd) = std::env::current_dir() {
        return cwd.join("plugins");
    }

    dirs::data_local_dir()
        .map(|d| d.join(app_name).join("plugins"))
        .unwrap_or_else(|| PathBuf::from("plugins"))
}

/// Display name of a plugin file, as used in load reports
pub fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
