//! Filesystem plugin host.
//!
//! Plugins live in `{config_dir}/plugins/{name}/`. Each plugin directory
//! contains a `package.json` and the JS entry point it names.
//!
//! This module provides:
//! - `FsPluginHost::create_plugin`: write a single-module plugin (used for themes)
//! - `FsPluginHost::install_plugin`: download a published plugin via the registry
//! - `FsPluginHost::reload_plugins`: rescan the directory
//! - `FsPluginHost::set_theme`: activate a theme some loaded plugin provides

use crate::config;
use crate::host::PluginHost;
use crate::registry;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};

/// Themes that ship with the application and need no plugin.
pub const BUILTIN_THEMES: &[&str] = &["default"];

const THEME_EXPORT_PREFIX: &str = "module.exports.themes = [";
const THEME_EXPORT_SUFFIX: &str = "];";

/// Root directory for user plugins: `{config_dir}/plugins/`
pub fn plugins_dir() -> PathBuf {
    config::config_dir().join("plugins")
}

// ---------------------------------------------------------------------------
// Package
// ---------------------------------------------------------------------------

/// Plugin package as declared in `package.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginPackage {
    pub name: String,
    pub version: String,
    #[serde(default = "default_main")]
    pub main: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Theme names the plugin exports, for plugins whose module can't be read statically.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub themes: Vec<String>,
}

fn default_main() -> String {
    "main.js".to_string()
}

/// Validate a parsed package for required fields and sanity.
fn validate_package(package: &PluginPackage, dir_name: &str) -> Result<(), String> {
    if package.name.is_empty() {
        return Err("name is empty".into());
    }
    if package.name != dir_name {
        return Err(format!(
            "name \"{}\" does not match directory name \"{}\"",
            package.name, dir_name
        ));
    }
    if package.version.is_empty() {
        return Err("version is empty".into());
    }
    if package.main.is_empty() {
        return Err("main is empty".into());
    }
    if is_path_escape(&package.main) {
        return Err(format!("main \"{}\" attempts path traversal", package.main));
    }
    Ok(())
}

/// A plugin found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPlugin {
    pub package: PluginPackage,
    pub dir: PathBuf,
    pub themes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Path safety
// ---------------------------------------------------------------------------

/// Returns true if a relative path attempts to escape its root via `..`,
/// absolute components, or other shenanigans.
fn is_path_escape(relative: &str) -> bool {
    let path = Path::new(relative);
    if path.is_absolute() {
        return true;
    }
    path.components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// A plugin name must be a single, non-hidden path segment.
fn validate_plugin_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Plugin name is empty".into());
    }
    if is_path_escape(name) || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(format!("Invalid plugin name \"{name}\""));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Theme discovery
// ---------------------------------------------------------------------------

/// Theme names exported by a `main.js` of the shape theme plugins are written in.
/// Any other module shape yields nothing.
fn exported_themes(main_js: &str) -> Vec<String> {
    let Some(body) = main_js
        .trim()
        .strip_prefix(THEME_EXPORT_PREFIX)
        .and_then(|rest| rest.strip_suffix(THEME_EXPORT_SUFFIX))
    else {
        return Vec::new();
    };

    match serde_json::from_str::<Vec<Value>>(&format!("[{body}]")) {
        Ok(themes) => themes
            .iter()
            .filter_map(|theme| theme.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect(),
        Err(_) => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

/// Scan `root` and return every valid plugin, sorted by name.
/// Invalid packages are logged and skipped, never an error.
pub fn scan_plugins(root: &Path) -> Vec<LoadedPlugin> {
    if !root.exists() {
        return Vec::new();
    }

    let entries = match std::fs::read_dir(root) {
        Ok(e) => e,
        Err(err) => {
            tracing::warn!("[plugins] Failed to read plugins dir: {err}");
            return Vec::new();
        }
    };

    let mut plugins = Vec::new();

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let Some(dir_name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if dir_name.starts_with('.') {
            continue;
        }

        let package_data = match std::fs::read_to_string(path.join("package.json")) {
            Ok(d) => d,
            Err(err) => {
                tracing::warn!("[plugins] {dir_name}: failed to read package.json: {err}");
                continue;
            }
        };

        let package: PluginPackage = match serde_json::from_str(&package_data) {
            Ok(p) => p,
            Err(err) => {
                tracing::warn!("[plugins] {dir_name}: invalid package.json: {err}");
                continue;
            }
        };

        if let Err(err) = validate_package(&package, &dir_name) {
            tracing::warn!("[plugins] {dir_name}: package validation failed: {err}");
            continue;
        }

        let mut themes = package.themes.clone();
        if let Ok(main_js) = std::fs::read_to_string(path.join(&package.main)) {
            for theme in exported_themes(&main_js) {
                if !themes.contains(&theme) {
                    themes.push(theme);
                }
            }
        }

        plugins.push(LoadedPlugin {
            package,
            dir: path,
            themes,
        });
    }

    plugins.sort_by(|a, b| a.package.name.cmp(&b.package.name));
    plugins
}

// ---------------------------------------------------------------------------
// Archive extraction
// ---------------------------------------------------------------------------

/// Unpack a plugin archive into `dest`. Entries that would land outside
/// `dest` abort the extraction.
fn extract_zip(bytes: &[u8], dest: &Path) -> Result<(), String> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("Invalid plugin archive: {e}"))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| format!("Failed to read archive entry: {e}"))?;
        let Some(relative) = file.enclosed_name() else {
            return Err(format!("Archive entry \"{}\" attempts path traversal", file.name()));
        };
        let target = dest.join(relative);

        if file.is_dir() {
            std::fs::create_dir_all(&target)
                .map_err(|e| format!("Failed to create {}: {e}", target.display()))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {e}", parent.display()))?;
        }
        let mut out = std::fs::File::create(&target)
            .map_err(|e| format!("Failed to create {}: {e}", target.display()))?;
        std::io::copy(&mut file, &mut out)
            .map_err(|e| format!("Failed to write {}: {e}", target.display()))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

pub struct FsPluginHost {
    root: PathBuf,
    registry_url: String,
    http: reqwest::Client,
    loaded: RwLock<Vec<LoadedPlugin>>,
    active_theme: RwLock<Option<String>>,
}

impl FsPluginHost {
    pub fn new(root: impl Into<PathBuf>, registry_url: impl Into<String>) -> Self {
        let root = root.into();
        let loaded = scan_plugins(&root);
        Self {
            root,
            registry_url: registry_url.into(),
            http: reqwest::Client::new(),
            loaded: RwLock::new(loaded),
            active_theme: RwLock::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn plugins(&self) -> Vec<LoadedPlugin> {
        self.loaded.read().clone()
    }

    pub fn active_theme(&self) -> Option<String> {
        self.active_theme.read().clone()
    }

    fn rescan(&self) {
        let plugins = scan_plugins(&self.root);
        tracing::info!("[plugins] Loaded {} plugin(s) from {:?}", plugins.len(), self.root);
        *self.loaded.write() = plugins;
    }
}

#[async_trait]
impl PluginHost for FsPluginHost {
    async fn install_plugin(&self, name: &str) -> Result<(), String> {
        validate_plugin_name(name)?;

        let entries = registry::fetch_registry_from(&self.http, &self.registry_url).await?;
        let entry = registry::find_entry(&entries, name)
            .ok_or_else(|| format!("Plugin \"{name}\" is not in the registry"))?;

        let response = self
            .http
            .get(&entry.download_url)
            .send()
            .await
            .map_err(|e| format!("Failed to download {name}: {e}"))?;
        if !response.status().is_success() {
            return Err(format!("Download of {name} returned HTTP {}", response.status()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| format!("Failed to download {name}: {e}"))?;

        let dest = self.root.join(name);
        let extract_dest = dest.clone();
        tokio::task::spawn_blocking(move || extract_zip(&bytes, &extract_dest))
            .await
            .map_err(|e| format!("Extraction of {name} was interrupted: {e}"))??;

        if !dest.join("package.json").is_file() {
            let _ = std::fs::remove_dir_all(&dest);
            return Err(format!("Archive for {name} has no package.json"));
        }

        tracing::info!("[plugins] Installed {name} {}", entry.latest_version);
        self.rescan();
        Ok(())
    }

    async fn create_plugin(&self, name: &str, version: &str, main_js: &str) -> Result<(), String> {
        validate_plugin_name(name)?;

        let dir = self.root.join(name);
        if dir.exists() {
            return Err(format!("Plugin already exists at \"{}\"", dir.display()));
        }
        std::fs::create_dir_all(&dir)
            .map_err(|e| format!("Failed to create plugin directory: {e}"))?;

        let package = PluginPackage {
            name: name.to_string(),
            version: version.to_string(),
            main: default_main(),
            description: None,
            themes: Vec::new(),
        };
        let package_json = serde_json::to_string_pretty(&package)
            .map_err(|e| format!("Failed to serialize package.json: {e}"))?;

        std::fs::write(dir.join("package.json"), package_json)
            .map_err(|e| format!("Failed to write package.json: {e}"))?;
        std::fs::write(dir.join(&package.main), main_js)
            .map_err(|e| format!("Failed to write {}: {e}", package.main))?;

        tracing::info!("[plugins] Created {name} {version}");
        Ok(())
    }

    async fn reload_plugins(&self) -> Result<(), String> {
        self.rescan();
        Ok(())
    }

    async fn set_theme(&self, theme: &str) -> Result<(), String> {
        let known = BUILTIN_THEMES.contains(&theme)
            || self
                .loaded
                .read()
                .iter()
                .any(|plugin| plugin.themes.iter().any(|t| t == theme));
        if !known {
            return Err(format!("Theme \"{theme}\" is not provided by any loaded plugin"));
        }
        *self.active_theme.write() = Some(theme.to_string());
        Ok(())
    }
}
