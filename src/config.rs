use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable that relocates the config directory (tests, portable installs).
pub const CONFIG_DIR_ENV: &str = "REQDESK_CONFIG_DIR";

/// Environment variable selecting the build mode at runtime.
pub const BUILD_MODE_ENV: &str = "REQDESK_ENV";

/// Get the config directory using platform-appropriate location.
///
/// - `$REQDESK_CONFIG_DIR` when set and non-empty
/// - macOS: `~/Library/Application Support/reqdesk/`
/// - Linux: `~/.config/reqdesk/` (or `$XDG_CONFIG_HOME`)
/// - Windows: `%APPDATA%/reqdesk/`
///
/// Falls back to `~/.reqdesk/` if the platform dir is unavailable.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .map(|d| d.join("reqdesk"))
        .unwrap_or_else(fallback_dotdir)
}

fn fallback_dotdir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".reqdesk")
}

/// Load a JSON config file, returning Default if missing or corrupt.
/// Corrupt files are logged so they don't silently reset state.
pub fn load_json_config<T: DeserializeOwned + Default>(filename: &str) -> T {
    let path = config_dir().join(filename);
    if !path.exists() {
        return T::default();
    }
    let content = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("[config] Could not read {}: {e}", path.display());
            return T::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("[config] Corrupt {}: {e}. Using defaults.", path.display());
            T::default()
        }
    }
}

/// Save a JSON config file atomically (temp file + rename).
pub fn save_json_config<T: Serialize>(filename: &str, config: &T) -> Result<(), String> {
    let dir = config_dir();
    write_json_atomic(&dir.join(filename), config)
}

/// Write `value` as pretty JSON to `target` via a temp file and rename.
/// Sets 0600 permissions on Unix since these files can hold tokens.
pub(crate) fn write_json_atomic<T: Serialize>(
    target: &std::path::Path,
    value: &T,
) -> Result<(), String> {
    let dir = target
        .parent()
        .ok_or_else(|| format!("{} has no parent directory", target.display()))?;
    std::fs::create_dir_all(dir).map_err(|e| format!("Failed to create config directory: {e}"))?;

    let json =
        serde_json::to_string_pretty(value).map_err(|e| format!("Failed to serialize: {e}"))?;

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp = dir.join(format!("{}.tmp.{}", file_name, std::process::id()));

    std::fs::write(&temp, &json).map_err(|e| format!("Failed to write temp file: {e}"))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&temp, perms)
            .map_err(|e| format!("Failed to set permissions: {e}"))?;
    }

    // Either the old file or the new file exists, never a partial one
    std::fs::rename(&temp, target).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        format!("Failed to commit {}: {e}", target.display())
    })
}

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

/// Whether the running build is a release or a development build.
/// Development builds register a separate URL scheme so both can be installed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Production,
    Development,
}

impl BuildMode {
    pub fn is_development(self) -> bool {
        self == BuildMode::Development
    }

    /// `REQDESK_ENV=development` forces development mode, any other value production.
    fn from_env() -> Option<Self> {
        let value = std::env::var(BUILD_MODE_ENV).ok()?;
        Some(if value.eq_ignore_ascii_case("development") {
            BuildMode::Development
        } else {
            BuildMode::Production
        })
    }
}

/// Token endpoint settings for one git hosting provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthProviderConfig {
    pub client_id: String,
    pub authorize_url: String,
    pub token_url: String,
}

impl OAuthProviderConfig {
    fn github() -> Self {
        Self {
            client_id: String::new(),
            authorize_url: "https://github.com/login/oauth/authorize".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
        }
    }

    fn gitlab() -> Self {
        Self {
            client_id: String::new(),
            authorize_url: "https://gitlab.com/oauth/authorize".to_string(),
            token_url: "https://gitlab.com/oauth/token".to_string(),
        }
    }
}

impl Default for OAuthProviderConfig {
    fn default() -> Self {
        Self::github()
    }
}

const DEFAULT_REGISTRY_URL: &str =
    "https://raw.githubusercontent.com/reqdesk/reqdesk-plugins/main/registry.json";

/// Application configuration persisted in `config.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Canonical private URL scheme, without `://`.
    pub link_scheme: String,
    /// Scheme registered by development builds; rewritten to `link_scheme` in development mode.
    pub dev_link_scheme: String,
    pub build_mode: BuildMode,
    pub plugin_registry_url: String,
    /// Project name shown by the import dialog.
    pub project_name: String,
    pub organization_id: String,
    pub github: OAuthProviderConfig,
    pub gitlab: OAuthProviderConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            link_scheme: "reqdesk".to_string(),
            dev_link_scheme: "reqdeskdev".to_string(),
            build_mode: BuildMode::Production,
            plugin_registry_url: DEFAULT_REGISTRY_URL.to_string(),
            project_name: "reqdesk".to_string(),
            organization_id: String::new(),
            github: OAuthProviderConfig::github(),
            gitlab: OAuthProviderConfig::gitlab(),
        }
    }
}

/// Load `config.json` and apply the `REQDESK_ENV` build-mode override.
pub fn load_app_config() -> AppConfig {
    let mut config: AppConfig = load_json_config("config.json");
    if let Some(mode) = BuildMode::from_env() {
        config.build_mode = mode;
    }
    config
}

pub fn save_app_config(config: &AppConfig) -> Result<(), String> {
    save_json_config("config.json", config)
}
