use super::LinkParams;
use crate::host::{
    AlertDialog, AskPrompt, Capabilities, CodeExchange, ErrorDialog, Method, ModalService,
    PluginHost, SettingsStore, SettingsTab, Submission,
};
use crate::models::settings::SettingsPatch;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

pub const PLUGIN_INSTALL_TITLE: &str = "Plugin Install";
pub const THEME_INSTALL_TITLE: &str = "Install Theme";
/// Version stamped on plugins synthesized from a theme link.
pub const THEME_PLUGIN_VERSION: &str = "0.0.1";

/// One routable action.
///
/// `handle` runs synchronously on the dispatching thread. Work that must wait
/// on a dialog answer or on I/O is returned as a future; the dispatcher spawns
/// it and nobody but the caller of `dispatch` ever waits for it.
pub trait LinkHandler: Send + Sync {
    fn handle(&self, params: &LinkParams, caps: &Capabilities) -> Option<BoxFuture<'static, ()>>;
}

fn param(params: &LinkParams, key: &str) -> Option<String> {
    params.get(key).cloned()
}

fn install_prompt(title: &str, subject: &str) -> AskPrompt {
    AskPrompt {
        title: title.to_string(),
        message: format!("Do you want to install {subject}?"),
        yes_text: "Install".to_string(),
        no_text: "Cancel".to_string(),
    }
}

// ---------------------------------------------------------------------------
// app/alert, app/auth/login, app/import, app/auth/finish
// ---------------------------------------------------------------------------

pub struct AlertHandler;

impl LinkHandler for AlertHandler {
    fn handle(&self, params: &LinkParams, caps: &Capabilities) -> Option<BoxFuture<'static, ()>> {
        caps.modals.show_alert(AlertDialog {
            title: param(params, "title"),
            message: param(params, "message"),
        });
        None
    }
}

pub struct AuthLoginHandler;

impl LinkHandler for AuthLoginHandler {
    fn handle(&self, _params: &LinkParams, caps: &Capabilities) -> Option<BoxFuture<'static, ()>> {
        caps.navigator.submit(Submission {
            action: "/auth/logout".to_string(),
            method: Method::Post,
            enc_type: None,
            body: Value::Object(serde_json::Map::new()),
        });
        None
    }
}

pub struct ImportHandler;

impl LinkHandler for ImportHandler {
    fn handle(&self, params: &LinkParams, caps: &Capabilities) -> Option<BoxFuture<'static, ()>> {
        caps.import.set_import_uri(param(params, "uri"));
        None
    }
}

pub struct AuthFinishHandler;

impl LinkHandler for AuthFinishHandler {
    fn handle(&self, params: &LinkParams, caps: &Capabilities) -> Option<BoxFuture<'static, ()>> {
        // An absent `box` leaves `code` out of the body entirely
        let mut body = serde_json::Map::new();
        if let Some(code) = param(params, "box") {
            body.insert("code".to_string(), Value::String(code));
        }
        caps.navigator.submit(Submission {
            action: "/auth/authorize".to_string(),
            method: Method::Post,
            enc_type: Some("application/json".to_string()),
            body: Value::Object(body),
        });
        None
    }
}

// ---------------------------------------------------------------------------
// plugins/install
// ---------------------------------------------------------------------------

pub struct PluginInstallHandler;

impl LinkHandler for PluginInstallHandler {
    fn handle(&self, params: &LinkParams, caps: &Capabilities) -> Option<BoxFuture<'static, ()>> {
        let name = param(params, "name").unwrap_or_default();
        let modals = Arc::clone(&caps.modals);
        let plugins = Arc::clone(&caps.plugins);

        Some(Box::pin(async move {
            if !modals.ask(install_prompt(PLUGIN_INSTALL_TITLE, &name)).await {
                return;
            }
            match plugins.install_plugin(&name).await {
                Ok(()) => modals.show_settings(SettingsTab::Plugins),
                Err(error) => {
                    tracing::warn!("[deeplink] Plugin install of {name} failed: {error}");
                    modals.show_error(ErrorDialog {
                        title: PLUGIN_INSTALL_TITLE.to_string(),
                        message: "Failed to install plugin".to_string(),
                        error: Some(error),
                    });
                }
            }
        }))
    }
}

// ---------------------------------------------------------------------------
// plugins/theme
// ---------------------------------------------------------------------------

/// A theme carried inside a link, ready to be written out as a plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct ThemeLink {
    pub name: String,
    pub display_name: String,
    /// `main.js` of the synthesized plugin: the theme as the sole export.
    pub main_js: String,
}

impl ThemeLink {
    /// Parse the `theme` parameter. The value is percent-decoded once more
    /// on top of query decoding, then read as a JSON object with a string `name`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let decoded =
            urlencoding::decode(raw).map_err(|e| format!("theme is not valid UTF-8: {e}"))?;
        let definition: Value =
            serde_json::from_str(&decoded).map_err(|e| format!("theme is not valid JSON: {e}"))?;

        let name = definition
            .get("name")
            .and_then(Value::as_str)
            .ok_or("theme has no string `name`")?
            .to_string();
        let display_name = definition
            .get("displayName")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let pretty = serde_json::to_string_pretty(&definition)
            .map_err(|e| format!("theme could not be serialized: {e}"))?;

        Ok(Self {
            name,
            display_name,
            main_js: format!("module.exports.themes = [{pretty}];"),
        })
    }

    pub fn plugin_name(&self) -> String {
        format!("theme-{}", self.name)
    }
}

pub struct PluginThemeHandler;

impl LinkHandler for PluginThemeHandler {
    fn handle(&self, params: &LinkParams, caps: &Capabilities) -> Option<BoxFuture<'static, ()>> {
        let raw = params.get("theme").map(String::as_str).unwrap_or_default();
        let theme = match ThemeLink::parse(raw) {
            Ok(theme) => theme,
            Err(e) => {
                tracing::warn!("[deeplink] Ignoring theme link: {e}");
                return None;
            }
        };

        let modals = Arc::clone(&caps.modals);
        let plugins = Arc::clone(&caps.plugins);
        let settings = Arc::clone(&caps.settings);

        Some(Box::pin(async move {
            if !modals
                .ask(install_prompt(THEME_INSTALL_TITLE, &theme.display_name))
                .await
            {
                return;
            }
            // Steps already completed stay in place when a later one fails
            match install_theme(&theme, plugins.as_ref(), settings.as_ref()).await {
                Ok(()) => modals.show_settings(SettingsTab::Themes),
                Err(e) => tracing::error!("[deeplink] Theme {} not installed: {e}", theme.name),
            }
        }))
    }
}

async fn install_theme(
    theme: &ThemeLink,
    plugins: &dyn PluginHost,
    settings: &dyn SettingsStore,
) -> Result<(), String> {
    plugins
        .create_plugin(&theme.plugin_name(), THEME_PLUGIN_VERSION, &theme.main_js)
        .await?;

    let current = settings.get_or_create()?;
    settings.update(
        &current,
        SettingsPatch {
            theme: Some(theme.name.clone()),
        },
    )?;

    plugins.reload_plugins().await?;
    plugins.set_theme(&theme.name).await
}

// ---------------------------------------------------------------------------
// oauth/{github,gitlab}/authenticate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitProvider {
    GitHub,
    GitLab,
}

impl GitProvider {
    /// Key used for configuration and stored credentials.
    pub fn key(self) -> &'static str {
        match self {
            GitProvider::GitHub => "github",
            GitProvider::GitLab => "gitlab",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "github" => Some(GitProvider::GitHub),
            "gitlab" => Some(GitProvider::GitLab),
            _ => None,
        }
    }

    pub fn error_title(self) -> &'static str {
        match self {
            GitProvider::GitHub => "Error authorizing GitHub",
            GitProvider::GitLab => "Error authorizing GitLab",
        }
    }

    fn exchange(self, caps: &Capabilities) -> Arc<dyn CodeExchange> {
        match self {
            GitProvider::GitHub => Arc::clone(&caps.github),
            GitProvider::GitLab => Arc::clone(&caps.gitlab),
        }
    }
}

pub struct OAuthFinishHandler {
    provider: GitProvider,
}

impl OAuthFinishHandler {
    pub fn new(provider: GitProvider) -> Self {
        Self { provider }
    }
}

impl LinkHandler for OAuthFinishHandler {
    fn handle(&self, params: &LinkParams, caps: &Capabilities) -> Option<BoxFuture<'static, ()>> {
        let code = param(params, "code").unwrap_or_default();
        let state = param(params, "state").unwrap_or_default();
        let provider = self.provider;
        let exchange = provider.exchange(caps);
        let modals: Arc<dyn ModalService> = Arc::clone(&caps.modals);

        Some(Box::pin(async move {
            if let Err(error) = exchange.exchange_code(&code, &state).await {
                tracing::warn!("[deeplink] {}: {error}", provider.error_title());
                modals.show_error(ErrorDialog {
                    title: provider.error_title().to_string(),
                    message: error.clone(),
                    error: Some(error),
                });
            }
        }))
    }
}
