//! Capabilities the deep-link handlers consume.
//!
//! Everything that reaches outside this crate (dialogs, plugin installation,
//! token exchange, navigation) is a trait object bundled into [`Capabilities`]
//! and injected when the dispatcher is built.

use crate::models::settings::{Settings, SettingsPatch};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Dialog payloads
// ---------------------------------------------------------------------------

/// Informational dialog. Fields mirror the link parameters and may be absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertDialog {
    pub title: Option<String>,
    pub message: Option<String>,
}

/// Yes/no confirmation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AskPrompt {
    pub title: String,
    pub message: String,
    pub yes_text: String,
    pub no_text: String,
}

/// Error dialog: title, human-readable message and the raw underlying error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDialog {
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Tab the settings dialog opens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingsTab {
    Plugins,
    Themes,
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Post,
}

/// An action posted to a named route, like a form submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub action: String,
    pub method: Method,
    /// `Some("application/json")` when the body is sent as JSON rather than form data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enc_type: Option<String>,
    pub body: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ModalService: Send + Sync {
    fn show_alert(&self, dialog: AlertDialog);

    /// Show a confirmation and resolve with the user's answer (`true` = yes).
    async fn ask(&self, prompt: AskPrompt) -> bool;

    fn show_settings(&self, tab: SettingsTab);

    fn show_error(&self, dialog: ErrorDialog);
}

#[async_trait]
pub trait PluginHost: Send + Sync {
    /// Install a published plugin by package name.
    async fn install_plugin(&self, name: &str) -> Result<(), String>;

    /// Write a local plugin consisting of a single `main.js` module.
    async fn create_plugin(&self, name: &str, version: &str, main_js: &str) -> Result<(), String>;

    /// Rescan installed plugins.
    async fn reload_plugins(&self) -> Result<(), String>;

    /// Activate a theme exported by a loaded plugin.
    async fn set_theme(&self, theme: &str) -> Result<(), String>;
}

pub trait SettingsStore: Send + Sync {
    fn get_or_create(&self) -> Result<Settings, String>;
    fn update(&self, settings: &Settings, patch: SettingsPatch) -> Result<Settings, String>;
}

/// Exchange of an OAuth authorization code for an access token.
#[async_trait]
pub trait CodeExchange: Send + Sync {
    async fn exchange_code(&self, code: &str, state: &str) -> Result<(), String>;
}

pub trait Navigator: Send + Sync {
    fn submit(&self, submission: Submission);
}

/// Receives the URI of an import requested by a deep link.
/// `None` clears a pending import.
pub trait ImportSink: Send + Sync {
    fn set_import_uri(&self, uri: Option<String>);
}

/// Everything a deep-link handler may touch.
#[derive(Clone)]
pub struct Capabilities {
    pub modals: Arc<dyn ModalService>,
    pub plugins: Arc<dyn PluginHost>,
    pub settings: Arc<dyn SettingsStore>,
    pub github: Arc<dyn CodeExchange>,
    pub gitlab: Arc<dyn CodeExchange>,
    pub navigator: Arc<dyn Navigator>,
    pub import: Arc<dyn ImportSink>,
}
