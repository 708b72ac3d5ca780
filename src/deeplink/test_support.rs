//! Recording implementation of every capability, for handler tests.

use crate::host::{
    AlertDialog, AskPrompt, Capabilities, CodeExchange, ErrorDialog, ImportSink, ModalService,
    Navigator, PluginHost, SettingsStore, SettingsTab, Submission,
};
use crate::models::settings::{Settings, SettingsPatch};
use crate::models::BaseModel;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Effect {
    Alert(AlertDialog),
    Ask(AskPrompt),
    Settings(SettingsTab),
    Error(ErrorDialog),
    Install(String),
    CreatePlugin {
        name: String,
        version: String,
        main_js: String,
    },
    Reload,
    SetTheme(String),
    SettingsUpdate(Option<String>),
    Exchange {
        provider: &'static str,
        code: String,
        state: String,
    },
    Submit(Submission),
    Import(Option<String>),
}

pub(crate) struct RecordingHost {
    effects: Mutex<Vec<Effect>>,
    answer: bool,
    install_error: Option<String>,
    /// Keyed by `create`, `reload` or `set_theme`.
    plugin_errors: HashMap<&'static str, String>,
    exchange_errors: HashMap<&'static str, String>,
    /// When set, `ask` waits for a permit before answering.
    gate: Option<Semaphore>,
}

impl RecordingHost {
    pub(crate) fn new() -> Self {
        Self {
            effects: Mutex::new(Vec::new()),
            answer: true,
            install_error: None,
            plugin_errors: HashMap::new(),
            exchange_errors: HashMap::new(),
            gate: None,
        }
    }

    pub(crate) fn answering(mut self, answer: bool) -> Self {
        self.answer = answer;
        self
    }

    pub(crate) fn failing_install(mut self, error: &str) -> Self {
        self.install_error = Some(error.to_string());
        self
    }

    pub(crate) fn failing_plugin_step(mut self, step: &'static str, error: &str) -> Self {
        self.plugin_errors.insert(step, error.to_string());
        self
    }

    fn plugin_step(&self, step: &str) -> Result<(), String> {
        match self.plugin_errors.get(step) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    pub(crate) fn failing_exchange(mut self, provider: &'static str, error: &str) -> Self {
        self.exchange_errors.insert(provider, error.to_string());
        self
    }

    pub(crate) fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub(crate) fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub(crate) fn release(&self, answers: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(answers);
        }
    }

    pub(crate) fn effects(&self) -> Vec<Effect> {
        self.effects.lock().clone()
    }

    fn record(&self, effect: Effect) {
        self.effects.lock().push(effect);
    }

    pub(crate) fn capabilities(self: &Arc<Self>) -> Capabilities {
        Capabilities {
            modals: self.clone(),
            plugins: self.clone(),
            settings: self.clone(),
            github: Arc::new(RecordingExchange {
                provider: "github",
                host: self.clone(),
            }),
            gitlab: Arc::new(RecordingExchange {
                provider: "gitlab",
                host: self.clone(),
            }),
            navigator: self.clone(),
            import: self.clone(),
        }
    }
}

#[async_trait]
impl ModalService for RecordingHost {
    fn show_alert(&self, dialog: AlertDialog) {
        self.record(Effect::Alert(dialog));
    }

    async fn ask(&self, prompt: AskPrompt) -> bool {
        self.record(Effect::Ask(prompt));
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.answer
    }

    fn show_settings(&self, tab: SettingsTab) {
        self.record(Effect::Settings(tab));
    }

    fn show_error(&self, dialog: ErrorDialog) {
        self.record(Effect::Error(dialog));
    }
}

#[async_trait]
impl PluginHost for RecordingHost {
    async fn install_plugin(&self, name: &str) -> Result<(), String> {
        self.record(Effect::Install(name.to_string()));
        match &self.install_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn create_plugin(&self, name: &str, version: &str, main_js: &str) -> Result<(), String> {
        self.record(Effect::CreatePlugin {
            name: name.to_string(),
            version: version.to_string(),
            main_js: main_js.to_string(),
        });
        self.plugin_step("create")
    }

    async fn reload_plugins(&self) -> Result<(), String> {
        self.record(Effect::Reload);
        self.plugin_step("reload")
    }

    async fn set_theme(&self, theme: &str) -> Result<(), String> {
        self.record(Effect::SetTheme(theme.to_string()));
        self.plugin_step("set_theme")
    }
}

impl SettingsStore for RecordingHost {
    fn get_or_create(&self) -> Result<Settings, String> {
        Ok(Settings {
            base: BaseModel {
                id: "set_test".into(),
                type_tag: "Settings".into(),
                parent_id: String::new(),
                created: 1,
                modified: 1,
                is_private: false,
            },
            theme: "default".into(),
        })
    }

    fn update(&self, settings: &Settings, patch: SettingsPatch) -> Result<Settings, String> {
        self.record(Effect::SettingsUpdate(patch.theme.clone()));
        let mut updated = settings.clone();
        if let Some(theme) = patch.theme {
            updated.theme = theme;
        }
        Ok(updated)
    }
}

impl Navigator for RecordingHost {
    fn submit(&self, submission: Submission) {
        self.record(Effect::Submit(submission));
    }
}

impl ImportSink for RecordingHost {
    fn set_import_uri(&self, uri: Option<String>) {
        self.record(Effect::Import(uri));
    }
}

struct RecordingExchange {
    provider: &'static str,
    host: Arc<RecordingHost>,
}

#[async_trait]
impl CodeExchange for RecordingExchange {
    async fn exchange_code(&self, code: &str, state: &str) -> Result<(), String> {
        self.host.record(Effect::Exchange {
            provider: self.provider,
            code: code.to_string(),
            state: state.to_string(),
        });
        match self.host.exchange_errors.get(self.provider) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
