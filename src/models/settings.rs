//! The single application settings record.

use super::{BaseModel, Model, Repository};
use crate::host::SettingsStore;
use serde::{Deserialize, Serialize};

pub const DEFAULT_THEME: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseSettings {
    pub theme: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(flatten)]
    pub base: BaseModel,
    #[serde(default = "default_theme")]
    pub theme: String,
}

fn default_theme() -> String {
    DEFAULT_THEME.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

impl Model for Settings {
    const NAME: &'static str = "Settings";
    const TYPE: &'static str = "Settings";
    const PREFIX: &'static str = "set";
    const CAN_DUPLICATE: bool = false;
    const CAN_SYNC: bool = false;
    const REQUIRES_PARENT: bool = false;

    type Fields = BaseSettings;
    type Patch = SettingsPatch;

    fn init() -> BaseSettings {
        BaseSettings {
            theme: default_theme(),
        }
    }

    fn base(&self) -> &BaseModel {
        &self.base
    }
}

impl SettingsStore for Repository<Settings> {
    fn get_or_create(&self) -> Result<Settings, String> {
        if let Some(settings) = self.all().map_err(|e| e.to_string())?.into_iter().next() {
            return Ok(settings);
        }
        self.create(&SettingsPatch::default())
            .map_err(|e| e.to_string())
    }

    fn update(&self, settings: &Settings, patch: SettingsPatch) -> Result<Settings, String> {
        Repository::<Settings>::update(self, settings, &patch).map_err(|e| e.to_string())
    }
}
