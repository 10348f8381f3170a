use crate::error::ConfigError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TITLE_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_CONTENT_DEBOUNCE_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EditorConfig {
    pub title_debounce_ms: u64,
    pub content_debounce_ms: u64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            title_debounce_ms: DEFAULT_TITLE_DEBOUNCE_MS,
            content_debounce_ms: DEFAULT_CONTENT_DEBOUNCE_MS,
        }
    }
}

impl EditorConfig {
    pub fn title_debounce(&self) -> Duration {
        Duration::from_millis(self.title_debounce_ms)
    }

    pub fn content_debounce(&self) -> Duration {
        Duration::from_millis(self.content_debounce_ms)
    }
}

pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn default_store() -> Result<Self, ConfigError> {
        let project_dirs =
            ProjectDirs::from("app", "quire", "Quire").ok_or(ConfigError::ProjectDir)?;
        Ok(Self::new(project_dirs.config_dir().join("editor.json")))
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn load(&self) -> Result<EditorConfig, ConfigError> {
        if !self.config_path.exists() {
            return Ok(EditorConfig::default());
        }
        let raw = fs::read_to_string(&self.config_path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, config: &EditorConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(config)?;
        fs::write(&self.config_path, data)?;
        Ok(())
    }

    pub fn update(
        &self,
        change: impl FnOnce(&mut EditorConfig),
    ) -> Result<EditorConfig, ConfigError> {
        let mut config = self.load()?;
        change(&mut config);
        self.save(&config)?;
        Ok(config)
    }
}
