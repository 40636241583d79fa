//! Settings the document service is configured from.

use crate::file_store::write_json_atomic;
use crate::StoreResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thesis_collab::CollaborationPolicy;

const SETTINGS_FILE: &str = "settings.json";

/// Settings the document service is built from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreSettings {
    /// Directory holding one JSON file per document. `None` keeps documents in memory.
    pub data_dir: Option<PathBuf>,
    /// Collaboration policy applied to every mutation
    pub policy: CollaborationPolicy,
    /// Request ids remembered per document for retry de-duplication
    pub replay_cache_size: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            policy: CollaborationPolicy::default(),
            replay_cache_size: 256,
        }
    }
}

/// Keeps the service settings in `settings.json` inside a config directory
pub struct SettingsManager {
    path: PathBuf,
    current: StoreSettings,
}

impl SettingsManager {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            path: config_dir.as_ref().join(SETTINGS_FILE),
            current: StoreSettings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Settings as last loaded or written
    pub fn settings(&self) -> &StoreSettings {
        &self.current
    }

    /// Read the settings file. A missing file means defaults, and so does a
    /// file that does not parse, with a warning.
    pub fn load(&mut self) -> StoreResult<&StoreSettings> {
        self.current = match fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(
                    path = %self.path.display(),
                    "settings file is not valid, using defaults: {}",
                    e
                );
                StoreSettings::default()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => StoreSettings::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(&self.current)
    }

    /// Write the current settings, replacing the file atomically
    pub fn save(&self) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_json_atomic(&self.path, &self.current)?;
        tracing::debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    /// Apply `change` to the current settings and save them
    pub fn update(&mut self, change: impl FnOnce(&mut StoreSettings)) -> StoreResult<&StoreSettings> {
        change(&mut self.current);
        self.save()?;
        Ok(&self.current)
    }

    pub fn reset(&mut self) -> StoreResult<&StoreSettings> {
        self.current = StoreSettings::default();
        self.save()?;
        Ok(&self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use thesis_collab::FinalizePolicy;

    #[test]
    fn test_default_settings() {
        let settings = StoreSettings::default();
        assert!(settings.data_dir.is_none());
        assert_eq!(settings.replay_cache_size, 256);
        assert!(!settings.policy.allow_cross_category_role_change);
        assert_eq!(settings.policy.finalize, FinalizePolicy::AdvisorOnly);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let parsed: StoreSettings =
            serde_json::from_str(r#"{"policy": {"finalize": "advisor_or_manager"}}"#).unwrap();
        assert_eq!(parsed.policy.finalize, FinalizePolicy::AdvisorOrManager);
        assert_eq!(parsed.replay_cache_size, 256);
    }

    #[test]
    fn test_settings_survive_reload() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = SettingsManager::new(temp_dir.path());
        assert_eq!(manager.load().unwrap(), &StoreSettings::default());

        let docs = temp_dir.path().join("docs");
        manager
            .update(|settings| {
                settings.data_dir = Some(docs.clone());
                settings.replay_cache_size = 8;
            })
            .unwrap();
        assert!(!temp_dir.path().join("settings.json.tmp").exists());

        let mut reloaded = SettingsManager::new(temp_dir.path());
        let settings = reloaded.load().unwrap();
        assert_eq!(settings.data_dir, Some(docs));
        assert_eq!(settings.replay_cache_size, 8);
    }

    #[test]
    fn test_unparsable_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("settings.json"), "{ not json").unwrap();

        let mut manager = SettingsManager::new(temp_dir.path());
        assert_eq!(manager.load().unwrap(), &StoreSettings::default());
    }

    #[test]
    fn test_save_replaces_whole_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, "x".repeat(4096)).unwrap();

        let manager = SettingsManager::new(temp_dir.path());
        manager.save().unwrap();
        let parsed: StoreSettings =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, StoreSettings::default());
    }

    #[test]
    fn test_reset_restores_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = SettingsManager::new(temp_dir.path());
        manager.update(|settings| settings.replay_cache_size = 1).unwrap();

        assert_eq!(manager.reset().unwrap().replay_cache_size, 256);
        let mut reloaded = SettingsManager::new(temp_dir.path());
        assert_eq!(reloaded.load().unwrap(), &StoreSettings::default());
    }
}
