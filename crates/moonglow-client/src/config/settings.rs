//! Persisted settings
//!
//! A simple toml record in the config directory. Everything has a default so
//! a missing or partial file always loads.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Helper for serde defaults
fn default_true() -> bool {
    true
}

fn default_journal_capacity() -> usize {
    200
}

/// Auto-start policy: script names played automatically at session start
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutostartConfig {
    /// Played for every character
    #[serde(default)]
    pub global: Vec<String>,
    /// Played only for the named character
    #[serde(default)]
    pub by_character: BTreeMap<String, Vec<String>>,
}

impl AutostartConfig {
    /// All names that should start for this character, global first
    pub fn names_for(&self, character: &str) -> Vec<String> {
        let mut names = self.global.clone();
        if let Some(extra) = self.by_character.get(character) {
            for name in extra {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Add a name, globally or for one character. No-op if already present.
    pub fn add(&mut self, name: &str, character: Option<&str>) {
        let list = match character {
            Some(ch) => self.by_character.entry(ch.to_string()).or_default(),
            None => &mut self.global,
        };
        if !list.iter().any(|n| n == name) {
            list.push(name.to_string());
        }
    }

    /// Remove a name from the global list and every character list
    pub fn remove(&mut self, name: &str) {
        self.global.retain(|n| n != name);
        for list in self.by_character.values_mut() {
            list.retain(|n| n != name);
        }
        self.by_character.retain(|_, list| !list.is_empty());
    }
}

/// Persisted client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Override for the script root directory
    #[serde(default)]
    pub script_dir: Option<PathBuf>,

    #[serde(default)]
    pub autostart: AutostartConfig,

    /// Script groups collapsed in the UI
    #[serde(default)]
    pub collapsed_groups: Vec<String>,

    /// Cache compiled shared-library modules between runs
    #[serde(default = "default_true")]
    pub cache_modules: bool,

    /// Per-script journal buffer capacity
    #[serde(default = "default_journal_capacity")]
    pub journal_capacity: usize,

    /// Mirror logs to a file in the data directory
    #[serde(default)]
    pub log_to_file: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            script_dir: None,
            autostart: AutostartConfig::default(),
            collapsed_groups: Vec::new(),
            cache_modules: true,
            journal_capacity: default_journal_capacity(),
            log_to_file: false,
        }
    }
}

impl Settings {
    /// Load settings from a file, defaults when it does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!(target: "config", "No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let settings = toml::from_str(&contents)
            .with_context(|| format!("parsing settings from {}", path.display()))?;
        Ok(settings)
    }

    /// Write settings back, creating parent directories as needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("serializing settings")?;
        fs::write(path, contents)
            .with_context(|| format!("writing settings to {}", path.display()))?;
        Ok(())
    }

    /// Resolve the script root: explicit setting, else the platform default
    pub fn script_root(&self) -> Option<PathBuf> {
        self.script_dir
            .clone()
            .or_else(super::paths::default_script_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(&dir.path().join("settings.toml")).unwrap();
        assert!(settings.cache_modules);
        assert_eq!(settings.journal_capacity, 200);
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");

        let mut settings = Settings::default();
        settings.autostart.add("heal.rhai", None);
        settings.autostart.add("mine.scr", Some("Aria"));
        settings.collapsed_groups.push("combat".into());
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.autostart.global, vec!["heal.rhai".to_string()]);
        assert_eq!(
            loaded.autostart.names_for("Aria"),
            vec!["heal.rhai".to_string(), "mine.scr".to_string()]
        );
        assert_eq!(loaded.collapsed_groups, vec!["combat".to_string()]);
    }

    #[test]
    fn autostart_add_is_idempotent_and_remove_prunes() {
        let mut autostart = AutostartConfig::default();
        autostart.add("a.scr", None);
        autostart.add("a.scr", None);
        autostart.add("a.scr", Some("Aria"));
        assert_eq!(autostart.global.len(), 1);

        autostart.remove("a.scr");
        assert!(autostart.global.is_empty());
        assert!(autostart.by_character.is_empty());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "log_to_file = true\n").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert!(settings.log_to_file);
        assert!(settings.cache_modules);
    }
}
