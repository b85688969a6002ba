//! Persisted user configuration.
//!
//! A small keyed string map (template file paths) stored as JSON in the
//! per-user config directory. Unknown keys in the file are kept and missing
//! defaults are merged in on load, so adding a key in a later release never
//! invalidates an existing config file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::{Error, Result};

/// Default config keys, created empty on first load.
pub const DEFAULT_KEYS: &[&str] = &[
    "tensile_template",
    "vda_template",
    "phase_template",
    "tensile_deck",
    "vda_deck",
];

/// User configuration backed by a JSON file.
#[derive(Debug, Clone)]
pub struct TemplateConfig {
    values: BTreeMap<String, String>,
    path: PathBuf,
}

impl TemplateConfig {
    /// Load from the per-user config directory, merging defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path()?)
    }

    /// Load from an explicit path (used by tests and `--config`).
    ///
    /// A missing or unreadable file yields the defaults; a config file should
    /// never prevent the tool from running.
    pub fn load_from(path: PathBuf) -> Result<Self> {
        let mut values: BTreeMap<String, String> = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed config {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };

        for key in DEFAULT_KEYS {
            values.entry(key.to_string()).or_default();
        }

        Ok(Self { values, path })
    }

    /// Get a config value; empty string when unset.
    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    /// Set a value and persist the whole map.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        self.save()
    }

    /// A stored template path, only if the file still exists on disk.
    pub fn template_path(&self, key: &str) -> Option<PathBuf> {
        let value = self.get(key);
        if value.is_empty() {
            return None;
        }
        let path = PathBuf::from(value);
        if path.exists() {
            Some(path)
        } else {
            None
        }
    }

    /// All key/value pairs in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| Error::Config(format!("Cannot create {}: {}", dir.display(), e)))?;
        }
        let text = serde_json::to_string_pretty(&self.values)
            .map_err(|e| Error::Config(format!("Cannot serialize config: {}", e)))?;
        fs::write(&self.path, text)
            .map_err(|e| Error::Config(format!("Cannot write {}: {}", self.path.display(), e)))
    }
}

/// Location of the config file for the current user.
fn default_config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "labreport")
        .ok_or_else(|| Error::Config("Cannot determine user config directory".to_string()))?;
    Ok(dirs.config_dir().join("config.json"))
}

/// Make `path` unique by appending `_1`, `_2`, … before the extension while
/// a file already exists at the candidate path.
pub fn unique_output_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let ext = path.extension().and_then(|e| e.to_str());
    let parent = path.parent().unwrap_or(Path::new(""));

    let mut i = 1;
    loop {
        let name = match ext {
            Some(ext) => format!("{}_{}.{}", stem, i, ext),
            None => format!("{}_{}", stem, i),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        i += 1;
    }
}
