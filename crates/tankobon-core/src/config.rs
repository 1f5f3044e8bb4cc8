use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Root application configuration, loaded from `~/.config/tankobon/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub matching: MatchingConfig,
    pub merge: MergeConfig,
    pub cleanup: CleanupConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum evidence confidence for two entries to be linked.
    pub min_confidence: f64,
    /// Minimum similarity for the fuzzy title signal to fire.
    pub fuzzy_threshold: f64,
    /// Groups whose weakest edge falls below this are flagged in reports.
    pub review_threshold: f64,
}

/// Mode names stay strings here; the engine parses and rejects unknown ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub default_mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub default_mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub pretty_json: bool,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.85,
            fuzzy_threshold: 0.87,
            review_threshold: 0.9,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            default_mode: "replace".to_string(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            default_mode: "keep_first".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { pretty_json: true }
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/tankobon/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("TANKOBON_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("tankobon")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        Self::load_from(&path)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to the standard path.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        self.save_to(&path)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }
}
