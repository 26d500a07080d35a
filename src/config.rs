// ⚙️ Configuration - file + environment
//
// Precedence: defaults < JSON file (REGSHIELD_CONFIG) < REGSHIELD_* variables

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::gating::{GatingPolicy, DEFAULT_GATED_LIMIT, DEFAULT_GATING_SCORE_THRESHOLD};
use crate::narrative::NarrativeProvider;
use crate::threshold::DEFAULT_STRUCTURING_THRESHOLD;

pub const CONFIG_ENV: &str = "REGSHIELD_CONFIG";
pub const DB_ENV: &str = "REGSHIELD_DB";
pub const DATA_DIR_ENV: &str = "REGSHIELD_DATA_DIR";
pub const ADDR_ENV: &str = "REGSHIELD_ADDR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorMode {
    Disabled,
    /// Local digest reference in place of a chain transaction
    #[default]
    Digest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatingConfig {
    pub score_threshold: f64,
    pub limit: f64,
}

impl Default for GatingConfig {
    fn default() -> Self {
        GatingConfig {
            score_threshold: DEFAULT_GATING_SCORE_THRESHOLD,
            limit: DEFAULT_GATED_LIMIT,
        }
    }
}

impl From<&GatingConfig> for GatingPolicy {
    fn from(config: &GatingConfig) -> Self {
        GatingPolicy::new(config.score_threshold, config.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    pub database_path: PathBuf,
    pub data_dir: PathBuf,
    pub structuring_threshold: f64,
    pub gating: GatingConfig,
    pub narrative_provider: NarrativeProvider,
    pub anchor: AnchorMode,
    pub server_addr: String,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        ScreeningConfig {
            database_path: PathBuf::from("regshield.db"),
            data_dir: PathBuf::from("data"),
            structuring_threshold: DEFAULT_STRUCTURING_THRESHOLD,
            gating: GatingConfig::default(),
            narrative_provider: NarrativeProvider::default(),
            anchor: AnchorMode::default(),
            server_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl ScreeningConfig {
    /// Load from a JSON file; absent keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: ScreeningConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON: {:?}", path.as_ref()))?;

        Ok(config)
    }

    /// Defaults, then `$REGSHIELD_CONFIG` if set, then variable overrides
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(db) = var(DB_ENV) {
            self.database_path = PathBuf::from(db);
        }
        if let Some(dir) = var(DATA_DIR_ENV) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(addr) = var(ADDR_ENV) {
            self.server_addr = addr;
        }
    }
}
