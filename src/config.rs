//! Engine configuration
//!
//! Loaded from a YAML file whose path is given explicitly or taken from
//! `HELIX_LOCATOR_CONFIG`. Every section defaults, so a missing file or a
//! partial file is valid.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use action_locator::{HealingConfig, DEFAULT_IDEMPOTENCY_CAPACITY};
use anyhow::Context;
use helix_fusion::{FusionConfig, WeightConfig};
use helix_scheduler::SchedulerConfig;
use helix_strategy_cache::CacheConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::HelixError;

pub const CONFIG_ENV: &str = "HELIX_LOCATOR_CONFIG";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelixConfig {
    pub scheduler: SchedulerConfig,
    pub fusion: FusionSection,
    pub cache: CacheConfig,
    pub healing: HealingConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Weight learning and agreement bonus, one YAML section.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSection {
    #[serde(flatten)]
    pub weights: WeightConfig,
    #[serde(flatten)]
    pub agreement: FusionConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `cache.json`, `weights.json` and `outcomes.jsonl`.
    /// Learning state stays in memory when unset.
    pub state_dir: Option<PathBuf>,
    pub checkpoint_interval_secs: u64,
    /// Feedback keys and request tickets remembered for replay detection.
    pub idempotency_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            checkpoint_interval_secs: 60,
            idempotency_capacity: DEFAULT_IDEMPOTENCY_CAPACITY,
        }
    }
}

impl StorageConfig {
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs.max(1))
    }

    pub fn cache_path(&self) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|dir| dir.join("cache.json"))
    }

    pub fn weights_path(&self) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|dir| dir.join("weights.json"))
    }

    pub fn outcomes_path(&self) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|dir| dir.join("outcomes.jsonl"))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl HelixConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, HelixError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: HelixConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path`; a file that does not exist yields the defaults.
    pub fn from_path(path: &Path) -> Result<Self, HelixError> {
        if !path.exists() {
            debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(HelixError::ConfigIo)?;
        let config = Self::from_yaml_str(&raw)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Explicit path first, then `HELIX_LOCATOR_CONFIG`, then defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, HelixError> {
        match path {
            Some(path) => Self::from_path(path),
            None => match std::env::var_os(CONFIG_ENV) {
                Some(value) if !value.is_empty() => Self::from_path(Path::new(&value)),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn validate(&self) -> Result<(), HelixError> {
        self.scheduler.validate()?;
        self.cache.validate()?;
        let weights = &self.fusion.weights;
        if !(weights.min_weight > 0.0 && weights.min_weight <= weights.max_weight) {
            return Err(HelixError::InvalidConfig(
                "fusion weights need 0 < min_weight <= max_weight".into(),
            ));
        }
        if self.fusion.agreement.max_bonus < 1.0 {
            return Err(HelixError::InvalidConfig(
                "fusion.max_bonus must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.healing.platform_uncertainty) {
            return Err(HelixError::InvalidConfig(
                "healing.platform_uncertainty must be within [0, 1]".into(),
            ));
        }
        if self.storage.idempotency_capacity == 0 {
            return Err(HelixError::InvalidConfig(
                "storage.idempotency_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Boundary helper for binaries embedding the engine.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<HelixConfig> {
    HelixConfig::load(path).with_context(|| match path {
        Some(path) => format!("failed to load configuration from {}", path.display()),
        None => format!("failed to load configuration (env {CONFIG_ENV})"),
    })
}
