//! Learned per-(platform, generator) trust weights.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use helix_core_types::{GeneratorType, PlatformId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Weight every unseen pair starts from.
pub const DEFAULT_WEIGHT: f64 = 1.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    pub min_weight: f64,
    pub max_weight: f64,
    pub success_factor: f64,
    pub failure_factor: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            min_weight: 0.1,
            max_weight: 3.0,
            success_factor: 1.05,
            failure_factor: 0.95,
        }
    }
}

impl WeightConfig {
    pub fn clamp(&self, weight: f64) -> f64 {
        if weight.is_nan() {
            return DEFAULT_WEIGHT.clamp(self.min_weight, self.max_weight);
        }
        weight.clamp(self.min_weight, self.max_weight)
    }
}

/// Persisted form of one table entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightRecord {
    pub platform: PlatformId,
    pub generator: GeneratorType,
    pub weight: f64,
}

type WeightKey = (PlatformId, GeneratorType);

/// Concurrent weight table. Each weight is stored as the bit pattern of an
/// `f64` inside an `AtomicU64` and updated with a compare-and-swap loop, so
/// concurrent feedback never loses an update and never escapes the bounds.
#[derive(Default)]
pub struct WeightTable {
    weights: DashMap<WeightKey, AtomicU64>,
    config: WeightConfig,
    storage_path: Option<PathBuf>,
    updates: AtomicU64,
}

impl WeightTable {
    pub fn new(config: WeightConfig) -> Self {
        Self {
            weights: DashMap::new(),
            config,
            storage_path: None,
            updates: AtomicU64::new(0),
        }
    }

    /// Table backed by a JSON file; existing contents are loaded.
    pub fn with_persistence(config: WeightConfig, path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let mut table = Self::new(config);
        table.storage_path = Some(path.clone());

        if path.exists() {
            let bytes = fs::read(&path)?;
            if !bytes.is_empty() {
                let records: Vec<WeightRecord> = serde_json::from_slice(&bytes)
                    .map_err(|err| io::Error::new(ErrorKind::InvalidData, format!("{err}")))?;
                for record in records {
                    table.set(&record.platform, record.generator, record.weight);
                }
                debug!(path = %path.display(), entries = table.weights.len(), "weights loaded");
            }
        }
        Ok(table)
    }

    pub fn config(&self) -> &WeightConfig {
        &self.config
    }

    /// Current weight; unseen pairs read the default.
    pub fn get(&self, platform: &PlatformId, generator: GeneratorType) -> f64 {
        self.weights
            .get(&(platform.clone(), generator))
            .map(|slot| f64::from_bits(slot.load(Ordering::Acquire)))
            .unwrap_or_else(|| self.config.clamp(DEFAULT_WEIGHT))
    }

    pub fn set(&self, platform: &PlatformId, generator: GeneratorType, weight: f64) {
        let weight = self.config.clamp(weight);
        self.weights
            .entry((platform.clone(), generator))
            .or_insert_with(|| AtomicU64::new(weight.to_bits()))
            .store(weight.to_bits(), Ordering::Release);
    }

    /// Multiply the weight by `factor`, clamped. Returns the new weight.
    pub fn adjust(&self, platform: &PlatformId, generator: GeneratorType, factor: f64) -> f64 {
        let initial = self.config.clamp(DEFAULT_WEIGHT).to_bits();
        let slot = self
            .weights
            .entry((platform.clone(), generator))
            .or_insert_with(|| AtomicU64::new(initial))
            .downgrade();
        let config = &self.config;
        let previous = slot
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some(config.clamp(f64::from_bits(bits) * factor).to_bits())
            })
            .unwrap_or(initial);
        self.updates.fetch_add(1, Ordering::Relaxed);
        config.clamp(f64::from_bits(previous) * factor)
    }

    pub fn reward(&self, platform: &PlatformId, generator: GeneratorType) -> f64 {
        self.adjust(platform, generator, self.config.success_factor)
    }

    pub fn penalize(&self, platform: &PlatformId, generator: GeneratorType) -> f64 {
        self.adjust(platform, generator, self.config.failure_factor)
    }

    /// Number of adjustments applied since startup.
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// All entries, ordered by platform then generator.
    pub fn records(&self) -> Vec<WeightRecord> {
        let mut records: Vec<WeightRecord> = self
            .weights
            .iter()
            .map(|entry| WeightRecord {
                platform: entry.key().0.clone(),
                generator: entry.key().1,
                weight: f64::from_bits(entry.value().load(Ordering::Acquire)),
            })
            .collect();
        records.sort_by(|a, b| {
            a.platform
                .cmp(&b.platform)
                .then_with(|| a.generator.cmp(&b.generator))
        });
        records
    }

    pub fn persist_now(&self) -> io::Result<()> {
        self.persist_to_disk()
    }

    fn persist_to_disk(&self) -> io::Result<()> {
        let Some(path) = self.storage_path.as_ref() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(&self.records())
            .map_err(|err| io::Error::new(ErrorKind::Other, format!("{err}")))?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, json)?;
        fs::rename(&staging, path).map_err(|err| {
            warn!(error = %err, path = %path.display(), "weight table rename failed");
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn platform() -> PlatformId {
        PlatformId::new("workday")
    }

    #[test]
    fn unseen_pairs_read_the_default() {
        let table = WeightTable::new(WeightConfig::default());
        assert_eq!(table.get(&platform(), GeneratorType::Visual), 1.0);
        assert!(table.records().is_empty());
    }

    #[test]
    fn adjustments_are_multiplicative_and_clamped() {
        let table = WeightTable::new(WeightConfig::default());
        let rewarded = table.reward(&platform(), GeneratorType::Semantic);
        assert!((rewarded - 1.05).abs() < 1e-12);

        for _ in 0..200 {
            table.reward(&platform(), GeneratorType::Semantic);
            table.penalize(&platform(), GeneratorType::Visual);
        }
        assert_eq!(table.get(&platform(), GeneratorType::Semantic), 3.0);
        assert_eq!(table.get(&platform(), GeneratorType::Visual), 0.1);

        table.set(&platform(), GeneratorType::State, 42.0);
        assert_eq!(table.get(&platform(), GeneratorType::State), 3.0);
        table.set(&platform(), GeneratorType::State, 0.0);
        assert_eq!(table.get(&platform(), GeneratorType::State), 0.1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_are_not_lost() {
        let table = Arc::new(WeightTable::new(WeightConfig {
            min_weight: 0.0001,
            max_weight: 1_000_000.0,
            ..WeightConfig::default()
        }));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let table = table.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    table.adjust(&PlatformId::generic(), GeneratorType::Timing, 1.01);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let expected = 1.01_f64.powi(400);
        let actual = table.get(&PlatformId::generic(), GeneratorType::Timing);
        assert!((actual - expected).abs() / expected < 1e-9);
        assert_eq!(table.update_count(), 400);
    }

    #[test]
    fn weights_survive_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.json");
        {
            let table = WeightTable::with_persistence(WeightConfig::default(), &path).unwrap();
            table.reward(&platform(), GeneratorType::Accessibility);
            table.persist_now().unwrap();
        }
        let reloaded = WeightTable::with_persistence(WeightConfig::default(), &path).unwrap();
        assert!((reloaded.get(&platform(), GeneratorType::Accessibility) - 1.05).abs() < 1e-12);
    }
}
