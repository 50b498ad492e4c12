//! Strategy cache
//!
//! Maps `(platform, page type, normalized intent)` to the last strategy that
//! was validated for it, together with outcome counters. Entries expire on a
//! sliding TTL bounded by a maximum lifetime and are evicted early when
//! recent failures outweigh recent successes.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::{Entry, OccupiedEntry};
use dashmap::DashMap;
use helix_core_types::{Intent, PlatformId, Strategy};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Hex characters kept from the digest.
const KEY_HEX_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache storage I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("cache file is corrupt: {0}")]
    Corrupt(String),

    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CacheError::Io(_))
    }

    pub fn severity(&self) -> u8 {
        match self {
            CacheError::Io(_) => 1,
            CacheError::Corrupt(_) | CacheError::InvalidConfig(_) => 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Sliding time-to-live extended by every success.
    pub ttl_secs: u64,
    /// Hard cap on an entry's age regardless of successes.
    pub max_lifetime_secs: u64,
    /// Rolling window the eviction rule looks at.
    pub window_secs: u64,
    /// Evict when failures >= successes + margin inside the window.
    pub eviction_margin: u32,
    /// Maximum number of entries; least recently used go first.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3_600,
            max_lifetime_secs: 7 * 24 * 3_600,
            window_secs: 600,
            eviction_margin: 2,
            capacity: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.ttl_secs == 0 {
            return Err(CacheError::InvalidConfig("ttl_secs must be positive".into()));
        }
        if self.max_lifetime_secs < self.ttl_secs {
            return Err(CacheError::InvalidConfig(
                "max_lifetime_secs must be at least ttl_secs".into(),
            ));
        }
        if self.capacity == 0 {
            return Err(CacheError::InvalidConfig("capacity must be positive".into()));
        }
        Ok(())
    }

    fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_secs as i64)
    }

    fn max_lifetime(&self) -> Duration {
        Duration::seconds(self.max_lifetime_secs as i64)
    }

    fn window(&self) -> Duration {
        Duration::seconds(self.window_secs as i64)
    }
}

/// Deterministic cache key for a request.
pub fn cache_key(platform: &PlatformId, page_type: &str, intent: &Intent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(platform.as_str().as_bytes());
    hasher.update([0x1f_u8]);
    hasher.update(page_type.trim().to_ascii_lowercase().as_bytes());
    hasher.update([0x1f_u8]);
    hasher.update(intent.normalized().as_bytes());
    let mut key = hex::encode(hasher.finalize());
    key.truncate(KEY_HEX_LEN);
    key
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutcomeEvent {
    pub at: DateTime<Utc>,
    pub success: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cache_key: String,
    pub strategy: Strategy,
    pub success_count: u64,
    pub failure_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Outcomes inside the rolling window, oldest first.
    #[serde(default)]
    pub window: Vec<OutcomeEvent>,
}

impl CacheEntry {
    fn new(cache_key: String, strategy: Strategy, now: DateTime<Utc>, config: &CacheConfig) -> Self {
        Self {
            cache_key,
            strategy,
            success_count: 0,
            failure_count: 0,
            created_at: now,
            last_used_at: now,
            expires_at: now + config.ttl(),
            window: Vec::new(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    fn prune_window(&mut self, now: DateTime<Utc>, window: Duration) {
        let horizon = now - window;
        self.window.retain(|event| event.at > horizon);
    }

    /// Count a success and slide the expiry, never past the maximum lifetime.
    fn note_success(&mut self, now: DateTime<Utc>, config: &CacheConfig) {
        self.last_used_at = now;
        self.window.push(OutcomeEvent { at: now, success: true });
        self.prune_window(now, config.window());
        self.success_count += 1;
        let ceiling = self.created_at + config.max_lifetime();
        self.expires_at = (now + config.ttl()).min(ceiling).max(self.expires_at);
    }

    fn window_counts(&self) -> (u64, u64) {
        self.window
            .iter()
            .fold((0, 0), |(ok, failed), event| match event.success {
                true => (ok + 1, failed),
                false => (ok, failed + 1),
            })
    }
}

/// Result of recording an outcome against a key.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheVerdict {
    Retained(CacheEntry),
    Evicted(CacheEntry),
    /// The key now holds a different locator; nothing was recorded.
    Superseded,
    Missing,
}

#[derive(Default)]
struct CacheMetrics {
    lookups: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl CacheMetrics {
    fn record_lookup(&self, hit: bool) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    pub total_lookups: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub stores: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub current_entries: u64,
}

pub struct StrategyCache {
    entries: DashMap<String, CacheEntry>,
    config: CacheConfig,
    storage_path: Option<PathBuf>,
    metrics: CacheMetrics,
}

pub type SharedStrategyCache = Arc<StrategyCache>;

impl StrategyCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            storage_path: None,
            metrics: CacheMetrics::default(),
        }
    }

    /// Cache backed by a JSON file. Live entries are loaded; expired ones
    /// are dropped.
    pub fn with_persistence(
        config: CacheConfig,
        path: impl Into<PathBuf>,
    ) -> Result<Self, CacheError> {
        config.validate()?;
        let path = path.into();
        let mut cache = Self::new(config);
        cache.storage_path = Some(path.clone());

        if path.exists() {
            let bytes = fs::read(&path)?;
            if !bytes.is_empty() {
                let entries: Vec<CacheEntry> = serde_json::from_slice(&bytes)
                    .map_err(|err| CacheError::Corrupt(format!("{}: {err}", path.display())))?;
                let now = Utc::now();
                for entry in entries.into_iter().filter(|entry| !entry.is_expired(now)) {
                    cache.entries.insert(entry.cache_key.clone(), entry);
                }
                info!(path = %path.display(), entries = cache.entries.len(), "strategy cache loaded");
            }
        }
        Ok(cache)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, key: &str) -> Option<CacheEntry> {
        self.lookup_at(key, Utc::now())
    }

    /// Live entry for `key`. An expired entry is dropped and reported as a miss.
    pub fn lookup_at(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let found = match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.last_used_at = now;
                Some(entry.clone())
            }
            Some(_) => None,
            None => {
                self.metrics.record_lookup(false);
                return None;
            }
        };
        if found.is_none()
            && self
                .entries
                .remove_if(key, |_, entry| entry.is_expired(now))
                .is_some()
        {
            self.metrics.expirations.fetch_add(1, Ordering::Relaxed);
            debug!(key, "expired cache entry dropped");
        }
        self.metrics.record_lookup(found.is_some());
        found
    }

    /// Entry without touching statistics or recency.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    pub fn put(&self, key: &str, strategy: Strategy) -> CacheEntry {
        self.put_at(key, strategy, Utc::now())
    }

    /// Promote a strategy. Re-putting the same locator keeps its history;
    /// a different locator replaces the entry.
    pub fn put_at(&self, key: &str, strategy: Strategy, now: DateTime<Utc>) -> CacheEntry {
        self.store(key, strategy, now, false)
    }

    /// Promote a validated strategy and count the success in one step.
    pub fn promote(&self, key: &str, strategy: Strategy) -> CacheEntry {
        self.promote_at(key, strategy, Utc::now())
    }

    pub fn promote_at(&self, key: &str, strategy: Strategy, now: DateTime<Utc>) -> CacheEntry {
        self.store(key, strategy, now, true)
    }

    fn store(&self, key: &str, strategy: Strategy, now: DateTime<Utc>, success: bool) -> CacheEntry {
        let stored = {
            let mut entry = match self.entries.entry(key.to_string()) {
                Entry::Occupied(occupied) => {
                    let mut entry = occupied.into_ref();
                    if entry.strategy.locator == strategy.locator && !entry.is_expired(now) {
                        entry.strategy = strategy;
                        entry.last_used_at = now;
                    } else {
                        *entry = CacheEntry::new(key.to_string(), strategy, now, &self.config);
                    }
                    entry
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(CacheEntry::new(key.to_string(), strategy, now, &self.config))
                }
            };
            if success {
                entry.note_success(now, &self.config);
            }
            entry.clone()
        };
        self.metrics.stores.fetch_add(1, Ordering::Relaxed);
        self.enforce_capacity(key);
        stored
    }

    pub fn record_outcome(&self, key: &str, success: bool) -> CacheVerdict {
        self.record_outcome_at(key, success, Utc::now())
    }

    /// Apply one outcome to the entry under the key's shard lock.
    pub fn record_outcome_at(&self, key: &str, success: bool, now: DateTime<Utc>) -> CacheVerdict {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(occupied) => self.apply_outcome(occupied, success, now),
            Entry::Vacant(_) => CacheVerdict::Missing,
        }
    }

    /// Like [`StrategyCache::record_outcome`], but only while the entry still
    /// holds `locator`. The check and the update share one shard lock.
    pub fn record_outcome_for(&self, key: &str, locator: &str, success: bool) -> CacheVerdict {
        self.record_outcome_for_at(key, locator, success, Utc::now())
    }

    pub fn record_outcome_for_at(
        &self,
        key: &str,
        locator: &str,
        success: bool,
        now: DateTime<Utc>,
    ) -> CacheVerdict {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(occupied) if occupied.get().strategy.locator == locator => {
                self.apply_outcome(occupied, success, now)
            }
            Entry::Occupied(_) => CacheVerdict::Superseded,
            Entry::Vacant(_) => CacheVerdict::Missing,
        }
    }

    fn apply_outcome(
        &self,
        mut occupied: OccupiedEntry<'_, String, CacheEntry>,
        success: bool,
        now: DateTime<Utc>,
    ) -> CacheVerdict {
        let config = &self.config;
        if success {
            let entry = occupied.get_mut();
            entry.note_success(now, config);
            return CacheVerdict::Retained(entry.clone());
        }

        let entry = occupied.get_mut();
        entry.last_used_at = now;
        entry.window.push(OutcomeEvent { at: now, success: false });
        entry.prune_window(now, config.window());
        entry.failure_count += 1;
        let (recent_ok, recent_failed) = entry.window_counts();
        if recent_failed >= recent_ok + u64::from(config.eviction_margin) {
            let (key, evicted) = occupied.remove_entry();
            self.metrics.evictions.fetch_add(1, Ordering::Relaxed);
            info!(
                key = %key,
                locator = %evicted.strategy.locator,
                recent_ok,
                recent_failed,
                "cache entry evicted after repeated failures"
            );
            return CacheVerdict::Evicted(evicted);
        }
        CacheVerdict::Retained(entry.clone())
    }

    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        self.entries.remove(key).map(|(_, entry)| entry)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            self.metrics
                .expirations
                .fetch_add(purged as u64, Ordering::Relaxed);
        }
        purged
    }

    pub fn persist_now(&self) -> Result<(), CacheError> {
        self.purge_expired(Utc::now());
        self.persist_to_disk()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        let total_lookups = self.metrics.lookups.load(Ordering::Relaxed);
        let hits = self.metrics.hits.load(Ordering::Relaxed);
        let hit_rate = if total_lookups == 0 {
            0.0
        } else {
            hits as f64 / total_lookups as f64
        };
        CacheStatsSnapshot {
            total_lookups,
            hits,
            misses: self.metrics.misses.load(Ordering::Relaxed),
            hit_rate,
            stores: self.metrics.stores.load(Ordering::Relaxed),
            evictions: self.metrics.evictions.load(Ordering::Relaxed),
            expirations: self.metrics.expirations.load(Ordering::Relaxed),
            current_entries: self.entries.len() as u64,
        }
    }

    fn enforce_capacity(&self, keep: &str) {
        while self.entries.len() > self.config.capacity {
            let oldest = self
                .entries
                .iter()
                .filter(|entry| entry.key() != keep)
                .min_by_key(|entry| entry.last_used_at)
                .map(|entry| entry.key().clone());
            let Some(oldest) = oldest else {
                break;
            };
            if self.entries.remove(&oldest).is_some() {
                self.metrics.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %oldest, "cache entry evicted for capacity");
            }
        }
    }

    fn persist_to_disk(&self) -> Result<(), CacheError> {
        let Some(path) = self.storage_path.as_ref() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut entries: Vec<CacheEntry> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by(|a, b| a.cache_key.cmp(&b.cache_key));
        let json = serde_json::to_vec_pretty(&entries)
            .map_err(|err| io::Error::new(ErrorKind::Other, format!("{err}")))?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, json)?;
        fs::rename(&staging, path).map_err(|err| {
            warn!(error = %err, path = %path.display(), "strategy cache rename failed");
            CacheError::Io(err)
        })
    }
}
