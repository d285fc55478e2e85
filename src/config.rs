//! Configuration loading for tcdedup.
//!
//! Configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.tcdedup/config.toml`)
//! 3. User config (`~/.tcdedup/config.toml`)
//! 4. Defaults (lowest priority)
//!
//! All configuration is optional. The engine runs with the documented
//! thresholds when no config exists.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::dedup::similarity::ActionThresholds;
use crate::error::{DedupError, FailOpen, Result};

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Similarity thresholds.
    pub similarity: SimilarityConfig,
    /// SimHash width and clustering distance.
    pub simhash: SimhashConfig,
    /// Ingest pipeline behavior.
    pub ingest: IngestConfig,
    /// Batch reconciliation behavior.
    pub reconcile: ReconcileConfig,
    /// Record store location.
    pub storage: StorageConfig,
}

/// Similarity thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Score at or above which a near-duplicate is merged automatically.
    pub auto_merge: f64,
    /// Score at or above which a near-duplicate is queued for review.
    pub review_merge: f64,
    /// Minimum score for an existing record to be considered during ingest.
    pub ingest_min: f64,
    /// Default minimum score for similarity queries.
    pub find_min: f64,
}

impl SimilarityConfig {
    /// Check if a threshold is valid (finite and in [0.0, 1.0]).
    pub fn is_valid_threshold(value: f64) -> bool {
        value.is_finite() && (0.0..=1.0).contains(&value)
    }

    /// Review tier must not sit above the auto-merge tier.
    pub fn is_consistent(&self) -> bool {
        self.review_merge <= self.auto_merge
    }

    /// The action tiers as used by the scorer.
    pub fn thresholds(&self) -> ActionThresholds {
        ActionThresholds {
            auto_merge: self.auto_merge,
            review_merge: self.review_merge,
        }
    }
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            auto_merge: 0.97,
            review_merge: 0.88,
            ingest_min: 0.75,
            find_min: 0.7,
        }
    }
}

/// SimHash configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimhashConfig {
    /// Hash width in bits.
    pub bits: usize,
    /// Hamming distance at or below which two records cluster.
    pub hamming_threshold: u32,
}

/// Smallest supported SimHash width.
pub const MIN_SIMHASH_BITS: usize = 32;

/// Largest supported SimHash width.
pub const MAX_SIMHASH_BITS: usize = 256;

impl SimhashConfig {
    /// Check if a width is valid: a multiple of 32 within the supported range.
    pub fn is_valid_bits(value: usize) -> bool {
        (MIN_SIMHASH_BITS..=MAX_SIMHASH_BITS).contains(&value) && value % 32 == 0
    }

    /// Check if a Hamming threshold is usable with the configured width.
    pub fn is_valid_hamming_threshold(&self, value: u32) -> bool {
        (value as usize) < self.bits
    }
}

impl Default for SimhashConfig {
    fn default() -> Self {
        Self {
            bits: crate::dedup::simhash::DEFAULT_BITS,
            hamming_threshold: crate::dedup::simhash::DEFAULT_HAMMING_THRESHOLD,
        }
    }
}

/// Ingest pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// Whether a suspiciously high duplicate rate bypasses dedup.
    pub safety_valve_enabled: bool,
    /// Duplicate rate above which the safety valve trips.
    pub max_duplicate_rate: f64,
    /// Batch size the safety valve needs before it can trip.
    pub min_batch: usize,
}

impl IngestConfig {
    /// Check if a duplicate rate is valid (finite and in [0.0, 1.0]).
    pub fn is_valid_rate(value: f64) -> bool {
        value.is_finite() && (0.0..=1.0).contains(&value)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            safety_valve_enabled: true,
            max_duplicate_rate: 0.8,
            min_batch: 10,
        }
    }
}

/// Batch reconciliation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Fold removed cluster members into the kept record when safe.
    pub merge_into_keep: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            merge_into_keep: true,
        }
    }
}

/// Record store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for project files. Defaults to `<tcdedup_home>/data`.
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration with full precedence chain.
    ///
    /// Precedence (highest to lowest):
    /// 1. Environment variables
    /// 2. Project config (`.tcdedup/config.toml` in cwd)
    /// 3. User config (`~/.tcdedup/config.toml`)
    /// 4. Defaults
    pub fn load() -> Self {
        match env::current_dir() {
            Ok(cwd) => Self::load_from_cwd(&cwd),
            Err(_) => {
                let mut config = Config::default();
                if let Some(user_config) = Self::load_user_config() {
                    config = config.merge(user_config);
                }
                config.apply_env_overrides();
                config.enforce_consistency();
                config
            }
        }
    }

    /// Load configuration with a specific working directory.
    pub fn load_from_cwd(cwd: &Path) -> Self {
        let mut config = Config::default();

        if let Some(user_config) = Self::load_user_config() {
            config = config.merge(user_config);
        }

        if let Some(project_config) = Self::load_project_config(cwd) {
            config = config.merge(project_config);
        }

        config.apply_env_overrides();
        config.enforce_consistency();

        config
    }

    /// Load user config from `~/.tcdedup/config.toml`.
    fn load_user_config() -> Option<Config> {
        let home = tcdedup_home()?;
        Self::load_layer(&home.join("config.toml"))
    }

    /// Load project config from `.tcdedup/config.toml` in the given directory.
    fn load_project_config(cwd: &Path) -> Option<Config> {
        Self::load_layer(&cwd.join(".tcdedup").join("config.toml"))
    }

    /// A missing file is silently skipped; an unreadable one is logged.
    fn load_layer(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        Self::load_from_file(path)
            .map(Some)
            .fail_open_with(&format!("reading {}", path.display()), None)
    }

    /// Load config from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| DedupError::storage(path, e))?;
        toml::from_str(&content).map_err(|e| DedupError::config(e.to_string()))
    }

    /// Directory for the file record store.
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.storage.data_dir.clone().or_else(data_dir)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_threshold("TCDEDUP_AUTO_MERGE", self.similarity.auto_merge) {
            self.similarity.auto_merge = v;
        }
        if let Some(v) = env_threshold("TCDEDUP_REVIEW_MERGE", self.similarity.review_merge) {
            self.similarity.review_merge = v;
        }
        if let Some(v) = env_threshold("TCDEDUP_INGEST_MIN_SIMILARITY", self.similarity.ingest_min)
        {
            self.similarity.ingest_min = v;
        }
        if let Some(v) = env_threshold("TCDEDUP_FIND_MIN_SIMILARITY", self.similarity.find_min) {
            self.similarity.find_min = v;
        }

        // TCDEDUP_SIMHASH_BITS
        if let Some(n) = env_parsed::<usize>("TCDEDUP_SIMHASH_BITS", "a positive integer") {
            if SimhashConfig::is_valid_bits(n) {
                self.simhash.bits = n;
            } else {
                tracing::warn!(
                    "Invalid TCDEDUP_SIMHASH_BITS value '{}'. Must be a multiple of 32 in [{}, {}]. Using '{}'.",
                    n,
                    MIN_SIMHASH_BITS,
                    MAX_SIMHASH_BITS,
                    self.simhash.bits
                );
            }
        }

        // TCDEDUP_HAMMING_THRESHOLD
        if let Some(n) = env_parsed::<u32>("TCDEDUP_HAMMING_THRESHOLD", "a positive integer") {
            if self.simhash.is_valid_hamming_threshold(n) {
                self.simhash.hamming_threshold = n;
            } else {
                tracing::warn!(
                    "Invalid TCDEDUP_HAMMING_THRESHOLD value '{}'. Must be below {}. Using '{}'.",
                    n,
                    self.simhash.bits,
                    self.simhash.hamming_threshold
                );
            }
        }

        // TCDEDUP_SAFETY_VALVE
        if let Ok(val) = env::var("TCDEDUP_SAFETY_VALVE") {
            self.ingest.safety_valve_enabled = val == "true" || val == "1";
        }

        // TCDEDUP_MAX_DUPLICATE_RATE
        if let Some(n) = env_parsed::<f64>("TCDEDUP_MAX_DUPLICATE_RATE", "a decimal number") {
            if IngestConfig::is_valid_rate(n) {
                self.ingest.max_duplicate_rate = n;
            } else {
                tracing::warn!(
                    "Invalid TCDEDUP_MAX_DUPLICATE_RATE value '{}'. Must be in range [0.0, 1.0]. Using '{}'.",
                    n,
                    self.ingest.max_duplicate_rate
                );
            }
        }

        // TCDEDUP_SAFETY_VALVE_MIN_BATCH
        if let Some(n) = env_parsed::<usize>("TCDEDUP_SAFETY_VALVE_MIN_BATCH", "a positive integer")
        {
            self.ingest.min_batch = n;
        }

        // TCDEDUP_MERGE_INTO_KEEP
        if let Ok(val) = env::var("TCDEDUP_MERGE_INTO_KEEP") {
            self.reconcile.merge_into_keep = val == "true" || val == "1";
        }

        // TCDEDUP_DATA_DIR
        if let Ok(val) = env::var("TCDEDUP_DATA_DIR") {
            if val.is_empty() {
                tracing::warn!("TCDEDUP_DATA_DIR is empty, ignoring");
            } else {
                self.storage.data_dir = Some(PathBuf::from(val));
            }
        }
    }

    /// Reset the action tiers if the layers left them out of order.
    fn enforce_consistency(&mut self) {
        if !self.similarity.is_consistent() {
            let defaults = SimilarityConfig::default();
            tracing::warn!(
                "review_merge ({}) is above auto_merge ({}). Using defaults {} / {}.",
                self.similarity.review_merge,
                self.similarity.auto_merge,
                defaults.review_merge,
                defaults.auto_merge
            );
            self.similarity.auto_merge = defaults.auto_merge;
            self.similarity.review_merge = defaults.review_merge;
        }
        if !self.simhash.is_valid_hamming_threshold(self.simhash.hamming_threshold) {
            tracing::warn!(
                "hamming_threshold {} does not fit {}-bit hashes. Using {}.",
                self.simhash.hamming_threshold,
                self.simhash.bits,
                crate::dedup::simhash::DEFAULT_HAMMING_THRESHOLD
            );
            self.simhash.hamming_threshold = crate::dedup::simhash::DEFAULT_HAMMING_THRESHOLD;
        }
    }

    /// Merge another config into this one.
    ///
    /// The `other` config takes precedence. Every non-default, valid field
    /// from `other` is applied to `self`; invalid values are logged and the
    /// current value kept.
    ///
    /// # Limitation
    ///
    /// A layer cannot set a value back to its default to undo a non-default
    /// value from a lower-precedence layer, since "not set in file" and
    /// "explicitly set to default" deserialize the same way.
    fn merge(mut self, other: Config) -> Self {
        // Similarity: merge field by field
        let default_sim = SimilarityConfig::default();
        for (name, target, value, default) in [
            (
                "similarity.auto_merge",
                &mut self.similarity.auto_merge,
                other.similarity.auto_merge,
                default_sim.auto_merge,
            ),
            (
                "similarity.review_merge",
                &mut self.similarity.review_merge,
                other.similarity.review_merge,
                default_sim.review_merge,
            ),
            (
                "similarity.ingest_min",
                &mut self.similarity.ingest_min,
                other.similarity.ingest_min,
                default_sim.ingest_min,
            ),
            (
                "similarity.find_min",
                &mut self.similarity.find_min,
                other.similarity.find_min,
                default_sim.find_min,
            ),
        ] {
            if value != default {
                if SimilarityConfig::is_valid_threshold(value) {
                    *target = value;
                } else {
                    tracing::warn!(
                        "Invalid {} value '{}'. Must be in range [0.0, 1.0]. Using '{}'.",
                        name,
                        value,
                        target
                    );
                }
            }
        }

        // SimHash
        let default_simhash = SimhashConfig::default();
        if other.simhash.bits != default_simhash.bits {
            if SimhashConfig::is_valid_bits(other.simhash.bits) {
                self.simhash.bits = other.simhash.bits;
            } else {
                tracing::warn!(
                    "Invalid simhash.bits value '{}'. Must be a multiple of 32 in [{}, {}]. Using '{}'.",
                    other.simhash.bits,
                    MIN_SIMHASH_BITS,
                    MAX_SIMHASH_BITS,
                    self.simhash.bits
                );
            }
        }
        if other.simhash.hamming_threshold != default_simhash.hamming_threshold {
            self.simhash.hamming_threshold = other.simhash.hamming_threshold;
        }

        // Ingest
        let default_ingest = IngestConfig::default();
        if other.ingest.safety_valve_enabled != default_ingest.safety_valve_enabled {
            self.ingest.safety_valve_enabled = other.ingest.safety_valve_enabled;
        }
        if other.ingest.max_duplicate_rate != default_ingest.max_duplicate_rate {
            if IngestConfig::is_valid_rate(other.ingest.max_duplicate_rate) {
                self.ingest.max_duplicate_rate = other.ingest.max_duplicate_rate;
            } else {
                tracing::warn!(
                    "Invalid ingest.max_duplicate_rate value '{}'. Must be in range [0.0, 1.0]. Using '{}'.",
                    other.ingest.max_duplicate_rate,
                    self.ingest.max_duplicate_rate
                );
            }
        }
        if other.ingest.min_batch != default_ingest.min_batch {
            self.ingest.min_batch = other.ingest.min_batch;
        }

        // Reconcile
        if other.reconcile.merge_into_keep != ReconcileConfig::default().merge_into_keep {
            self.reconcile.merge_into_keep = other.reconcile.merge_into_keep;
        }

        // Storage
        if other.storage.data_dir.is_some() {
            self.storage.data_dir = other.storage.data_dir;
        }

        self
    }
}

/// Parse an env var, warning on values that don't parse.
fn env_parsed<T: std::str::FromStr>(name: &str, expected: &str) -> Option<T> {
    let val = env::var(name).ok()?;
    match val.parse::<T>() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(
                "Invalid {} value '{}'. Expected {}. Keeping current value.",
                name,
                val,
                expected
            );
            None
        }
    }
}

/// Parse a similarity threshold env var, warning on out-of-range values.
fn env_threshold(name: &str, current: f64) -> Option<f64> {
    let n = env_parsed::<f64>(name, "a decimal number")?;
    if SimilarityConfig::is_valid_threshold(n) {
        Some(n)
    } else {
        tracing::warn!(
            "Invalid {} value '{}'. Must be in range [0.0, 1.0]. Using '{}'.",
            name,
            n,
            current
        );
        None
    }
}

/// Get the tcdedup home directory.
///
/// Checks `TCDEDUP_HOME` environment variable first, then falls back to
/// `~/.tcdedup`.
///
/// # Validation
///
/// If `TCDEDUP_HOME` is set, it must be non-empty. Relative paths are
/// canonicalized when they exist and used as-is otherwise.
pub fn tcdedup_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("TCDEDUP_HOME") {
        if home.is_empty() {
            tracing::warn!("TCDEDUP_HOME is empty, using default");
        } else {
            let path = PathBuf::from(&home);
            if path.is_absolute() {
                return Some(path);
            }
            if let Ok(canonical) = path.canonicalize() {
                return Some(canonical);
            }
            tracing::warn!("TCDEDUP_HOME is relative and doesn't exist, using as-is");
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return Some(home.join(".tcdedup"));
    }

    // Containerized/minimal environments without HOME
    let fallback_path = env::temp_dir().join("tcdedup");
    tracing::warn!(
        "HOME not set, using fallback location: {}",
        fallback_path.display()
    );
    Some(fallback_path)
}

/// Get the default data directory.
///
/// Returns `<tcdedup_home>/data/`.
pub fn data_dir() -> Option<PathBuf> {
    tcdedup_home().map(|h| h.join("data"))
}
