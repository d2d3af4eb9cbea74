//! Engine configuration (`brandtrace.toml`)
//!
//! Holds scoring weights, the handoff threshold, collector timeouts and the
//! storage root. Weights are keyed by category name so an operator can tune
//! them without a rebuild; an unknown key is rejected at validation time
//! rather than silently ignored.

use crate::engine::scoring::Category;
use crate::{BrandTraceError, BrandTraceResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `storage_root`
pub const STORAGE_ENV: &str = "BRANDTRACE_STORAGE_DIR";
/// Legacy storage variable, honoured when the primary one is absent
pub const LEGACY_STORAGE_ENV: &str = "STORAGE_DIR";

// ─── Top-level ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandTraceConfig {
    /// Root directory under which each session gets its own folder
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub handoff: HandoffConfig,

    #[serde(default)]
    pub collection: CollectionConfig,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("storage")
}

impl Default for BrandTraceConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            scoring: ScoringConfig::default(),
            handoff: HandoffConfig::default(),
            collection: CollectionConfig::default(),
        }
    }
}

// ─── Scoring ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Points per category; must sum to 100
    #[serde(default = "default_weights")]
    pub weights: BTreeMap<String, f64>,

    /// Raw signal assigned to a category with no direct evidence
    #[serde(default = "default_neutral_signal")]
    pub neutral_signal: f64,

    /// Below this many direct categories the confidence band is `low`
    #[serde(default = "default_min_direct")]
    pub min_direct_categories: usize,

    /// A direct raw signal at or above this marks a high-suspicion category
    #[serde(default = "default_high_suspicion")]
    pub high_suspicion_signal: f64,
}

fn default_weights() -> BTreeMap<String, f64> {
    Category::ALL
        .iter()
        .map(|c| (c.key().to_string(), c.default_weight()))
        .collect()
}
fn default_neutral_signal() -> f64 {
    0.5
}
fn default_min_direct() -> usize {
    2
}
fn default_high_suspicion() -> f64 {
    0.8
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            neutral_signal: default_neutral_signal(),
            min_direct_categories: default_min_direct(),
            high_suspicion_signal: default_high_suspicion(),
        }
    }
}

impl ScoringConfig {
    /// Resolve the weight table into fixed category order.
    ///
    /// Fails on unknown keys, missing categories, non-finite or negative
    /// weights, and totals other than 100.
    pub fn resolved_weights(&self) -> BrandTraceResult<[f64; Category::COUNT]> {
        let mut resolved = [f64::NAN; Category::COUNT];
        for (key, weight) in &self.weights {
            let category = Category::from_key(key)
                .ok_or_else(|| BrandTraceError::UnknownCategory(key.clone()))?;
            if !weight.is_finite() || *weight < 0.0 {
                return Err(BrandTraceError::InvalidWeights(format!(
                    "weight for '{}' must be a non-negative number, got {}",
                    key, weight
                )));
            }
            resolved[category.index()] = *weight;
        }
        if let Some(missing) = Category::ALL.iter().find(|c| resolved[c.index()].is_nan()) {
            return Err(BrandTraceError::InvalidWeights(format!(
                "no weight configured for '{}'",
                missing.key()
            )));
        }
        let total: f64 = resolved.iter().sum();
        if (total - 100.0).abs() > 1e-9 {
            return Err(BrandTraceError::InvalidWeights(format!(
                "weights must sum to 100, got {}",
                total
            )));
        }
        Ok(resolved)
    }

    pub fn validate(&self) -> BrandTraceResult<()> {
        self.resolved_weights()?;
        if !(self.neutral_signal > 0.0 && self.neutral_signal < 1.0) {
            return Err(BrandTraceError::Config(format!(
                "neutral_signal must lie strictly between 0 and 1, got {}",
                self.neutral_signal
            )));
        }
        if !(0.0..=1.0).contains(&self.high_suspicion_signal) {
            return Err(BrandTraceError::Config(format!(
                "high_suspicion_signal must lie in [0, 1], got {}",
                self.high_suspicion_signal
            )));
        }
        if self.min_direct_categories > Category::COUNT {
            return Err(BrandTraceError::Config(format!(
                "min_direct_categories cannot exceed {}",
                Category::COUNT
            )));
        }
        Ok(())
    }
}

// ─── Handoff ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffConfig {
    /// Composite score above which a handoff is always warranted
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
}

fn default_score_threshold() -> f64 {
    70.0
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            score_threshold: default_score_threshold(),
        }
    }
}

// ─── Collection ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    #[serde(default = "default_scrape_timeout")]
    pub scrape_timeout_ms: u64,
    #[serde(default = "default_lookup_timeout")]
    pub whois_timeout_ms: u64,
    #[serde(default = "default_lookup_timeout")]
    pub dns_timeout_ms: u64,
    #[serde(default = "default_image_timeout")]
    pub image_timeout_ms: u64,
    /// Timeout for each individual variant registration lookup
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_ms: u64,
    /// Maximum registration lookups in flight at once
    #[serde(default = "default_lookup_concurrency")]
    pub lookup_concurrency: usize,
    /// Extra crawl depth beyond the landing page (0 disables crawling)
    #[serde(default)]
    pub crawl_depth: u32,
    /// Cap on screenshots sent to the multimodal collaborator
    #[serde(default = "default_max_screenshots")]
    pub max_screenshots: usize,
}

fn default_scrape_timeout() -> u64 {
    60_000
}
fn default_lookup_timeout() -> u64 {
    10_000
}
fn default_image_timeout() -> u64 {
    30_000
}
fn default_lookup_concurrency() -> usize {
    8
}
fn default_max_screenshots() -> usize {
    5
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            scrape_timeout_ms: default_scrape_timeout(),
            whois_timeout_ms: default_lookup_timeout(),
            dns_timeout_ms: default_lookup_timeout(),
            image_timeout_ms: default_image_timeout(),
            lookup_timeout_ms: default_lookup_timeout(),
            lookup_concurrency: default_lookup_concurrency(),
            crawl_depth: 0,
            max_screenshots: default_max_screenshots(),
        }
    }
}

impl CollectionConfig {
    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_millis(self.scrape_timeout_ms)
    }
    pub fn whois_timeout(&self) -> Duration {
        Duration::from_millis(self.whois_timeout_ms)
    }
    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }
    pub fn image_timeout(&self) -> Duration {
        Duration::from_millis(self.image_timeout_ms)
    }
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn validate(&self) -> BrandTraceResult<()> {
        let timeouts = [
            ("scrape_timeout_ms", self.scrape_timeout_ms),
            ("whois_timeout_ms", self.whois_timeout_ms),
            ("dns_timeout_ms", self.dns_timeout_ms),
            ("image_timeout_ms", self.image_timeout_ms),
            ("lookup_timeout_ms", self.lookup_timeout_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, ms)| *ms == 0) {
            return Err(BrandTraceError::Config(format!("{} must be greater than zero", name)));
        }
        if self.lookup_concurrency == 0 {
            return Err(BrandTraceError::Config(
                "lookup_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ─── Loading ───────────────────────────────────────────────────────

impl BrandTraceConfig {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: &Path) -> BrandTraceResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BrandTraceConfig = toml::from_str(&content)
            .map_err(|e| BrandTraceError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Try `.brandtrace.toml` then `brandtrace.toml` under `root`, falling
    /// back to defaults when neither loads.
    pub fn from_project_root(root: &Path) -> Self {
        for name in [".brandtrace.toml", "brandtrace.toml"] {
            let path = root.join(name);
            if !path.exists() {
                continue;
            }
            match Self::from_file(&path) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", path.display());
                    return config;
                }
                Err(e) => {
                    tracing::warn!("Failed to load {}: {}, using defaults", path.display(), e);
                }
            }
        }
        Self::default()
    }

    /// Apply `BRANDTRACE_STORAGE_DIR` / `STORAGE_DIR` overrides
    pub fn apply_env_overrides(&mut self) {
        let from_env = std::env::var(STORAGE_ENV)
            .ok()
            .or_else(|| std::env::var(LEGACY_STORAGE_ENV).ok())
            .filter(|v| !v.trim().is_empty());
        if let Some(dir) = from_env {
            tracing::debug!("Storage root overridden by environment: {}", dir);
            self.storage_root = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> BrandTraceResult<()> {
        self.scoring.validate()?;
        self.collection.validate()?;
        let threshold = self.handoff.score_threshold;
        if !(0.0..=100.0).contains(&threshold) {
            return Err(BrandTraceError::Config(format!(
                "handoff.score_threshold must lie in [0, 100], got {}",
                threshold
            )));
        }
        Ok(())
    }
}
