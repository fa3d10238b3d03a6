//! Cache configuration.
//!
//! Provides configuration file support via `lineal.toml`, environment
//! variables, and runtime overrides.
//!
//! # Priority (highest to lowest)
//!
//! 1. Runtime overrides (builder methods)
//! 2. Environment variables (`LINEAL_*`)
//! 3. Configuration file (`lineal.toml`)
//! 4. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default fraction of local max memory granted to the cache.
pub const DEFAULT_CACHE_FRACTION: f64 = 0.05;

/// Fallback for local max memory when no override is configured.
///
/// The hosting runtime normally reports its heap budget; outside a runtime
/// a fixed 4 GiB keeps limits deterministic.
pub const DEFAULT_LOCAL_MAX_MEMORY: u64 = 4 * 1024 * 1024 * 1024;

/// Reuse levels the cache can operate at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    /// Caching disabled entirely.
    None,
    /// Exact-lineage reuse of single instructions.
    FullReuse,
    /// Algebraic-rewrite reuse through an external rewrite hook.
    PartialReuse,
    /// Function-scope reuse of whole output sets.
    MultilevelReuse,
}

impl FromStr for CacheType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "full_reuse" => Ok(Self::FullReuse),
            "partial_reuse" => Ok(Self::PartialReuse),
            "multilevel_reuse" => Ok(Self::MultilevelReuse),
            other => Err(Error::Config(format!("unknown cache type '{other}'"))),
        }
    }
}

/// Eviction scoring policy, selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Pure recency order.
    Lru,
    /// Execution time per byte; cheap-per-byte entries are evicted first.
    #[default]
    #[serde(rename = "costnsize")]
    CostNSize,
    /// Lineage DAG height; shallow entries are evicted first.
    #[serde(rename = "dagheight")]
    DagHeight,
    /// Weighted composite of the above. Excluded from determinism tests.
    Hybrid,
}

impl FromStr for EvictionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lru" => Ok(Self::Lru),
            "costnsize" => Ok(Self::CostNSize),
            "dagheight" => Ok(Self::DagHeight),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(Error::Config(format!("unknown eviction policy '{other}'"))),
        }
    }
}

/// Cache configuration surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enabled reuse levels. `none` must appear alone.
    pub cache_types: Vec<CacheType>,
    /// Eviction scoring policy.
    pub policy: EvictionPolicy,
    /// Whether eviction may spill matrix values to disk.
    pub spill_enabled: bool,
    /// Gates `is_marked_for_caching` on the optimizer's marks.
    pub comp_assisted_rw: bool,
    /// Optional override of the reusable-opcode allow-list.
    pub reusable_opcodes: Option<Vec<String>>,
    /// Fraction of local max memory granted to the cache.
    pub cache_fraction: f64,
    /// Overrides the local max memory the fraction applies to.
    pub memory_limit_bytes: Option<u64>,
    /// Parent directory for the spill working directory.
    ///
    /// When unset, a process-unique temporary directory is used.
    pub workdir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_types: vec![CacheType::FullReuse],
            policy: EvictionPolicy::default(),
            spill_enabled: true,
            comp_assisted_rw: false,
            reusable_opcodes: None,
            cache_fraction: DEFAULT_CACHE_FRACTION,
            memory_limit_bytes: None,
            workdir: None,
        }
    }
}

impl CacheConfig {
    /// Configuration with caching disabled.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            cache_types: vec![CacheType::None],
            ..Self::default()
        }
    }

    /// Configuration with every reuse level enabled.
    #[must_use]
    pub fn all_levels() -> Self {
        Self {
            cache_types: vec![
                CacheType::FullReuse,
                CacheType::PartialReuse,
                CacheType::MultilevelReuse,
            ],
            ..Self::default()
        }
    }

    /// Loads configuration from defaults, `lineal.toml`, and `LINEAL_*`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if extraction or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("lineal.toml"))
    }

    /// Loads configuration layering a specific TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if extraction or validation fails.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("LINEAL_"))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when limits or level combinations are
    /// inconsistent.
    pub fn validate(&self) -> Result<()> {
        if self.cache_types.is_empty() {
            return Err(Error::Config("at least one cache type required".into()));
        }
        if self.cache_types.contains(&CacheType::None) && self.cache_types.len() > 1 {
            return Err(Error::Config(
                "cache type 'none' cannot be combined with other levels".into(),
            ));
        }
        if !(self.cache_fraction > 0.0 && self.cache_fraction <= 1.0) {
            return Err(Error::Config(format!(
                "cache_fraction must be in (0, 1], got {}",
                self.cache_fraction
            )));
        }
        if let Some(ops) = &self.reusable_opcodes {
            for op in ops {
                if op.trim().is_empty() {
                    return Err(Error::Config("empty opcode in reusable_opcodes".into()));
                }
            }
        }
        Ok(())
    }

    /// True when no reuse level is enabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.cache_types.iter().all(|t| *t == CacheType::None)
    }

    /// True when exact-lineage reuse is enabled.
    #[must_use]
    pub fn full_reuse(&self) -> bool {
        self.cache_types.contains(&CacheType::FullReuse)
    }

    /// True when rewrite-based partial reuse is enabled.
    #[must_use]
    pub fn partial_reuse(&self) -> bool {
        self.cache_types.contains(&CacheType::PartialReuse)
    }

    /// True when function-scope reuse is enabled.
    #[must_use]
    pub fn multilevel_reuse(&self) -> bool {
        self.cache_types.contains(&CacheType::MultilevelReuse)
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// The byte budget for resident entries, fixed at engine init.
    #[must_use]
    pub fn cache_limit_bytes(&self) -> u64 {
        let max_memory = self
            .memory_limit_bytes
            .unwrap_or(DEFAULT_LOCAL_MAX_MEMORY);
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let limit = (max_memory as f64 * self.cache_fraction) as u64;
        limit
    }
}
