//! Configuration for the cache engine

use crate::cache::codec::CompressionKind;
use crate::error::{CacheError, Result};
use crate::resilience::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Prefix of the environment variables read by [`EngineConfig::from_env`]
pub const ENV_PREFIX: &str = "OUROBOROS_CACHE_";

/// Configuration for [`crate::ResilientCacheEngine`]
///
/// Unknown fields are rejected when deserializing, and [`EngineConfig::validate`]
/// rejects out-of-range values; the engine refuses to start with either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Directory holding warm-tier entry files and the index
    pub warm_dir: PathBuf,

    /// Byte budget of the in-memory tier
    pub hot_size_bytes: usize,

    /// Byte budget of the on-disk tier
    pub warm_size_bytes: usize,

    /// Hit-rate goal reported in metrics (0.0 - 1.0); not enforced
    pub target_hit_rate: f64,

    /// Consecutive warm-tier I/O failures before the breaker opens
    pub failure_threshold: u32,

    /// Time the breaker stays open before probing the warm tier again
    pub recovery_timeout: Duration,

    /// Probe successes required to close the breaker
    pub success_threshold: u32,

    /// Warm hits beyond which an entry is copied into the hot tier
    pub promotion_access_count_threshold: u64,

    /// TTL used by `store_with_default_ttl`
    pub default_ttl: Duration,

    /// TTL jitter factor (0.0 - 1.0) to spread out expirations
    pub ttl_jitter: f64,

    /// Compression applied to entry files
    pub compression: CompressionKind,

    /// Interval of the optional background sweep; `None` disables it
    pub maintenance_interval: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            warm_dir: PathBuf::from("./data/cache"),
            // 64 MB in memory
            hot_size_bytes: 64 * 1024 * 1024,
            // 1 GB on disk
            warm_size_bytes: 1024 * 1024 * 1024,
            target_hit_rate: 0.8,
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
            promotion_access_count_threshold: 3,
            default_ttl: Duration::from_secs(3600),
            ttl_jitter: 0.1,
            compression: CompressionKind::Gzip,
            maintenance_interval: None,
        }
    }
}

impl EngineConfig {
    /// Create a new builder for engine configuration
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.warm_dir.as_os_str().is_empty() {
            return Err(invalid("warm_dir must not be empty"));
        }

        if self.hot_size_bytes == 0 {
            return Err(invalid("hot_size_bytes must be greater than 0"));
        }

        if self.warm_size_bytes == 0 {
            return Err(invalid("warm_size_bytes must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.target_hit_rate) {
            return Err(invalid("target_hit_rate must be between 0.0 and 1.0"));
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err(invalid("ttl_jitter must be between 0.0 and 1.0"));
        }

        if self.default_ttl.is_zero() {
            return Err(invalid("default_ttl must be greater than 0"));
        }

        if let Some(interval) = self.maintenance_interval {
            if interval.is_zero() {
                return Err(invalid("maintenance_interval must be greater than 0"));
            }
        }

        self.circuit_breaker_config().validate()
    }

    /// Breaker settings for the warm tier
    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: self.recovery_timeout,
            success_threshold: self.success_threshold,
        }
    }

    /// Calculate actual TTL with jitter applied
    pub fn ttl_with_jitter(&self) -> Duration {
        if self.ttl_jitter == 0.0 {
            return self.default_ttl;
        }

        let base_secs = self.default_ttl.as_secs_f64();
        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_secs = (base_secs + jitter).max(1.0);

        Duration::from_secs_f64(final_secs)
    }

    /// Parse a JSON document, rejecting unknown keys and invalid values
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| CacheError::ConfigError(format!("invalid config document: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from `OUROBOROS_CACHE_*` environment variables.
    ///
    /// Unset variables keep their defaults. A variable that is set but
    /// cannot be parsed is an error, never silently ignored.
    ///
    /// # Environment Variables
    /// - `OUROBOROS_CACHE_WARM_DIR`
    /// - `OUROBOROS_CACHE_HOT_SIZE_BYTES`
    /// - `OUROBOROS_CACHE_WARM_SIZE_BYTES`
    /// - `OUROBOROS_CACHE_TARGET_HIT_RATE`
    /// - `OUROBOROS_CACHE_FAILURE_THRESHOLD`
    /// - `OUROBOROS_CACHE_RECOVERY_TIMEOUT_SECS`
    /// - `OUROBOROS_CACHE_SUCCESS_THRESHOLD`
    /// - `OUROBOROS_CACHE_PROMOTION_ACCESS_COUNT_THRESHOLD`
    /// - `OUROBOROS_CACHE_DEFAULT_TTL_SECS`
    /// - `OUROBOROS_CACHE_TTL_JITTER`
    /// - `OUROBOROS_CACHE_COMPRESSION` (`none` or `gzip`)
    /// - `OUROBOROS_CACHE_MAINTENANCE_INTERVAL_SECS`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = lookup(var("WARM_DIR").as_str()) {
            config.warm_dir = PathBuf::from(dir);
        }
        if let Some(v) = parse_var(&lookup, "HOT_SIZE_BYTES")? {
            config.hot_size_bytes = v;
        }
        if let Some(v) = parse_var(&lookup, "WARM_SIZE_BYTES")? {
            config.warm_size_bytes = v;
        }
        if let Some(v) = parse_var(&lookup, "TARGET_HIT_RATE")? {
            config.target_hit_rate = v;
        }
        if let Some(v) = parse_var(&lookup, "FAILURE_THRESHOLD")? {
            config.failure_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "RECOVERY_TIMEOUT_SECS")? {
            config.recovery_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse_var(&lookup, "SUCCESS_THRESHOLD")? {
            config.success_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "PROMOTION_ACCESS_COUNT_THRESHOLD")? {
            config.promotion_access_count_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "DEFAULT_TTL_SECS")? {
            config.default_ttl = Duration::from_secs(v);
        }
        if let Some(v) = parse_var(&lookup, "TTL_JITTER")? {
            config.ttl_jitter = v;
        }
        if let Some(v) = parse_var(&lookup, "COMPRESSION")? {
            config.compression = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "MAINTENANCE_INTERVAL_SECS")? {
            config.maintenance_interval = Some(Duration::from_secs(v));
        }

        config.validate()?;
        Ok(config)
    }
}

fn invalid(message: &str) -> CacheError {
    CacheError::ConfigError(message.to_string())
}

fn var(suffix: &str) -> String {
    format!("{}{}", ENV_PREFIX, suffix)
}

fn parse_var<T, L>(lookup: &L, suffix: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    L: Fn(&str) -> Option<String>,
{
    let name = var(suffix);
    match lookup(name.as_str()) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| CacheError::ConfigError(format!("{}={:?}: {}", name, raw, e))),
    }
}

/// Builder for engine configuration
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    warm_dir: Option<PathBuf>,
    hot_size_bytes: Option<usize>,
    warm_size_bytes: Option<usize>,
    target_hit_rate: Option<f64>,
    failure_threshold: Option<u32>,
    recovery_timeout: Option<Duration>,
    success_threshold: Option<u32>,
    promotion_access_count_threshold: Option<u64>,
    default_ttl: Option<Duration>,
    ttl_jitter: Option<f64>,
    compression: Option<CompressionKind>,
    maintenance_interval: Option<Duration>,
}

impl EngineConfigBuilder {
    /// Set the warm-tier directory
    pub fn warm_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.warm_dir = Some(dir.into());
        self
    }

    /// Set the hot-tier byte budget
    pub fn hot_size_bytes(mut self, size: usize) -> Self {
        self.hot_size_bytes = Some(size);
        self
    }

    /// Set the warm-tier byte budget
    pub fn warm_size_bytes(mut self, size: usize) -> Self {
        self.warm_size_bytes = Some(size);
        self
    }

    pub fn target_hit_rate(mut self, rate: f64) -> Self {
        self.target_hit_rate = Some(rate);
        self
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = Some(timeout);
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = Some(threshold);
        self
    }

    pub fn promotion_access_count_threshold(mut self, threshold: u64) -> Self {
        self.promotion_access_count_threshold = Some(threshold);
        self
    }

    /// Set default TTL for cache entries
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    pub fn compression(mut self, compression: CompressionKind) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Enable the background sweep at the given interval
    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = Some(interval);
        self
    }

    /// Build the engine configuration
    pub fn build(self) -> EngineConfig {
        let defaults = EngineConfig::default();

        EngineConfig {
            warm_dir: self.warm_dir.unwrap_or(defaults.warm_dir),
            hot_size_bytes: self.hot_size_bytes.unwrap_or(defaults.hot_size_bytes),
            warm_size_bytes: self.warm_size_bytes.unwrap_or(defaults.warm_size_bytes),
            target_hit_rate: self.target_hit_rate.unwrap_or(defaults.target_hit_rate),
            failure_threshold: self.failure_threshold.unwrap_or(defaults.failure_threshold),
            recovery_timeout: self.recovery_timeout.unwrap_or(defaults.recovery_timeout),
            success_threshold: self.success_threshold.unwrap_or(defaults.success_threshold),
            promotion_access_count_threshold: self
                .promotion_access_count_threshold
                .unwrap_or(defaults.promotion_access_count_threshold),
            default_ttl: self.default_ttl.unwrap_or(defaults.default_ttl),
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            compression: self.compression.unwrap_or(defaults.compression),
            maintenance_interval: self.maintenance_interval.or(defaults.maintenance_interval),
        }
    }
}

/// Preset configurations for common use cases
impl EngineConfig {
    /// Configuration for memory-constrained environments
    pub fn small(warm_dir: impl Into<PathBuf>) -> Self {
        Self {
            warm_dir: warm_dir.into(),
            hot_size_bytes: 4 * 1024 * 1024,   // 4 MB
            warm_size_bytes: 64 * 1024 * 1024, // 64 MB
            default_ttl: Duration::from_secs(1800),
            ..Default::default()
        }
    }

    /// Configuration for large deployments with slow disks
    pub fn large(warm_dir: impl Into<PathBuf>) -> Self {
        let breaker = CircuitBreakerConfig::for_disk();
        Self {
            warm_dir: warm_dir.into(),
            hot_size_bytes: 512 * 1024 * 1024,        // 512 MB
            warm_size_bytes: 16 * 1024 * 1024 * 1024, // 16 GB
            failure_threshold: breaker.failure_threshold,
            recovery_timeout: breaker.recovery_timeout,
            success_threshold: breaker.success_threshold,
            default_ttl: Duration::from_secs(7200),
            maintenance_interval: Some(Duration::from_secs(300)),
            ..Default::default()
        }
    }
}
