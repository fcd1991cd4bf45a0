//! Engine configuration

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lending engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Longest wait for a per-loan lock before failing with a concurrency error
    pub lock_timeout_ms: u64,
    /// TTL of cached contributor listings
    pub contributors_ttl_secs: u64,
    /// TTL of cached funding metrics; `None` keeps them until the loan changes
    pub metrics_ttl_secs: Option<u64>,
    /// Bound on memoized entries
    pub cache_max_entries: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: peerfund_common::DEFAULT_LOCK_TIMEOUT_MS,
            contributors_ttl_secs: peerfund_common::CONTRIBUTORS_TTL_SECS,
            metrics_ttl_secs: None,
            cache_max_entries: peerfund_common::DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment and `.env`
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();

        if let Ok(val) = std::env::var("PEERFUND_LOCK_TIMEOUT_MS") {
            cfg.lock_timeout_ms = val
                .parse()
                .map_err(|e| anyhow::anyhow!("PEERFUND_LOCK_TIMEOUT_MS: {}", e))?;
        }
        if let Ok(val) = std::env::var("PEERFUND_CONTRIBUTORS_TTL_SECS") {
            cfg.contributors_ttl_secs = val
                .parse()
                .map_err(|e| anyhow::anyhow!("PEERFUND_CONTRIBUTORS_TTL_SECS: {}", e))?;
        }
        if let Ok(val) = std::env::var("PEERFUND_METRICS_TTL_SECS") {
            cfg.metrics_ttl_secs = Some(
                val.parse()
                    .map_err(|e| anyhow::anyhow!("PEERFUND_METRICS_TTL_SECS: {}", e))?,
            );
        }
        if let Ok(val) = std::env::var("PEERFUND_CACHE_MAX_ENTRIES") {
            cfg.cache_max_entries = val
                .parse()
                .map_err(|e| anyhow::anyhow!("PEERFUND_CACHE_MAX_ENTRIES: {}", e))?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.lock_timeout_ms == 0 {
            anyhow::bail!("lock_timeout_ms must be positive");
        }
        if self.cache_max_entries == 0 {
            anyhow::bail!("cache_max_entries must be positive");
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn contributors_ttl(&self) -> Duration {
        Duration::from_secs(self.contributors_ttl_secs)
    }

    pub fn metrics_ttl(&self) -> Option<Duration> {
        self.metrics_ttl_secs.map(Duration::from_secs)
    }
}
