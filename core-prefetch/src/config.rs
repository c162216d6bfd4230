//! # Prefetch Configuration

use crate::integrity::IntegrityPolicy;
use crate::mirrors::MirrorSet;
use core_runtime::config::{CoreConfig, DEFAULT_TOTAL_PAGES};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on concurrent page downloads.
pub const MAX_PARALLELISM: usize = 8;

/// Bulk page prefetch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefetchConfig {
    /// Pages `1..=total_pages` are fetched.
    ///
    /// Default: 604.
    #[serde(default = "default_total_pages")]
    pub total_pages: u32,

    /// Concurrent workers, clamped to `1..=8` when the run starts.
    ///
    /// Default: 6.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Leading pages bundled with the app; counted without network.
    ///
    /// Default: 3.
    #[serde(default = "default_local_prefix")]
    pub local_prefix: u32,

    /// Fraction of pages that must succeed to mark the cache complete.
    ///
    /// Default: 0.95.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: f64,

    /// Report progress after every N successes.
    ///
    /// Default: 3.
    #[serde(default = "default_progress_every")]
    pub progress_every: u32,

    /// Longest a paused worker sleeps before re-checking pause and cancel.
    ///
    /// Default: 150 ms.
    #[serde(default = "default_pause_poll_interval")]
    pub pause_poll_interval: Duration,

    /// How long `run` waits for the workers.
    ///
    /// Default: 45 minutes.
    #[serde(default = "default_join_timeout")]
    pub join_timeout: Duration,

    /// Per-request HTTP timeout.
    ///
    /// Default: 60 seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,

    #[serde(default)]
    pub mirrors: MirrorSet,

    #[serde(default)]
    pub integrity: IntegrityPolicy,
}

fn default_total_pages() -> u32 {
    DEFAULT_TOTAL_PAGES
}

fn default_parallelism() -> usize {
    6
}

fn default_local_prefix() -> u32 {
    3
}

fn default_success_threshold() -> f64 {
    0.95
}

fn default_progress_every() -> u32 {
    3
}

fn default_pause_poll_interval() -> Duration {
    Duration::from_millis(150)
}

fn default_join_timeout() -> Duration {
    Duration::from_secs(45 * 60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            total_pages: default_total_pages(),
            parallelism: default_parallelism(),
            local_prefix: default_local_prefix(),
            success_threshold: default_success_threshold(),
            progress_every: default_progress_every(),
            pause_poll_interval: default_pause_poll_interval(),
            join_timeout: default_join_timeout(),
            request_timeout: default_request_timeout(),
            mirrors: MirrorSet::default(),
            integrity: IntegrityPolicy::default(),
        }
    }
}

impl PrefetchConfig {
    /// Defaults with the corpus size taken from `core`.
    pub fn from_core(core: &CoreConfig) -> Self {
        Self {
            total_pages: core.total_pages,
            ..Default::default()
        }
    }

    pub fn with_total_pages(mut self, pages: u32) -> Self {
        self.total_pages = pages;
        self
    }

    pub fn with_parallelism(mut self, workers: usize) -> Self {
        self.parallelism = workers;
        self
    }

    pub fn with_local_prefix(mut self, pages: u32) -> Self {
        self.local_prefix = pages;
        self
    }

    pub fn with_success_threshold(mut self, threshold: f64) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_progress_every(mut self, successes: u32) -> Self {
        self.progress_every = successes;
        self
    }

    pub fn with_pause_poll_interval(mut self, interval: Duration) -> Self {
        self.pause_poll_interval = interval;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_mirrors(mut self, mirrors: MirrorSet) -> Self {
        self.mirrors = mirrors;
        self
    }

    pub fn with_integrity(mut self, policy: IntegrityPolicy) -> Self {
        self.integrity = policy;
        self
    }

    pub fn effective_parallelism(&self) -> usize {
        self.parallelism.clamp(1, MAX_PARALLELISM)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.total_pages == 0 {
            return Err("total_pages must be > 0".to_string());
        }

        if !(self.success_threshold > 0.0 && self.success_threshold <= 1.0) {
            return Err(format!(
                "success_threshold must be in (0, 1], got {}",
                self.success_threshold
            ));
        }

        if self.progress_every == 0 {
            return Err("progress_every must be > 0".to_string());
        }

        if self.pause_poll_interval.is_zero() {
            return Err("pause_poll_interval must be > 0".to_string());
        }

        if self.join_timeout.is_zero() {
            return Err("join_timeout must be > 0".to_string());
        }

        self.mirrors.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PrefetchConfig::default();
        assert_eq!(config.total_pages, 604);
        assert_eq!(config.effective_parallelism(), 6);
        assert_eq!(config.local_prefix, 3);
        assert_eq!(config.success_threshold, 0.95);
        assert_eq!(config.pause_poll_interval, Duration::from_millis(150));
        assert_eq!(config.join_timeout, Duration::from_secs(2700));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parallelism_is_clamped() {
        assert_eq!(PrefetchConfig::default().with_parallelism(0).effective_parallelism(), 1);
        assert_eq!(PrefetchConfig::default().with_parallelism(32).effective_parallelism(), 8);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(PrefetchConfig::default().with_total_pages(0).validate().is_err());
        assert!(PrefetchConfig::default()
            .with_success_threshold(0.0)
            .validate()
            .is_err());
        assert!(PrefetchConfig::default()
            .with_success_threshold(1.5)
            .validate()
            .is_err());
        assert!(PrefetchConfig::default()
            .with_success_threshold(f64::NAN)
            .validate()
            .is_err());
        assert!(PrefetchConfig::default().with_progress_every(0).validate().is_err());
        assert!(PrefetchConfig::default()
            .with_pause_poll_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(PrefetchConfig::default()
            .with_mirrors(MirrorSet::new("https://pages.test/static.webp"))
            .validate()
            .is_err());
    }

    #[test]
    fn test_deserialize_uses_defaults() {
        let config: PrefetchConfig =
            serde_json::from_str(r#"{"parallelism": 4, "mirrors": {"primary": "https://p.test/{n}.webp"}}"#)
                .unwrap();
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.total_pages, 604);
        assert_eq!(config.mirrors.secondary, None);
        assert!(config.mirrors.cache_bust);
        assert_eq!(config.integrity, IntegrityPolicy::default());
    }
}
