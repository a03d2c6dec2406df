//! Engine configuration.
//!
//! `EngineConfig` collects every tunable of the cache and builders in one
//! place, with builder-style `with_*` setters. It derives
//! `serde::Deserialize` so a front end can read it from a JSON config file;
//! every field has a default, so partial configs work.

use std::time::Duration;

use serde::Deserialize;

/// Default number of worker threads in the load pool.
pub const DEFAULT_WORKER_THREADS: usize = 2;

/// Default idle time after which a cached, unreferenced asset is evicted.
pub const DEFAULT_ASSET_TTL_SECS: u64 = 30;

/// Default interval of the janitor thread running [`cleanup`] sweeps.
///
/// [`cleanup`]: crate::pipeline::AssetPipeline::cleanup
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 10;

/// Default longest duration that is still eagerly decompressed in the audio
/// post-process phase. Longer clips keep their compressed payload and are
/// decoded by the playback layer instead.
pub const DEFAULT_AUDIO_DECOMPRESS_MAX_SECS: u64 = 10;

/// Tunables for the asset pipeline.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of OS threads in the worker pool. Caller threads additionally
    /// participate while blocked in `get`.
    pub worker_threads: usize,

    /// Idle time after which a cached, non-queued, non-retained asset is
    /// evicted by a cleanup sweep.
    pub asset_ttl: Duration,

    /// Interval of the background janitor thread. `None` disables the
    /// janitor; sweeps then only happen through explicit `cleanup()` calls.
    pub cleanup_interval: Option<Duration>,

    /// Compressed audio up to this duration is eagerly decoded to PCM in
    /// the post-process phase; anything longer passes through compressed.
    pub audio_decompress_max: Duration,

    /// Query string of an image substituted for any image that fails to
    /// build, instead of tombstoning the failure.
    pub image_fallback: Option<String>,

    /// Query string of an audio asset substituted for any audio that fails
    /// to build, instead of tombstoning the failure.
    pub audio_fallback: Option<String>,

    /// Glob patterns of namespace paths excluded from the digest.
    pub digest_ignore: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            asset_ttl: Duration::from_secs(DEFAULT_ASSET_TTL_SECS),
            cleanup_interval: Some(Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS)),
            audio_decompress_max: Duration::from_secs(DEFAULT_AUDIO_DECOMPRESS_MAX_SECS),
            image_fallback: None,
            audio_fallback: None,
            digest_ignore: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Sets the worker pool size.
    pub fn with_worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = count;
        self
    }

    /// Sets the eviction TTL.
    pub fn with_asset_ttl(mut self, ttl: Duration) -> Self {
        self.asset_ttl = ttl;
        self
    }

    /// Sets the janitor interval, or disables the janitor with `None`.
    pub fn with_cleanup_interval(mut self, interval: Option<Duration>) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Sets the eager-decompression duration cutoff.
    pub fn with_audio_decompress_max(mut self, max: Duration) -> Self {
        self.audio_decompress_max = max;
        self
    }

    /// Sets the fallback image query.
    pub fn with_image_fallback(mut self, query: impl Into<String>) -> Self {
        self.image_fallback = Some(query.into());
        self
    }

    /// Sets the fallback audio query.
    pub fn with_audio_fallback(mut self, query: impl Into<String>) -> Self {
        self.audio_fallback = Some(query.into());
        self
    }

    /// Adds a digest ignore pattern.
    pub fn with_digest_ignore(mut self, pattern: impl Into<String>) -> Self {
        self.digest_ignore.push(pattern.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.worker_threads, DEFAULT_WORKER_THREADS);
        assert_eq!(config.asset_ttl, Duration::from_secs(DEFAULT_ASSET_TTL_SECS));
        assert_eq!(
            config.cleanup_interval,
            Some(Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS))
        );
        assert!(config.image_fallback.is_none());
        assert!(config.digest_ignore.is_empty());
    }

    #[test]
    fn test_builder_setters() {
        let config = EngineConfig::default()
            .with_worker_threads(4)
            .with_asset_ttl(Duration::from_secs(5))
            .with_cleanup_interval(None)
            .with_image_fallback("gfx/missing.png")
            .with_digest_ignore("*.tmp");
        assert_eq!(config.worker_threads, 4);
        assert_eq!(config.asset_ttl, Duration::from_secs(5));
        assert_eq!(config.cleanup_interval, None);
        assert_eq!(config.image_fallback.as_deref(), Some("gfx/missing.png"));
        assert_eq!(config.digest_ignore, vec!["*.tmp".to_string()]);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"worker_threads": 8, "digest_ignore": ["*.md"]}"#).unwrap();
        assert_eq!(config.worker_threads, 8);
        assert_eq!(config.digest_ignore, vec!["*.md".to_string()]);
        // Unspecified fields fall back to defaults.
        assert_eq!(config.asset_ttl, Duration::from_secs(DEFAULT_ASSET_TTL_SECS));
    }
}
