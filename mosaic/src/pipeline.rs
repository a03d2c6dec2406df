//! Application-facing pipeline surface.
//!
//! [`PipelineBuilder`] mounts sources in order and freezes the namespace;
//! [`AssetPipeline`] is the long-lived handle the application queries.
//! Typed fetches parse a query string, delegate to the cache, and hand back
//! `Arc`-shared payloads.
//!
//! ```ignore
//! use mosaic::{AssetPipeline, DirectorySource, EngineConfig};
//! use std::sync::Arc;
//!
//! let pipeline = AssetPipeline::builder()
//!     .mount(Arc::new(DirectorySource::new("content/base")))
//!     .mount(Arc::new(DirectorySource::new("mods/extras")))
//!     .with_config(EngineConfig::default().with_worker_threads(4))
//!     .build();
//!
//! let config = pipeline.document("data/config.json")?;
//! let sprite = pipeline.image("gfx/sheet.png:walk_0")?;
//! println!("namespace digest: {}", pipeline.digest()?);
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::cache::{AssetCache, CacheStats, CleanupStats};
use crate::config::EngineConfig;
use crate::error::AssetError;
use crate::id::{AssetId, AssetKind};
use crate::index::digest::{compile_ignore_patterns, namespace_digest};
use crate::index::OverlayIndex;
use crate::path::AssetPath;
use crate::payload::{AssetPayload, AudioData, FontData, ImageData};
use crate::script::ScriptRuntime;
use crate::source::{Source, SourceMetadata};

/// Staged configuration for an [`AssetPipeline`].
pub struct PipelineBuilder {
    sources: Vec<Arc<dyn Source>>,
    config: EngineConfig,
    runtime: Option<Arc<dyn ScriptRuntime>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            config: EngineConfig::default(),
            runtime: None,
        }
    }

    /// Mounts a source on top of everything mounted before it. Order is
    /// significant: later sources shadow earlier ones.
    pub fn mount(mut self, source: Arc<dyn Source>) -> Self {
        self.sources.push(source);
        self
    }

    /// Replaces the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Installs the scripting runtime used by script-based patches.
    pub fn with_script_runtime(mut self, runtime: Arc<dyn ScriptRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Merges the namespace, starts the worker pool, and returns the
    /// pipeline handle. The namespace is immutable from here on.
    pub fn build(self) -> AssetPipeline {
        let mut index = OverlayIndex::new();
        for source in self.sources {
            index.mount(source);
        }
        let index = Arc::new(index);
        let cache = AssetCache::new(Arc::clone(&index), self.config.clone(), self.runtime);
        AssetPipeline {
            index,
            cache,
            config: self.config,
            digest: Mutex::new(None),
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The long-lived engine handle.
pub struct AssetPipeline {
    index: Arc<OverlayIndex>,
    cache: AssetCache,
    config: EngineConfig,
    /// Lazily computed; the namespace is frozen, so one computation serves
    /// the process lifetime.
    digest: Mutex<Option<String>>,
}

impl AssetPipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    // -----------------------------------------------------------------
    // Typed fetches
    // -----------------------------------------------------------------

    /// Blocking fetch of any kind.
    pub fn fetch(&self, kind: AssetKind, query: &str) -> Result<AssetPayload, AssetError> {
        let id = AssetId::parse(kind, query)?;
        self.cache.get(&id)
    }

    /// Non-blocking fetch of any kind; `None` means "queued, not ready".
    pub fn try_fetch(
        &self,
        kind: AssetKind,
        query: &str,
    ) -> Result<Option<AssetPayload>, AssetError> {
        let id = AssetId::parse(kind, query)?;
        self.cache.try_get(&id)
    }

    /// Fetches a structured document (`data/x.json`, `data/x.json:/a/b`).
    pub fn document(&self, query: &str) -> Result<Arc<Value>, AssetError> {
        expect_document(self.fetch(AssetKind::Document, query)?, query)
    }

    /// Non-blocking [`document`](Self::document).
    pub fn try_document(&self, query: &str) -> Result<Option<Arc<Value>>, AssetError> {
        self.try_fetch(AssetKind::Document, query)?
            .map(|payload| expect_document(payload, query))
            .transpose()
    }

    /// Fetches a decoded image (`gfx/a.png`, `gfx/sheet.png:f?flipx`).
    pub fn image(&self, query: &str) -> Result<Arc<ImageData>, AssetError> {
        expect_image(self.fetch(AssetKind::Image, query)?, query)
    }

    /// Non-blocking [`image`](Self::image).
    pub fn try_image(&self, query: &str) -> Result<Option<Arc<ImageData>>, AssetError> {
        self.try_fetch(AssetKind::Image, query)?
            .map(|payload| expect_image(payload, query))
            .transpose()
    }

    /// Fetches decoded (or passthrough-compressed) audio.
    pub fn audio(&self, query: &str) -> Result<Arc<AudioData>, AssetError> {
        expect_audio(self.fetch(AssetKind::Audio, query)?, query)
    }

    /// Non-blocking [`audio`](Self::audio).
    pub fn try_audio(&self, query: &str) -> Result<Option<Arc<AudioData>>, AssetError> {
        self.try_fetch(AssetKind::Audio, query)?
            .map(|payload| expect_audio(payload, query))
            .transpose()
    }

    /// Fetches a render-ready font.
    pub fn font(&self, query: &str) -> Result<Arc<FontData>, AssetError> {
        expect_font(self.fetch(AssetKind::Font, query)?, query)
    }

    /// Non-blocking [`font`](Self::font).
    pub fn try_font(&self, query: &str) -> Result<Option<Arc<FontData>>, AssetError> {
        self.try_fetch(AssetKind::Font, query)?
            .map(|payload| expect_font(payload, query))
            .transpose()
    }

    /// Fetches a raw byte blob, verbatim.
    pub fn bytes(&self, query: &str) -> Result<Arc<Vec<u8>>, AssetError> {
        expect_bytes(self.fetch(AssetKind::Bytes, query)?, query)
    }

    /// Non-blocking [`bytes`](Self::bytes).
    pub fn try_bytes(&self, query: &str) -> Result<Option<Arc<Vec<u8>>>, AssetError> {
        self.try_fetch(AssetKind::Bytes, query)?
            .map(|payload| expect_bytes(payload, query))
            .transpose()
    }

    /// Ensures an asset is queued for loading without waiting.
    pub fn queue(&self, kind: AssetKind, query: &str) -> Result<(), AssetError> {
        let id = AssetId::parse(kind, query)?;
        self.cache.queue(&id);
        Ok(())
    }

    /// Bulk [`queue`](Self::queue); invalid queries are skipped.
    pub fn queue_all<'a, I: IntoIterator<Item = &'a str>>(&self, kind: AssetKind, queries: I) {
        let ids = queries
            .into_iter()
            .filter_map(|query| AssetId::parse(kind, query).ok());
        self.cache.queue_all(ids);
    }

    // -----------------------------------------------------------------
    // Namespace queries
    // -----------------------------------------------------------------

    /// Whether a path exists in the merged namespace.
    pub fn exists(&self, path: &str) -> bool {
        AssetPath::new(path)
            .map(|path| self.index.contains(&path))
            .unwrap_or(false)
    }

    /// Namespace paths with the given extension.
    pub fn paths_with_extension(&self, extension: &str) -> Vec<AssetPath> {
        self.index.paths_with_extension(extension)
    }

    /// Namespace paths under the given prefix.
    pub fn paths_with_prefix(&self, prefix: &str) -> Vec<AssetPath> {
        self.index.paths_with_prefix(prefix)
    }

    /// Provenance of a path: owning source first, then patch sources in
    /// chain order.
    pub fn sources_for(&self, path: &str) -> Result<Vec<SourceMetadata>, AssetError> {
        let path = AssetPath::new(path)?;
        self.index
            .sources_for(&path)
            .ok_or_else(|| AssetError::NotFound {
                path: path.to_string(),
            })
    }

    /// Metadata of every mounted source, in mount order.
    pub fn mounted_sources(&self) -> Vec<SourceMetadata> {
        self.index.mounted_sources()
    }

    /// The deterministic namespace digest, computed once and cached.
    pub fn digest(&self) -> Result<String, AssetError> {
        let mut cached = self.digest.lock();
        if let Some(digest) = cached.as_ref() {
            return Ok(digest.clone());
        }
        let patterns = compile_ignore_patterns(&self.config.digest_ignore);
        let digest = namespace_digest(&self.index, &patterns)?;
        *cached = Some(digest.clone());
        Ok(digest)
    }

    // -----------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------

    /// Runs one eviction sweep now (the janitor also runs these
    /// periodically when configured).
    pub fn cleanup(&self) -> CleanupStats {
        self.cache.cleanup()
    }

    /// Force-evicts everything evictable, failure tombstones included.
    pub fn clear_cache(&self) -> usize {
        self.cache.clear()
    }

    /// Cache occupancy snapshot.
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

fn mismatch(query: &str, expected: AssetKind, got: AssetKind) -> AssetError {
    AssetError::Parse {
        path: query.to_string(),
        message: format!("expected a {expected} payload, cache held {got}"),
    }
}

fn expect_document(payload: AssetPayload, query: &str) -> Result<Arc<Value>, AssetError> {
    let kind = payload.kind();
    payload
        .into_document()
        .ok_or_else(|| mismatch(query, AssetKind::Document, kind))
}

fn expect_image(payload: AssetPayload, query: &str) -> Result<Arc<ImageData>, AssetError> {
    let kind = payload.kind();
    payload
        .into_image()
        .ok_or_else(|| mismatch(query, AssetKind::Image, kind))
}

fn expect_audio(payload: AssetPayload, query: &str) -> Result<Arc<AudioData>, AssetError> {
    let kind = payload.kind();
    payload
        .into_audio()
        .ok_or_else(|| mismatch(query, AssetKind::Audio, kind))
}

fn expect_font(payload: AssetPayload, query: &str) -> Result<Arc<FontData>, AssetError> {
    let kind = payload.kind();
    payload
        .into_font()
        .ok_or_else(|| mismatch(query, AssetKind::Font, kind))
}

fn expect_bytes(payload: AssetPayload, query: &str) -> Result<Arc<Vec<u8>>, AssetError> {
    let kind = payload.kind();
    payload
        .into_bytes()
        .ok_or_else(|| mismatch(query, AssetKind::Bytes, kind))
}
