//! Scripting runtime boundary.
//!
//! The engine ships no interpreter. Script-based patches are executed
//! through the [`ScriptRuntime`]/[`ScriptContext`] traits, implemented by
//! the embedding application over whatever language runtime it embeds. The
//! patch pipeline is the only caller.
//!
//! A script is loaded **once** per distinct patch path into a reusable
//! context; the [`ScriptContextCache`] keeps those contexts in a `DashMap`
//! so slow script execution never contends with the cache's coarse lock.

use std::sync::Arc;

use dashmap::DashMap;
use image::RgbaImage;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::index::PatchRef;

/// Errors crossing the scripting boundary.
#[derive(Debug, Error, Clone)]
pub enum ScriptError {
    /// The script source failed to compile/load.
    #[error("script load failed: {0}")]
    Load(String),

    /// The invoked function raised at runtime.
    #[error("script runtime error: {0}")]
    Runtime(String),
}

/// A value passed into or returned from a script invocation.
///
/// Documents travel as JSON trees; binary image payloads travel as opaque
/// typed handles the script manipulates through host functions.
#[derive(Debug, Clone)]
pub enum ScriptValue {
    Json(Value),
    Image(RgbaImage),
    Str(String),
}

impl ScriptValue {
    /// The JSON payload, if this value carries one.
    pub fn into_json(self) -> Option<Value> {
        match self {
            ScriptValue::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The image payload, if this value carries one.
    pub fn into_image(self) -> Option<RgbaImage> {
        match self {
            ScriptValue::Image(image) => Some(image),
            _ => None,
        }
    }
}

/// Factory for fresh interpreter contexts.
pub trait ScriptRuntime: Send + Sync {
    /// Creates an isolated context with the host bindings installed.
    fn create_context(&self) -> Result<Box<dyn ScriptContext>, ScriptError>;
}

/// One loaded interpreter context.
pub trait ScriptContext: Send {
    /// Compiles and evaluates a script chunk into this context.
    fn load(&mut self, source: &[u8], chunk_name: &str) -> Result<(), ScriptError>;

    /// Invokes a function defined by the loaded chunk. Returns `None` when
    /// the function exists but returned nothing.
    fn invoke(
        &mut self,
        function: &str,
        args: Vec<ScriptValue>,
    ) -> Result<Option<ScriptValue>, ScriptError>;
}

struct CachedContext {
    /// Source id that loaded the context, for the uniqueness check.
    source_id: String,
    context: Arc<Mutex<Box<dyn ScriptContext>>>,
}

/// Per-patch-path cache of loaded interpreter contexts.
///
/// Keyed by normalized patch path. Two unrelated sources claiming the same
/// patch path would silently share one context; instead the owning source
/// id is recorded and a mismatch reloads the context with a warning.
pub struct ScriptContextCache {
    runtime: Arc<dyn ScriptRuntime>,
    contexts: DashMap<String, CachedContext>,
}

impl ScriptContextCache {
    pub fn new(runtime: Arc<dyn ScriptRuntime>) -> Self {
        Self {
            runtime,
            contexts: DashMap::new(),
        }
    }

    /// Returns the loaded context for a patch, creating and loading it on
    /// first use.
    pub fn context_for(
        &self,
        patch: &PatchRef,
    ) -> Result<Arc<Mutex<Box<dyn ScriptContext>>>, ScriptError> {
        let key = patch.path.as_str().to_string();
        let source_id = patch.source.metadata().id;

        if let Some(cached) = self.contexts.get(&key) {
            if cached.source_id == source_id {
                return Ok(Arc::clone(&cached.context));
            }
            warn!(patch = %patch.path, old = %cached.source_id, new = %source_id,
                "patch path re-claimed by a different source, reloading context");
        }

        let bytes = patch
            .source
            .read(&patch.local_name)
            .map_err(|err| ScriptError::Load(err.to_string()))?;

        let mut context = self.runtime.create_context()?;
        context.load(&bytes, patch.path.as_str())?;
        let context = Arc::new(Mutex::new(context));

        self.contexts.insert(
            key,
            CachedContext {
                source_id,
                context: Arc::clone(&context),
            },
        );
        Ok(context)
    }

    /// Number of loaded contexts.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether no context has been loaded yet.
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::path::AssetPath;
    use crate::source::MemorySource;

    /// A runtime whose contexts echo the first argument back, counting how
    /// many contexts were created.
    pub(crate) struct MockRuntime {
        pub contexts_created: AtomicUsize,
    }

    impl MockRuntime {
        pub(crate) fn new() -> Self {
            Self {
                contexts_created: AtomicUsize::new(0),
            }
        }
    }

    struct MockContext;

    impl ScriptContext for MockContext {
        fn load(&mut self, _source: &[u8], _chunk_name: &str) -> Result<(), ScriptError> {
            Ok(())
        }

        fn invoke(
            &mut self,
            _function: &str,
            mut args: Vec<ScriptValue>,
        ) -> Result<Option<ScriptValue>, ScriptError> {
            if args.is_empty() {
                return Ok(None);
            }
            Ok(Some(args.remove(0)))
        }
    }

    impl ScriptRuntime for MockRuntime {
        fn create_context(&self) -> Result<Box<dyn ScriptContext>, ScriptError> {
            self.contexts_created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockContext))
        }
    }

    fn patch_ref(source: &Arc<MemorySource>, name: &str) -> PatchRef {
        PatchRef {
            path: AssetPath::new(name).unwrap(),
            local_name: name.to_string(),
            source: source.clone() as Arc<dyn crate::source::Source>,
        }
    }

    #[test]
    fn test_context_loaded_once_per_path() {
        let source = Arc::new(MemorySource::new("mod"));
        source.insert("a.patch", b"script".to_vec());

        let runtime = Arc::new(MockRuntime::new());
        let cache = ScriptContextCache::new(runtime.clone());

        let patch = patch_ref(&source, "a.patch");
        let first = cache.context_for(&patch).unwrap();
        let second = cache.context_for(&patch).unwrap();

        assert_eq!(runtime.contexts_created.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_paths_get_distinct_contexts() {
        let source = Arc::new(MemorySource::new("mod"));
        source.insert("a.patch", b"script".to_vec());
        source.insert("b.patch", b"script".to_vec());

        let runtime = Arc::new(MockRuntime::new());
        let cache = ScriptContextCache::new(runtime.clone());

        cache.context_for(&patch_ref(&source, "a.patch")).unwrap();
        cache.context_for(&patch_ref(&source, "b.patch")).unwrap();
        assert_eq!(runtime.contexts_created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_same_path_different_source_reloads() {
        let first = Arc::new(MemorySource::new("mod_a"));
        first.insert("a.patch", b"script".to_vec());
        let second = Arc::new(MemorySource::new("mod_b"));
        second.insert("a.patch", b"script".to_vec());

        let runtime = Arc::new(MockRuntime::new());
        let cache = ScriptContextCache::new(runtime.clone());

        let from_first = cache.context_for(&patch_ref(&first, "a.patch")).unwrap();
        let from_second = cache.context_for(&patch_ref(&second, "a.patch")).unwrap();

        assert_eq!(runtime.contexts_created.load(Ordering::SeqCst), 2);
        assert!(!Arc::ptr_eq(&from_first, &from_second));
    }

    #[test]
    fn test_missing_patch_bytes_fail_load() {
        let source = Arc::new(MemorySource::new("mod"));
        let runtime = Arc::new(MockRuntime::new());
        let cache = ScriptContextCache::new(runtime);

        let result = cache.context_for(&patch_ref(&source, "ghost.patch"));
        assert!(matches!(result, Err(ScriptError::Load(_))));
    }
}
