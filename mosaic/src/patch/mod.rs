//! Layered patch pipeline.
//!
//! A path's patch chain is applied strictly in namespace discovery order;
//! each patch's output feeds the next patch's input. The kind of each chain
//! entry is discovered from its content:
//!
//! - JSON object → structured deep merge (`null` deletes keys)
//! - JSON array → operation list ([`ops`])
//! - anything else → script-based patch, run through the embedded
//!   [`ScriptRuntime`](crate::script::ScriptRuntime)
//!
//! Binary payloads (images) support script patches only.
//!
//! Every failure is non-fatal and local: a patch that cannot be read,
//! parsed, loaded or executed is skipped with a warning and the running
//! result is left unchanged. A broken mod must never take down the base
//! content it patches.

mod ops;

use std::sync::Arc;

use image::RgbaImage;
use serde_json::Value;
use tracing::{debug, warn};

use crate::index::PatchRef;
use crate::path::AssetPath;
use crate::script::{ScriptContextCache, ScriptRuntime, ScriptValue};

/// Name of the entry function a script patch must define.
const PATCH_FUNCTION: &str = "patch";

/// Applies patch chains to documents and images.
pub(crate) struct PatchPipeline {
    scripts: Option<ScriptContextCache>,
}

impl PatchPipeline {
    /// Creates a pipeline. Without a script runtime, script-based patches
    /// are skipped (with a warning) instead of failing.
    pub(crate) fn new(runtime: Option<Arc<dyn ScriptRuntime>>) -> Self {
        Self {
            scripts: runtime.map(ScriptContextCache::new),
        }
    }

    /// Runs a document through its patch chain.
    pub(crate) fn apply_document(
        &self,
        base: Value,
        target: &AssetPath,
        chain: &[PatchRef],
    ) -> Value {
        let mut doc = base;
        for patch in chain {
            let bytes = match patch.source.read(&patch.local_name) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(patch = %patch.path, error = %err, "unreadable patch skipped");
                    continue;
                }
            };

            match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(overlay)) => {
                    debug!(patch = %patch.path, doc = %target, "applying merge patch");
                    deep_merge(&mut doc, Value::Object(overlay));
                }
                Ok(Value::Array(list)) => {
                    debug!(patch = %patch.path, doc = %target, "applying operation list");
                    ops::apply_operation_list(&mut doc, &list, patch.path.as_str());
                }
                Ok(other) => {
                    warn!(patch = %patch.path, kind = %json_kind(&other),
                        "scalar JSON is not a patch, skipped");
                }
                Err(_) => {
                    doc = self.run_document_script(doc, target, patch);
                }
            }
        }
        doc
    }

    /// Runs a decoded image through its patch chain. Only script patches
    /// apply; structured entries are skipped.
    pub(crate) fn apply_image(
        &self,
        base: RgbaImage,
        target: &AssetPath,
        chain: &[PatchRef],
    ) -> RgbaImage {
        let mut image = base;
        for patch in chain {
            let bytes = match patch.source.read(&patch.local_name) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(patch = %patch.path, error = %err, "unreadable patch skipped");
                    continue;
                }
            };

            if serde_json::from_slice::<Value>(&bytes).is_ok() {
                warn!(patch = %patch.path, image = %target,
                    "structured patches do not apply to binary payloads, skipped");
                continue;
            }

            image = self.run_image_script(image, target, patch);
        }
        image
    }

    fn run_document_script(&self, doc: Value, target: &AssetPath, patch: &PatchRef) -> Value {
        let Some(scripts) = &self.scripts else {
            warn!(patch = %patch.path, "no script runtime configured, patch skipped");
            return doc;
        };

        let context = match scripts.context_for(patch) {
            Ok(context) => context,
            Err(err) => {
                warn!(patch = %patch.path, error = %err, "script context unavailable, patch skipped");
                return doc;
            }
        };

        let args = vec![
            ScriptValue::Json(doc.clone()),
            ScriptValue::Str(target.to_string()),
        ];
        let result = context.lock().invoke(PATCH_FUNCTION, args);
        match result {
            Ok(Some(ScriptValue::Json(replacement))) => replacement,
            Ok(returned) => {
                warn!(patch = %patch.path, returned = returned.is_some(),
                    "script did not return a document, patch skipped");
                doc
            }
            Err(err) => {
                warn!(patch = %patch.path, error = %err, "script failed, patch skipped");
                doc
            }
        }
    }

    fn run_image_script(
        &self,
        image: RgbaImage,
        target: &AssetPath,
        patch: &PatchRef,
    ) -> RgbaImage {
        let Some(scripts) = &self.scripts else {
            warn!(patch = %patch.path, "no script runtime configured, patch skipped");
            return image;
        };

        let context = match scripts.context_for(patch) {
            Ok(context) => context,
            Err(err) => {
                warn!(patch = %patch.path, error = %err, "script context unavailable, patch skipped");
                return image;
            }
        };

        let args = vec![
            ScriptValue::Image(image.clone()),
            ScriptValue::Str(target.to_string()),
        ];
        let result = context.lock().invoke(PATCH_FUNCTION, args);
        match result {
            Ok(Some(ScriptValue::Image(replacement))) => replacement,
            Ok(returned) => {
                warn!(patch = %patch.path, returned = returned.is_some(),
                    "script did not return an image, patch skipped");
                image
            }
            Err(err) => {
                warn!(patch = %patch.path, error = %err, "script failed, patch skipped");
                image
            }
        }
    }
}

/// Deep-merges `patch` onto `doc`. Object fields merge recursively, `null`
/// deletes the key, everything else replaces.
pub(crate) fn deep_merge(doc: &mut Value, patch: Value) {
    match (doc, patch) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                if value.is_null() {
                    base.remove(&key);
                } else if let Some(existing) = base.get_mut(&key) {
                    deep_merge(existing, value);
                } else {
                    base.insert(key, value);
                }
            }
        }
        (slot, replacement) => *slot = replacement,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
