//! Deterministic fingerprint of the visible namespace.
//!
//! The digest is the only externally comparable artifact the engine
//! produces: two processes whose merged namespaces agree on the filtered
//! `(path, size)` pairs — base files plus their attached patches — compute
//! the same value, regardless of how many sources produced that namespace
//! or in which order they were mounted. Sub-path and directive resolution
//! never contribute.
//!
//! Used for multiplayer/compatibility checks: peers compare digests before
//! trusting that they see the same content.

use glob::Pattern;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::AssetError;

use super::OverlayIndex;

/// Computes the SHA-256 namespace digest as a lowercase hex string.
///
/// Paths are visited in sorted order; a path matching any `ignore` pattern
/// is skipped entirely (its patches included). Failure to size any visible
/// file is fatal: startup must abort rather than publish a digest that
/// silently omits content.
pub fn namespace_digest(index: &OverlayIndex, ignore: &[Pattern]) -> Result<String, AssetError> {
    let mut hasher = Sha256::new();
    let mut hashed = 0usize;

    for (path, descriptor) in index.entries() {
        if ignore.iter().any(|pattern| pattern.matches(path.as_str())) {
            continue;
        }

        let size = descriptor
            .source
            .size(&descriptor.local_name)
            .map_err(|err| AssetError::Digest {
                path: path.to_string(),
                message: err.to_string(),
            })?;

        hasher.update(path.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(size.to_le_bytes());

        for patch in &descriptor.patches {
            let patch_size =
                patch
                    .source
                    .size(&patch.local_name)
                    .map_err(|err| AssetError::Digest {
                        path: patch.path.to_string(),
                        message: err.to_string(),
                    })?;
            hasher.update(patch_size.to_le_bytes());
        }
        hashed += 1;
    }

    debug!(paths = hashed, "computed namespace digest");

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    Ok(hex)
}

/// Compiles configured ignore globs, skipping invalid patterns with a
/// warning.
pub fn compile_ignore_patterns(patterns: &[String]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|raw| match Pattern::new(raw) {
            Ok(pattern) => Some(pattern),
            Err(err) => {
                tracing::warn!(pattern = %raw, error = %err, "ignoring invalid digest pattern");
                None
            }
        })
        .collect()
}
