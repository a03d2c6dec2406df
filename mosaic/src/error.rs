//! Engine-level error taxonomy.
//!
//! Errors fall into two groups with different lifecycles:
//!
//! - **Synchronous** errors ([`AssetError::InvalidPath`], [`AssetError::NotFound`])
//!   are raised before any build is attempted and are never cached.
//! - **Build** errors (everything else) become permanent failure tombstones in
//!   the cache: every later request for the same asset re-raises the identical
//!   error without re-attempting the build, until the cache is cleared.
//!
//! All variants are `Clone` so a tombstone can be re-raised verbatim.

use thiserror::Error;

/// Errors produced by the asset pipeline.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssetError {
    /// The request string is not a well-formed asset path or query.
    ///
    /// Raised synchronously; never cached.
    #[error("invalid asset path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// No descriptor is registered for the path in the merged namespace.
    ///
    /// Raised synchronously; never cached.
    #[error("no asset registered for '{path}'")]
    NotFound { path: String },

    /// A document, image, audio container, font, or sidecar file failed to
    /// parse or decode. Becomes a tombstone.
    #[error("failed to parse '{path}': {message}")]
    Parse { path: String, message: String },

    /// The owning source failed to deliver the bytes at build time.
    /// Becomes a tombstone.
    #[error("source error reading '{path}': {message}")]
    Source { path: String, message: String },

    /// A registered path could not be sized while computing the namespace
    /// digest. Fatal at startup.
    #[error("cannot size '{path}' for namespace digest: {message}")]
    Digest { path: String, message: String },

    /// A sprite frame was requested but no frames sidecar exists anywhere
    /// between the image's directory and the namespace root.
    #[error("no frames file found for image '{path}'")]
    NoFrames { path: String },

    /// The resolved frames sidecar has no frame (or alias) with this name.
    #[error("'{spec_path}' defines no frame named '{frame}'")]
    UnknownFrame { spec_path: String, frame: String },
}

impl AssetError {
    /// Whether this error is raised synchronously and must never be cached
    /// as a failure tombstone.
    pub fn is_synchronous(&self) -> bool {
        matches!(
            self,
            AssetError::InvalidPath { .. } | AssetError::NotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_invalid_path() {
        let err = AssetError::InvalidPath {
            path: "a//b".to_string(),
            reason: "empty segment".to_string(),
        };
        assert_eq!(err.to_string(), "invalid asset path 'a//b': empty segment");
    }

    #[test]
    fn test_display_not_found() {
        let err = AssetError::NotFound {
            path: "gfx/missing.png".to_string(),
        };
        assert_eq!(err.to_string(), "no asset registered for 'gfx/missing.png'");
    }

    #[test]
    fn test_synchronous_classification() {
        assert!(AssetError::InvalidPath {
            path: String::new(),
            reason: String::new()
        }
        .is_synchronous());
        assert!(AssetError::NotFound {
            path: String::new()
        }
        .is_synchronous());
        assert!(!AssetError::Parse {
            path: String::new(),
            message: String::new()
        }
        .is_synchronous());
        assert!(!AssetError::NoFrames {
            path: String::new()
        }
        .is_synchronous());
    }

    #[test]
    fn test_errors_clone_equal() {
        let err = AssetError::Parse {
            path: "x.json".to_string(),
            message: "unexpected EOF".to_string(),
        };
        assert_eq!(err.clone(), err);
    }
}
