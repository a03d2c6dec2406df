//! Normalized logical asset paths.
//!
//! The merged namespace is case-insensitive and separator-agnostic: sources
//! may report `Gfx\Ships\Scout.PNG` and the namespace key is
//! `gfx/ships/scout.png`. [`AssetPath`] is the validated, normalized form
//! used as the key everywhere inside the engine; the original, source-local
//! spelling is kept on the file descriptor for opening.
//!
//! Normalization rules:
//!
//! - `\` becomes `/`, a single leading `/` is stripped
//! - the whole path is lowercased
//! - empty paths, empty segments (`a//b`), `.`/`..` segments, trailing
//!   separators and control characters are rejected

use std::fmt;

use crate::error::AssetError;

/// A validated, normalized, case-folded logical path.
///
/// Ordering and hashing are over the normalized form, so `BTreeMap` keys
/// iterate in the sorted order the digest engine requires.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetPath(String);

impl AssetPath {
    /// Parses and normalizes a raw path.
    pub fn new(raw: &str) -> Result<Self, AssetError> {
        let invalid = |reason: &str| AssetError::InvalidPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut normalized = raw.replace('\\', "/");
        if let Some(stripped) = normalized.strip_prefix('/') {
            normalized = stripped.to_string();
        }

        if normalized.is_empty() {
            return Err(invalid("path is empty"));
        }
        if normalized.ends_with('/') {
            return Err(invalid("path ends with a separator"));
        }
        if normalized.chars().any(|c| c.is_control()) {
            return Err(invalid("path contains control characters"));
        }
        for segment in normalized.split('/') {
            match segment {
                "" => return Err(invalid("empty path segment")),
                "." | ".." => return Err(invalid("relative path segment")),
                _ => {}
            }
        }

        Ok(AssetPath(normalized.to_lowercase()))
    }

    /// The normalized path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The final path segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The directory part, without a trailing separator. Empty for paths at
    /// the namespace root.
    pub fn parent(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[..idx],
            None => "",
        }
    }

    /// The extension of the final segment, without the dot.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&name[idx + 1..]),
        }
    }

    /// The final segment without its extension.
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => name,
            Some(idx) => &name[..idx],
        }
    }

    /// Strips a literal suffix from the normalized path, returning the
    /// remaining prefix as a new path if anything is left.
    pub fn strip_suffix(&self, suffix: &str) -> Option<AssetPath> {
        let rest = self.0.strip_suffix(suffix)?;
        if rest.is_empty() || rest.ends_with('/') {
            return None;
        }
        Some(AssetPath(rest.to_string()))
    }

    /// Joins a directory prefix (possibly empty) and a file name into a
    /// normalized path. Used by the frames resolver to derive sidecar
    /// candidates; both components are already normalized.
    pub(crate) fn from_parts(dir: &str, name: &str) -> AssetPath {
        if dir.is_empty() {
            AssetPath(name.to_string())
        } else {
            AssetPath(format!("{dir}/{name}"))
        }
    }
}

impl fmt::Display for AssetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_case_and_separators() {
        let path = AssetPath::new("Gfx\\Ships\\Scout.PNG").unwrap();
        assert_eq!(path.as_str(), "gfx/ships/scout.png");
    }

    #[test]
    fn test_strips_single_leading_slash() {
        let path = AssetPath::new("/x.json").unwrap();
        assert_eq!(path.as_str(), "x.json");
    }

    #[test]
    fn test_equality_is_case_insensitive() {
        let a = AssetPath::new("Data/Config.JSON").unwrap();
        let b = AssetPath::new("data/config.json").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_empty() {
        assert!(AssetPath::new("").is_err());
        assert!(AssetPath::new("/").is_err());
    }

    #[test]
    fn test_rejects_empty_segment() {
        assert!(AssetPath::new("a//b").is_err());
    }

    #[test]
    fn test_rejects_relative_segments() {
        assert!(AssetPath::new("a/../b").is_err());
        assert!(AssetPath::new("./a").is_err());
    }

    #[test]
    fn test_rejects_trailing_separator() {
        assert!(AssetPath::new("a/b/").is_err());
    }

    #[test]
    fn test_rejects_control_characters() {
        assert!(AssetPath::new("a\0b").is_err());
        assert!(AssetPath::new("a\nb").is_err());
    }

    #[test]
    fn test_components() {
        let path = AssetPath::new("gfx/ships/scout.png").unwrap();
        assert_eq!(path.file_name(), "scout.png");
        assert_eq!(path.parent(), "gfx/ships");
        assert_eq!(path.extension(), Some("png"));
        assert_eq!(path.stem(), "scout");
    }

    #[test]
    fn test_components_at_root() {
        let path = AssetPath::new("readme").unwrap();
        assert_eq!(path.file_name(), "readme");
        assert_eq!(path.parent(), "");
        assert_eq!(path.extension(), None);
        assert_eq!(path.stem(), "readme");
    }

    #[test]
    fn test_hidden_file_has_no_extension() {
        let path = AssetPath::new("gfx/.hidden").unwrap();
        assert_eq!(path.extension(), None);
        assert_eq!(path.stem(), ".hidden");
    }

    #[test]
    fn test_strip_suffix() {
        let path = AssetPath::new("data/x.json.patch").unwrap();
        let target = path.strip_suffix(".patch").unwrap();
        assert_eq!(target.as_str(), "data/x.json");

        // A bare ".patch" has no target left to attach to.
        let bare = AssetPath::new(".patch").unwrap();
        assert!(bare.strip_suffix(".patch").is_none());
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let a = AssetPath::new("a/b").unwrap();
        let b = AssetPath::new("a/c").unwrap();
        assert!(a < b);
    }
}
