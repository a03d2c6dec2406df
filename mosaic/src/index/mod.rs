//! Source overlay index: N ordered sources merged into one namespace.
//!
//! This module provides the [`OverlayIndex`], a merged view of every mounted
//! source, similar to an overlay filesystem. Unlike a plain union mount it
//! also tracks per-path **patch chains**: a mounted file named
//! `<target>.patch` attaches to `<target>`'s descriptor instead of (only)
//! becoming a file of its own.
//!
//! Merge rules:
//!
//! - Paths are case-insensitive ([`AssetPath`] normalization).
//! - A later-mounted source shadows an earlier one for the same path
//!   (last wins). The patch chain survives the overwrite and keeps
//!   appending.
//! - `<target>.patch` appends to the target's chain only if the target
//!   descriptor already exists at attach time; otherwise it is dropped
//!   silently. The patch file itself is always registered as an openable
//!   path as well (preprocessing add-ons read patch files directly).
//!
//! Mounting is strictly sequential in caller order. After the last mount
//! the index is frozen behind an `Arc` and read lock-free.

pub mod digest;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::AssetError;
use crate::path::AssetPath;
use crate::source::{Source, SourceMetadata};

/// Suffix marking a file as a patch for the path it is appended to.
pub const PATCH_SUFFIX: &str = ".patch";

/// One entry of a patch chain.
#[derive(Clone)]
pub struct PatchRef {
    /// Normalized namespace path of the patch file.
    pub path: AssetPath,

    /// Source-local spelling, for opening.
    pub local_name: String,

    /// The source the patch bytes come from.
    pub source: Arc<dyn Source>,
}

impl std::fmt::Debug for PatchRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchRef")
            .field("path", &self.path)
            .field("source", &self.source.metadata().name)
            .finish()
    }
}

/// The live descriptor of one namespace path.
#[derive(Clone)]
pub struct FileDescriptor {
    /// Owning source (the last one mounted that provides this path).
    pub source: Arc<dyn Source>,

    /// Source-local spelling, for opening.
    pub local_name: String,

    /// Attached patches in namespace discovery order.
    pub patches: Vec<PatchRef>,
}

impl FileDescriptor {
    /// Reads the base file's bytes from its owning source.
    pub fn read(&self) -> Result<Vec<u8>, crate::source::SourceError> {
        self.source.read(&self.local_name)
    }
}

impl std::fmt::Debug for FileDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDescriptor")
            .field("source", &self.source.metadata().name)
            .field("local_name", &self.local_name)
            .field("patches", &self.patches.len())
            .finish()
    }
}

/// Merged, ordered view of all mounted sources.
///
/// Keys are normalized paths in a `BTreeMap`, so iteration is always in the
/// sorted order the digest engine requires.
pub struct OverlayIndex {
    files: BTreeMap<AssetPath, FileDescriptor>,
    sources: Vec<Arc<dyn Source>>,
}

impl OverlayIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            files: BTreeMap::new(),
            sources: Vec::new(),
        }
    }

    /// Mounts one source on top of everything mounted so far.
    ///
    /// Best-effort: local names that fail path normalization are skipped
    /// with a warning. Names are processed in sorted order so a base file
    /// always registers before its own `.patch` sibling from the same
    /// source.
    pub fn mount(&mut self, source: Arc<dyn Source>) {
        let metadata = source.metadata();
        let mut names = source.asset_paths();
        names.sort();

        let mut registered = 0usize;
        let mut attached = 0usize;

        for local_name in names {
            let path = match AssetPath::new(&local_name) {
                Ok(path) => path,
                Err(err) => {
                    warn!(source = %metadata.name, name = %local_name, error = %err,
                        "skipping unmappable source entry");
                    continue;
                }
            };

            if let Some(target) = path.strip_suffix(PATCH_SUFFIX) {
                match self.files.get_mut(&target) {
                    Some(descriptor) => {
                        descriptor.patches.push(PatchRef {
                            path: path.clone(),
                            local_name: local_name.clone(),
                            source: Arc::clone(&source),
                        });
                        attached += 1;
                    }
                    None => {
                        debug!(patch = %path, wanted = %target,
                            "dropping patch with no target descriptor");
                    }
                }
            }

            // The patch file itself stays directly openable, so register it
            // like any other path.
            match self.files.get_mut(&path) {
                Some(descriptor) => {
                    // Shadowing: replace the owner, keep the accumulated
                    // patch chain attached to the live descriptor.
                    descriptor.source = Arc::clone(&source);
                    descriptor.local_name = local_name;
                }
                None => {
                    self.files.insert(
                        path,
                        FileDescriptor {
                            source: Arc::clone(&source),
                            local_name,
                            patches: Vec::new(),
                        },
                    );
                }
            }
            registered += 1;
        }

        debug!(source = %metadata.name, registered, attached, "mounted source");
        self.sources.push(source);
    }

    /// Looks up the live descriptor for a path.
    pub fn descriptor(&self, path: &AssetPath) -> Option<&FileDescriptor> {
        self.files.get(path)
    }

    /// Whether a path exists in the namespace.
    pub fn contains(&self, path: &AssetPath) -> bool {
        self.files.contains_key(path)
    }

    /// Every namespace path, in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &AssetPath> {
        self.files.keys()
    }

    /// Sorted iteration over (path, descriptor) pairs.
    pub fn entries(&self) -> impl Iterator<Item = (&AssetPath, &FileDescriptor)> {
        self.files.iter()
    }

    /// Namespace paths with the given extension (without the dot,
    /// case-insensitive).
    pub fn paths_with_extension(&self, extension: &str) -> Vec<AssetPath> {
        let wanted = extension.to_lowercase();
        self.files
            .keys()
            .filter(|path| path.extension() == Some(wanted.as_str()))
            .cloned()
            .collect()
    }

    /// Namespace paths starting with the given prefix (case-insensitive).
    pub fn paths_with_prefix(&self, prefix: &str) -> Vec<AssetPath> {
        let wanted = prefix.replace('\\', "/").to_lowercase();
        self.files
            .keys()
            .filter(|path| path.as_str().starts_with(&wanted))
            .cloned()
            .collect()
    }

    /// Provenance of a path: the owning source's metadata first, then the
    /// metadata of every patch source in chain order.
    pub fn sources_for(&self, path: &AssetPath) -> Option<Vec<SourceMetadata>> {
        let descriptor = self.files.get(path)?;
        let mut sources = Vec::with_capacity(1 + descriptor.patches.len());
        sources.push(descriptor.source.metadata());
        for patch in &descriptor.patches {
            sources.push(patch.source.metadata());
        }
        Some(sources)
    }

    /// Reads the raw base bytes of a path, without applying patches.
    pub fn read(&self, path: &AssetPath) -> Result<Vec<u8>, AssetError> {
        let descriptor = self.files.get(path).ok_or_else(|| AssetError::NotFound {
            path: path.to_string(),
        })?;
        descriptor.read().map_err(|err| AssetError::Source {
            path: path.to_string(),
            message: err.to_string(),
        })
    }

    /// Metadata of every mounted source, in mount order.
    pub fn mounted_sources(&self) -> Vec<SourceMetadata> {
        self.sources.iter().map(|s| s.metadata()).collect()
    }

    /// Number of namespace paths.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether nothing is mounted.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Default for OverlayIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn path(raw: &str) -> AssetPath {
        AssetPath::new(raw).unwrap()
    }

    fn source(name: &str, entries: &[(&str, &[u8])]) -> Arc<MemorySource> {
        let source = MemorySource::new(name);
        for (entry, bytes) in entries {
            source.insert(*entry, bytes.to_vec());
        }
        Arc::new(source)
    }

    #[test]
    fn test_empty_index() {
        let index = OverlayIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
        assert!(!index.contains(&path("a.txt")));
    }

    #[test]
    fn test_mount_registers_normalized_paths() {
        let mut index = OverlayIndex::new();
        index.mount(source("base", &[("Gfx\\Scout.PNG", b"png")]));

        assert!(index.contains(&path("gfx/scout.png")));
        let descriptor = index.descriptor(&path("gfx/scout.png")).unwrap();
        assert_eq!(descriptor.local_name, "Gfx\\Scout.PNG");
        assert_eq!(descriptor.read().unwrap(), b"png");
    }

    #[test]
    fn test_later_source_shadows_earlier() {
        let mut index = OverlayIndex::new();
        index.mount(source("base", &[("data/x.json", b"base")]));
        index.mount(source("mod", &[("Data/X.JSON", b"mod")]));

        assert_eq!(index.len(), 1);
        let descriptor = index.descriptor(&path("data/x.json")).unwrap();
        assert_eq!(descriptor.source.metadata().name, "mod");
        assert_eq!(descriptor.read().unwrap(), b"mod");
    }

    #[test]
    fn test_patch_attaches_to_existing_descriptor() {
        let mut index = OverlayIndex::new();
        index.mount(source("base", &[("data/x.json", b"{}")]));
        index.mount(source("mod", &[("data/x.json.patch", b"[]")]));

        let descriptor = index.descriptor(&path("data/x.json")).unwrap();
        assert_eq!(descriptor.patches.len(), 1);
        assert_eq!(descriptor.patches[0].path, path("data/x.json.patch"));

        // The patch file is also a first-class, openable path.
        assert!(index.contains(&path("data/x.json.patch")));
    }

    #[test]
    fn test_patch_without_target_is_dropped() {
        let mut index = OverlayIndex::new();
        index.mount(source("mod", &[("data/x.json.patch", b"[]")]));

        // Registered as a plain file, attached to nothing.
        assert!(index.contains(&path("data/x.json.patch")));
        assert!(index.descriptor(&path("data/x.json")).is_none());

        // The target arriving later does not retroactively attach it.
        index.mount(source("base", &[("data/x.json", b"{}")]));
        let descriptor = index.descriptor(&path("data/x.json")).unwrap();
        assert!(descriptor.patches.is_empty());
    }

    #[test]
    fn test_base_and_patch_in_same_source_attach() {
        // Sorted processing puts "data/x.json" before "data/x.json.patch".
        let mut index = OverlayIndex::new();
        index.mount(source(
            "base",
            &[("data/x.json.patch", b"[]"), ("data/x.json", b"{}")],
        ));

        let descriptor = index.descriptor(&path("data/x.json")).unwrap();
        assert_eq!(descriptor.patches.len(), 1);
    }

    #[test]
    fn test_patch_chains_append_in_mount_order() {
        let mut index = OverlayIndex::new();
        index.mount(source("base", &[("x.json", b"{}")]));
        index.mount(source("mod_a", &[("x.json.patch", b"a")]));
        index.mount(source("mod_b", &[("x.json.patch", b"b")]));

        let descriptor = index.descriptor(&path("x.json")).unwrap();
        assert_eq!(descriptor.patches.len(), 2);
        assert_eq!(descriptor.patches[0].source.metadata().name, "mod_a");
        assert_eq!(descriptor.patches[1].source.metadata().name, "mod_b");
    }

    #[test]
    fn test_shadowing_keeps_patch_chain() {
        let mut index = OverlayIndex::new();
        index.mount(source("base", &[("x.json", b"base")]));
        index.mount(source("mod_a", &[("x.json.patch", b"a")]));
        index.mount(source("mod_b", &[("x.json", b"replacement")]));

        let descriptor = index.descriptor(&path("x.json")).unwrap();
        assert_eq!(descriptor.source.metadata().name, "mod_b");
        assert_eq!(descriptor.patches.len(), 1, "chain survives shadowing");
    }

    #[test]
    fn test_enumeration_by_extension_and_prefix() {
        let mut index = OverlayIndex::new();
        index.mount(source(
            "base",
            &[
                ("gfx/a.png", b""),
                ("gfx/b.png", b""),
                ("sfx/c.ogg", b""),
                ("readme.txt", b""),
            ],
        ));

        let mut pngs = index.paths_with_extension("PNG");
        pngs.sort();
        assert_eq!(pngs, vec![path("gfx/a.png"), path("gfx/b.png")]);

        let gfx = index.paths_with_prefix("GFX/");
        assert_eq!(gfx.len(), 2);
    }

    #[test]
    fn test_sources_for_reports_provenance() {
        let mut index = OverlayIndex::new();
        index.mount(source("base", &[("x.json", b"{}")]));
        index.mount(source("mod", &[("x.json.patch", b"[]")]));

        let provenance = index.sources_for(&path("x.json")).unwrap();
        let names: Vec<_> = provenance.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["base", "mod"]);

        assert!(index.sources_for(&path("missing")).is_none());
    }

    #[test]
    fn test_paths_iterate_sorted() {
        let mut index = OverlayIndex::new();
        index.mount(source("base", &[("b.txt", b""), ("a.txt", b""), ("c/d.txt", b"")]));
        let paths: Vec<_> = index.paths().map(|p| p.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt", "c/d.txt"]);
    }

    #[test]
    fn test_read_applies_no_patches() {
        let mut index = OverlayIndex::new();
        index.mount(source("base", &[("x.json", b"{\"a\":1}")]));
        index.mount(source("mod", &[("x.json.patch", b"[]")]));
        assert_eq!(index.read(&path("x.json")).unwrap(), b"{\"a\":1}");
        assert!(matches!(
            index.read(&path("missing")),
            Err(AssetError::NotFound { .. })
        ));
    }
}
