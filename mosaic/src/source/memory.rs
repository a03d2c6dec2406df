//! Runtime-writable in-memory source.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{Source, SourceError, SourceMetadata};

/// A writable overlay source for synthesized content.
///
/// Preprocessing layers can insert entries at runtime, before the namespace
/// is finalized; the source is then mounted like any other. Entries are
/// behind the source's own `RwLock`, so writes never touch the engine's
/// coarse lock, and the overlay stays out of the hot path after
/// finalization.
pub struct MemorySource {
    metadata: SourceMetadata,
    entries: RwLock<HashMap<String, Arc<Vec<u8>>>>,
}

impl MemorySource {
    /// Creates an empty source with the given name (also used as its id).
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            metadata: SourceMetadata::new(format!("memory:{name}"), name),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts or replaces an entry.
    pub fn insert(&self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries
            .write()
            .insert(name.into(), Arc::new(bytes.into()));
    }

    /// Removes an entry, returning whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.entries.write().remove(name).is_some()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the source holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn entry(&self, name: &str) -> Result<Arc<Vec<u8>>, SourceError> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(name.to_string()))
    }
}

impl Source for MemorySource {
    fn metadata(&self) -> SourceMetadata {
        self.metadata.clone()
    }

    fn asset_paths(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    fn open(&self, name: &str) -> Result<Box<dyn Read + Send>, SourceError> {
        let bytes = self.entry(name)?;
        Ok(Box::new(Cursor::new(bytes.as_ref().clone())))
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, SourceError> {
        Ok(self.entry(name)?.as_ref().clone())
    }

    fn size(&self, name: &str) -> Result<u64, SourceError> {
        Ok(self.entry(name)?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_read_remove() {
        let source = MemorySource::new("overlay");
        assert!(source.is_empty());

        source.insert("data/x.json", br#"{"a":1}"#.to_vec());
        assert_eq!(source.len(), 1);
        assert_eq!(source.read("data/x.json").unwrap(), br#"{"a":1}"#);
        assert_eq!(source.size("data/x.json").unwrap(), 7);

        assert!(source.remove("data/x.json"));
        assert!(!source.remove("data/x.json"));
        assert!(matches!(
            source.read("data/x.json"),
            Err(SourceError::NotFound(_))
        ));
    }

    #[test]
    fn test_insert_replaces_existing() {
        let source = MemorySource::new("overlay");
        source.insert("a.bin", vec![1]);
        source.insert("a.bin", vec![2, 3]);
        assert_eq!(source.read("a.bin").unwrap(), vec![2, 3]);
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn test_metadata_id_is_prefixed() {
        let source = MemorySource::new("overlay");
        assert_eq!(source.metadata().id, "memory:overlay");
        assert_eq!(source.metadata().name, "overlay");
    }

    #[test]
    fn test_enumeration_lists_all_entries() {
        let source = MemorySource::new("overlay");
        source.insert("a", vec![]);
        source.insert("b/c", vec![]);
        let mut paths = source.asset_paths();
        paths.sort();
        assert_eq!(paths, vec!["a", "b/c"]);
    }
}
