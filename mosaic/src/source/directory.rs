//! Directory-backed source.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::{Source, SourceError, SourceMetadata};

/// A source serving every regular file under a root directory.
///
/// Local names are the paths relative to the root, using `/` separators
/// regardless of platform. The directory is walked once per
/// [`asset_paths`](Source::asset_paths) call; the engine calls it exactly
/// once, at mount time.
pub struct DirectorySource {
    root: PathBuf,
    metadata: SourceMetadata,
}

impl DirectorySource {
    /// Creates a source over `root`. The source name defaults to the
    /// directory's file name.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        let metadata = SourceMetadata::new(root.display().to_string(), name);
        Self { root, metadata }
    }

    /// Overrides the source metadata.
    pub fn with_metadata(mut self, metadata: SourceMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in name.split('/') {
            path.push(segment);
        }
        path
    }

    fn collect(&self, dir: &Path, prefix: &str, out: &mut Vec<String>) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "skipping unreadable directory");
                return;
            }
        };

        for entry in entries.flatten() {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let local = if prefix.is_empty() {
                file_name
            } else {
                format!("{prefix}/{file_name}")
            };
            let path = entry.path();
            if path.is_dir() {
                self.collect(&path, &local, out);
            } else {
                out.push(local);
            }
        }
    }
}

impl Source for DirectorySource {
    fn metadata(&self) -> SourceMetadata {
        self.metadata.clone()
    }

    fn asset_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect(&self.root, "", &mut paths);
        paths
    }

    fn open(&self, name: &str) -> Result<Box<dyn Read + Send>, SourceError> {
        let path = self.resolve(name);
        match fs::File::open(&path) {
            Ok(file) => Ok(Box::new(file)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(SourceError::NotFound(name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, SourceError> {
        let path = self.resolve(name);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(SourceError::NotFound(name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn size(&self, name: &str) -> Result<u64, SourceError> {
        let path = self.resolve(name);
        match fs::metadata(&path) {
            Ok(metadata) => Ok(metadata.len()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(SourceError::NotFound(name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, DirectorySource) {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("gfx/ships")).unwrap();
        fs::write(temp.path().join("readme.txt"), b"hello").unwrap();
        fs::write(temp.path().join("gfx/ships/scout.png"), b"not a real png").unwrap();
        let source = DirectorySource::new(temp.path());
        (temp, source)
    }

    #[test]
    fn test_enumerates_recursively_with_forward_slashes() {
        let (_temp, source) = fixture();
        let mut paths = source.asset_paths();
        paths.sort();
        assert_eq!(paths, vec!["gfx/ships/scout.png", "readme.txt"]);
    }

    #[test]
    fn test_read_and_size() {
        let (_temp, source) = fixture();
        assert_eq!(source.read("readme.txt").unwrap(), b"hello");
        assert_eq!(source.size("readme.txt").unwrap(), 5);
    }

    #[test]
    fn test_open_streams_bytes() {
        let (_temp, source) = fixture();
        let mut reader = source.open("gfx/ships/scout.png").unwrap();
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, b"not a real png");
    }

    #[test]
    fn test_missing_entry_is_not_found() {
        let (_temp, source) = fixture();
        assert!(matches!(
            source.read("nope.txt"),
            Err(SourceError::NotFound(_))
        ));
        assert!(matches!(
            source.size("nope.txt"),
            Err(SourceError::NotFound(_))
        ));
    }

    #[test]
    fn test_metadata_defaults_to_directory_name() {
        let (temp, source) = fixture();
        let expected = temp
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert_eq!(source.metadata().name, expected);
    }
}
