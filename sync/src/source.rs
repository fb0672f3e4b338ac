//! Source tree enumeration and fingerprinting.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;
use walkdir::WalkDir;

/// Extensions indexed when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tiff", "bmp", "gif", "webp"];

/// One enumerated source item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    /// Canonical key for the item.
    pub key: String,

    /// Fingerprint observed at enumeration time.
    pub fingerprint: u64,
}

/// Render a path as a canonical source key: absolute, `/`-separated.
pub fn canonical_key(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut key = absolute.to_string_lossy().to_string();
    if key.contains('\\') {
        key = key.replace('\\', "/");
    }
    key
}

/// Cheap content-state signature: byte size folded with mtime seconds.
///
/// Size alone misses same-size rewrites, so the modification time is mixed
/// in; either changing flags the item for re-embedding.
pub fn fingerprint(metadata: &Metadata) -> u64 {
    let size = metadata.len();
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs());
    size.rotate_left(20) ^ mtime
}

/// The set of watched roots, enumerable as keyed, fingerprinted items.
#[derive(Debug, Clone)]
pub struct SourceTree {
    roots: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl SourceTree {
    /// Create a tree over the given roots with the default extension set.
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
            extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
        }
    }

    /// Replace the accepted extension set (matched case-insensitively).
    pub fn with_extensions(mut self, extensions: impl IntoIterator<Item = String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.to_lowercase())
            .collect();
        self
    }

    /// The watched roots.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }

    /// Enumerate every accepted file under every root.
    ///
    /// Unreadable entries are skipped; symlinks are not followed.
    pub fn enumerate(&self) -> Vec<SourceItem> {
        let mut items = Vec::new();
        for root in &self.roots {
            let before = items.len();
            for entry in WalkDir::new(root).follow_links(false).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() || !self.accepts(entry.path()) {
                    continue;
                }
                let Ok(metadata) = entry.metadata() else {
                    continue;
                };
                items.push(SourceItem {
                    key: canonical_key(entry.path()),
                    fingerprint: fingerprint(&metadata),
                });
            }
            debug!(
                "Enumerated {} items under {}",
                items.len() - before,
                root.display()
            );
        }
        items
    }

    /// Re-fingerprint a single key, `None` when the file has vanished.
    pub async fn fingerprint_of(&self, key: &str) -> Option<u64> {
        let metadata = tokio::fs::metadata(Path::new(key)).await.ok()?;
        metadata.is_file().then(|| fingerprint(&metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_enumerate_filters_by_extension() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.jpg", b"a");
        write(temp_dir.path(), "b.PNG", b"bb");
        write(temp_dir.path(), "notes.txt", b"nope");

        let tree = SourceTree::new([temp_dir.path().to_path_buf()]);
        let mut keys: Vec<_> = tree.enumerate().into_iter().map(|i| i.key).collect();
        keys.sort();

        assert_eq!(keys.len(), 2);
        assert!(keys[0].ends_with("a.jpg"));
        assert!(keys[1].ends_with("b.PNG"));
    }

    #[test]
    fn test_enumerate_recurses_into_subdirectories() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("nested")).unwrap();
        write(&temp_dir.path().join("nested"), "deep.webp", b"deep");

        let tree = SourceTree::new([temp_dir.path().to_path_buf()]);
        let items = tree.enumerate();
        assert_eq!(items.len(), 1);
        assert!(items[0].key.ends_with("nested/deep.webp"));
    }

    #[test]
    fn test_fingerprint_changes_with_content_size() {
        let temp_dir = TempDir::new().unwrap();
        let path = write(temp_dir.path(), "a.jpg", b"short");
        let first = fingerprint(&std::fs::metadata(&path).unwrap());

        std::fs::write(&path, b"a much longer body").unwrap();
        let second = fingerprint(&std::fs::metadata(&path).unwrap());
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_fingerprint_of_vanished_file_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let path = write(temp_dir.path(), "a.jpg", b"a");
        let tree = SourceTree::new([temp_dir.path().to_path_buf()]);
        let key = canonical_key(&path);

        assert!(tree.fingerprint_of(&key).await.is_some());
        std::fs::remove_file(&path).unwrap();
        assert_eq!(tree.fingerprint_of(&key).await, None);
    }

    #[test]
    fn test_canonical_key_uses_forward_slashes() {
        let key = canonical_key(Path::new("some/relative/img.png"));
        assert!(!key.contains('\\'));
        assert!(Path::new(&key).is_absolute());
    }
}
