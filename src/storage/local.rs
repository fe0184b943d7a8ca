//! Local filesystem adapter.

use super::{Storage, StorageEntry, StorageError, normalize_path};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

/// Suffix for in-flight writes. A crash can leave one behind; the scanner
/// sees it as an orphan and the next run deletes it.
const TEMP_SUFFIX: &str = ".stylesync-tmp";

/// Storage rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let rel = normalize_path(path)?;
        if rel.is_empty() {
            Ok(self.root.clone())
        } else {
            Ok(self.root.join(rel))
        }
    }

    /// Root-relative `/`-separated form of an absolute path under the root.
    fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// Remove now-empty directories from `dir` upwards, stopping at the root.
    fn prune_empty_parents(&self, dir: Option<&Path>) {
        let mut current = dir;
        while let Some(d) = current {
            if d == self.root || !d.starts_with(&self.root) {
                break;
            }
            // Fails on non-empty directories, which is where we stop.
            if fs::remove_dir(d).is_err() {
                break;
            }
            current = d.parent();
        }
    }
}

/// Size plus modification time in nanoseconds.
fn fingerprint(metadata: &fs::Metadata) -> String {
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{}-{}", metadata.len(), mtime)
}

impl Storage for LocalStorage {
    fn list(&self, prefix: &str) -> Result<Vec<StorageEntry>, StorageError> {
        let dir = self.resolve(prefix)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&dir).follow_links(false) {
            let entry = entry.map_err(|e| StorageError::io(prefix, e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let metadata = entry
                .metadata()
                .map_err(|e| StorageError::io(prefix, e.into()))?;
            let Some(path) = self.relative(entry.path()) else {
                continue;
            };
            entries.push(StorageEntry {
                path,
                size: metadata.len(),
                fingerprint: fingerprint(&metadata),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let target = self.resolve(path)?;
        fs::read(&target).map_err(|e| StorageError::io(path, e))
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        let (Some(parent), Some(name)) = (target.parent(), target.file_name()) else {
            return Err(StorageError::InvalidPath(path.to_string()));
        };
        fs::create_dir_all(parent).map_err(|e| StorageError::io(path, e))?;

        // Write next to the target and rename, so a scan never sees a
        // truncated artifact.
        let temp = parent.join(format!(".{}{}", name.to_string_lossy(), TEMP_SUFFIX));
        if let Err(e) = fs::write(&temp, data) {
            let _ = fs::remove_file(&temp);
            return Err(StorageError::io(path, e));
        }
        fs::rename(&temp, &target).map_err(|e| {
            let _ = fs::remove_file(&temp);
            StorageError::io(path, e)
        })
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        if target == self.root {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StorageError::io(path, e)),
        }
        self.prune_empty_parents(target.parent());
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.resolve(path)?.exists())
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_then_read_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.write("anime/a.jpg", b"styled").unwrap();

        assert_eq!(storage.read("anime/a.jpg").unwrap(), b"styled");
        assert!(tmp.path().join("anime/a.jpg").exists());
    }

    #[test]
    fn write_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.write("anime/a.jpg", b"one").unwrap();
        storage.write("anime/a.jpg", b"two").unwrap();

        let paths: Vec<String> = storage
            .list("")
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(paths, vec!["anime/a.jpg"]);
        assert_eq!(storage.read("anime/a.jpg").unwrap(), b"two");
    }

    #[test]
    fn list_is_recursive_sorted_and_root_relative() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        storage.write("b.jpg", b"b").unwrap();
        storage.write("sub/c.jpg", b"c").unwrap();
        storage.write("a.jpg", b"a").unwrap();

        let all: Vec<String> = storage.list("").unwrap().into_iter().map(|e| e.path).collect();
        assert_eq!(all, vec!["a.jpg", "b.jpg", "sub/c.jpg"]);

        let sub: Vec<String> = storage
            .list("sub")
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(sub, vec!["sub/c.jpg"]);
    }

    #[test]
    fn list_missing_prefix_is_empty() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path().join("nope"));
        assert!(storage.list("").unwrap().is_empty());
        assert!(!storage.exists("").unwrap());
    }

    #[test]
    fn fingerprint_changes_with_content_size() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.write("a.jpg", b"short").unwrap();
        let first = storage.list("").unwrap()[0].fingerprint.clone();
        storage.write("a.jpg", b"much longer content").unwrap();
        let second = storage.list("").unwrap()[0].fingerprint.clone();

        assert_ne!(first, second);
        assert!(second.starts_with("19-"));
    }

    #[test]
    fn delete_prunes_empty_directories() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        storage.write("sketch/deep/a.jpg", b"x").unwrap();
        storage.write("anime/a.jpg", b"x").unwrap();

        storage.delete("sketch/deep/a.jpg").unwrap();

        assert!(!tmp.path().join("sketch").exists());
        assert!(tmp.path().join("anime").exists());
        assert!(tmp.path().exists());
    }

    #[test]
    fn delete_missing_is_ok() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        storage.delete("never/was.jpg").unwrap();
    }

    #[test]
    fn read_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        assert!(matches!(
            storage.read("missing.jpg"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn paths_cannot_escape_root() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path().join("root"));
        assert!(matches!(
            storage.write("../escape.jpg", b"x"),
            Err(StorageError::InvalidPath(_))
        ));
    }
}
