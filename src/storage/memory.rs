//! In-memory adapter.
//!
//! Holds the whole tree in a map. Used by the test suite and handy for
//! embedding the engine where nothing should touch disk. It counts writes and
//! deletes and can be told to fail specific paths, which is how tests check
//! the "zero side effects" and "per-item isolation" properties.

use super::{Storage, StorageEntry, StorageError, is_under, normalize_path};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
    fail_listing: Mutex<bool>,
    writes: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file without counting it as a write.
    pub fn insert(&self, path: &str, data: impl Into<Vec<u8>>) {
        if let Ok(path) = normalize_path(path) {
            self.files
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(path, data.into());
        }
    }

    /// Remove a file without counting it as a delete.
    pub fn remove(&self, path: &str) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
    }

    /// Make every read, write and delete of `path` fail.
    pub fn fail_on(&self, path: &str) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string());
    }

    /// Make every `list` call fail.
    pub fn fail_listing(&self) {
        *self
            .fail_listing
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = true;
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn check(&self, path: &str) -> Result<String, StorageError> {
        let path = normalize_path(path)?;
        if self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&path)
        {
            return Err(StorageError::Backend(format!("injected failure for {}", path)));
        }
        Ok(path)
    }
}

impl Storage for MemoryStorage {
    fn list(&self, prefix: &str) -> Result<Vec<StorageEntry>, StorageError> {
        if *self
            .fail_listing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
        {
            return Err(StorageError::Backend("injected listing failure".into()));
        }
        let prefix = normalize_path(prefix)?;
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        Ok(files
            .iter()
            .filter(|(path, _)| is_under(path, &prefix))
            .map(|(path, data)| StorageEntry {
                path: path.clone(),
                size: data.len() as u64,
                fingerprint: format!("{:x}", Sha256::digest(data)),
            })
            .collect())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.check(path)?;
        self.get(&path).ok_or(StorageError::NotFound(path))
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.check(path)?;
        if path.is_empty() {
            return Err(StorageError::InvalidPath(path));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path, data.to_vec());
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        let path = self.check(path)?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&path);
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let path = normalize_path(path)?;
        if path.is_empty() {
            return Ok(true);
        }
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        Ok(files.keys().any(|p| is_under(p, &path)))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_filters_by_prefix_segment() {
        let storage = MemoryStorage::new();
        storage.insert("anime/a.jpg", "1");
        storage.insert("anime2/a.jpg", "2");
        storage.insert("b.jpg", "3");

        let paths: Vec<String> = storage
            .list("anime")
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(paths, vec!["anime/a.jpg"]);
    }

    #[test]
    fn fingerprint_is_content_hash() {
        let storage = MemoryStorage::new();
        storage.insert("a.jpg", "same");
        storage.insert("b.jpg", "same");
        storage.insert("c.jpg", "different");

        let entries = storage.list("").unwrap();
        assert_eq!(entries[0].fingerprint, entries[1].fingerprint);
        assert_ne!(entries[0].fingerprint, entries[2].fingerprint);
        assert_eq!(entries[0].fingerprint.len(), 64);
    }

    #[test]
    fn counts_writes_and_deletes_but_not_seeding() {
        let storage = MemoryStorage::new();
        storage.insert("seed.jpg", "x");
        storage.write("a.jpg", b"y").unwrap();
        storage.delete("seed.jpg").unwrap();

        assert_eq!(storage.writes(), 1);
        assert_eq!(storage.deletes(), 1);
        assert_eq!(storage.paths(), vec!["a.jpg"]);
    }

    #[test]
    fn injected_failures() {
        let storage = MemoryStorage::new();
        storage.fail_on("bad.jpg");
        assert!(storage.write("bad.jpg", b"x").is_err());
        assert!(storage.write("good.jpg", b"x").is_ok());

        storage.fail_listing();
        assert!(storage.list("").is_err());
    }

    #[test]
    fn exists_covers_folders() {
        let storage = MemoryStorage::new();
        storage.insert("anime/a.jpg", "x");
        assert!(storage.exists("anime").unwrap());
        assert!(storage.exists("anime/a.jpg").unwrap());
        assert!(!storage.exists("sketch").unwrap());
        assert!(storage.exists("").unwrap());
    }
}
