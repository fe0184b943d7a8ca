//! Sync manifest: what each artifact was generated from.
//!
//! Deciding whether an existing artifact is still valid needs more than its
//! presence: it must have been generated from the source content that is
//! there now, with the style parameters configured now. The manifest records
//! exactly that, per output path.
//!
//! # Entries
//!
//! - **`source_fingerprint`**: the source's fingerprint from the storage
//!   listing at generation time. Opaque; only compared for equality.
//! - **`params_hash`**: SHA-256 of the generation parameters. For a styled
//!   artifact this is (style name, prompt, strength). The original mirror
//!   uses a fixed marker. Editing a style's prompt or strength changes the
//!   hash, so that style's artifacts go stale.
//!
//! An artifact is valid only if it has an entry and both fields match. No
//! entry means "unknown provenance", which is treated as stale.
//!
//! # Storage
//!
//! The manifest is a JSON file at [`MANIFEST_PATH`] in the output root, read
//! and written through the same [`Storage`] as the artifacts so it travels
//! with them on every backend. The scanner never classifies it as an orphan.
//!
//! A manifest that is absent, unparseable or of another format version loads
//! as empty: every existing artifact becomes stale and is regenerated once.
//! A manifest that exists but cannot be *read* is an error, since silently
//! regenerating everything could be expensive.

use crate::storage::{Storage, StorageError};
use crate::styles::Style;
use log::warn;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Output-root-relative path of the manifest file.
pub const MANIFEST_PATH: &str = ".stylesync-manifest.json";

/// Version of the manifest format. Bump this to invalidate all existing
/// manifests when the format or hash computation changes.
const MANIFEST_VERSION: u32 = 1;

/// Provenance of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub source_fingerprint: String,
    pub params_hash: String,
}

/// Manifest mapping output paths to their provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncManifest {
    pub version: u32,
    pub entries: BTreeMap<String, ManifestEntry>,
}

impl SyncManifest {
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: BTreeMap::new(),
        }
    }

    /// Load from the output root.
    pub fn load(output: &dyn Storage) -> Result<Self, StorageError> {
        let bytes = match output.read(MANIFEST_PATH) {
            Ok(b) => b,
            Err(StorageError::NotFound(_)) => return Ok(Self::empty()),
            Err(e) => return Err(e),
        };
        let manifest: Self = match serde_json::from_slice(&bytes) {
            Ok(m) => m,
            Err(e) => {
                warn!("Ignoring unreadable sync manifest ({}); all artifacts will be regenerated", e);
                return Ok(Self::empty());
            }
        };
        if manifest.version != MANIFEST_VERSION {
            warn!(
                "Ignoring sync manifest version {} (expected {}); all artifacts will be regenerated",
                manifest.version, MANIFEST_VERSION
            );
            return Ok(Self::empty());
        }
        Ok(manifest)
    }

    /// Save to the output root.
    pub fn save(&self, output: &dyn Storage) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| StorageError::Backend(format!("failed to encode manifest: {}", e)))?;
        output.write(MANIFEST_PATH, &json)
    }

    /// Whether `output_path` was generated from exactly these inputs.
    pub fn is_current(&self, output_path: &str, source_fingerprint: &str, params_hash: &str) -> bool {
        self.entries.get(output_path).is_some_and(|e| {
            e.source_fingerprint == source_fingerprint && e.params_hash == params_hash
        })
    }

    pub fn record(&mut self, output_path: String, source_fingerprint: String, params_hash: String) {
        self.entries.insert(
            output_path,
            ManifestEntry {
                source_fingerprint,
                params_hash,
            },
        );
    }

    pub fn remove(&mut self, output_path: &str) {
        self.entries.remove(output_path);
    }

    /// Drop every entry whose path does not satisfy `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|path, _| keep(path));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// SHA-256 hash of a style's generation parameters.
///
/// The index is deliberately absent: renumbering a style moves its outputs
/// under `index-suffix` naming but does not change what they look like.
pub fn hash_style_params(style: &Style) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"styled\0");
    hasher.update(style.name.as_bytes());
    hasher.update(b"\0");
    hasher.update(style.prompt.as_bytes());
    hasher.update(b"\0");
    hasher.update(style.strength.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Params hash for original mirror copies.
pub fn hash_original_params() -> String {
    let digest = Sha256::digest(b"original\0");
    format!("{:x}", digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::test_helpers::style;

    // =========================================================================
    // SyncManifest basics
    // =========================================================================

    #[test]
    fn empty_manifest_has_no_entries() {
        let m = SyncManifest::empty();
        assert_eq!(m.version, MANIFEST_VERSION);
        assert!(m.is_empty());
    }

    #[test]
    fn is_current_requires_both_fields() {
        let mut m = SyncManifest::empty();
        m.record("anime/a.jpg".into(), "fp1".into(), "p1".into());

        assert!(m.is_current("anime/a.jpg", "fp1", "p1"));
        assert!(!m.is_current("anime/a.jpg", "fp2", "p1"));
        assert!(!m.is_current("anime/a.jpg", "fp1", "p2"));
        assert!(!m.is_current("sketch/a.jpg", "fp1", "p1"));
    }

    #[test]
    fn record_overwrites_and_remove_drops() {
        let mut m = SyncManifest::empty();
        m.record("a".into(), "old".into(), "p".into());
        m.record("a".into(), "new".into(), "p".into());
        assert_eq!(m.len(), 1);
        assert!(m.is_current("a", "new", "p"));

        m.remove("a");
        assert!(m.is_empty());
    }

    #[test]
    fn retain_filters_paths() {
        let mut m = SyncManifest::empty();
        m.record("anime/a.jpg".into(), "f".into(), "p".into());
        m.record("sketch/a.jpg".into(), "f".into(), "p".into());
        m.retain(|p| p.starts_with("anime/"));
        assert_eq!(m.entries.keys().collect::<Vec<_>>(), vec!["anime/a.jpg"]);
    }

    // =========================================================================
    // Load / save through storage
    // =========================================================================

    #[test]
    fn load_missing_is_empty() {
        let storage = MemoryStorage::new();
        assert!(SyncManifest::load(&storage).unwrap().is_empty());
    }

    #[test]
    fn save_then_load() {
        let storage = MemoryStorage::new();
        let mut m = SyncManifest::empty();
        m.record("anime/a.jpg".into(), "fp".into(), "ph".into());
        m.save(&storage).unwrap();

        assert!(storage.get(MANIFEST_PATH).is_some());
        assert_eq!(SyncManifest::load(&storage).unwrap(), m);
    }

    #[test]
    fn load_corrupt_is_empty() {
        let storage = MemoryStorage::new();
        storage.insert(MANIFEST_PATH, "{ not json");
        assert!(SyncManifest::load(&storage).unwrap().is_empty());
    }

    #[test]
    fn load_wrong_version_is_empty() {
        let storage = MemoryStorage::new();
        storage.insert(
            MANIFEST_PATH,
            r#"{"version": 999, "entries": {"a": {"source_fingerprint": "f", "params_hash": "p"}}}"#,
        );
        assert!(SyncManifest::load(&storage).unwrap().is_empty());
    }

    #[test]
    fn load_read_failure_is_error() {
        let storage = MemoryStorage::new();
        storage.insert(MANIFEST_PATH, "{}");
        storage.fail_on(MANIFEST_PATH);
        assert!(SyncManifest::load(&storage).is_err());
    }

    // =========================================================================
    // Params hashes
    // =========================================================================

    #[test]
    fn style_hash_is_deterministic() {
        assert_eq!(
            hash_style_params(&style("anime", "01")),
            hash_style_params(&style("anime", "01"))
        );
    }

    #[test]
    fn style_hash_tracks_prompt_and_strength() {
        let base = style("anime", "01");
        let mut prompt = base.clone();
        prompt.prompt = "something else".into();
        let mut strength = base.clone();
        strength.strength = 0.9;

        assert_ne!(hash_style_params(&base), hash_style_params(&prompt));
        assert_ne!(hash_style_params(&base), hash_style_params(&strength));
    }

    #[test]
    fn style_hash_ignores_index() {
        assert_eq!(
            hash_style_params(&style("anime", "01")),
            hash_style_params(&style("anime", "07"))
        );
    }

    #[test]
    fn original_hash_differs_from_any_style() {
        assert_ne!(hash_original_params(), hash_style_params(&style("original", "01")));
    }
}
