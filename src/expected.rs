//! Expected-state computation.
//!
//! Turns the source listing and the style registry into the complete set of
//! artifacts that should exist in the output root. [`compute`] is pure: the
//! same sources and registry always yield the same [`ExpectedSet`], and it
//! touches no storage.
//!
//! Every source gets one [`ArtifactKind::Styled`] artifact per enabled style
//! and, when mirroring is on, one [`ArtifactKind::Original`] copy. Paths come
//! from [`crate::naming`]; two artifacts landing on the same path is a
//! [`ConfigError::Collision`], caught here before any work starts.

use crate::config::ConfigError;
use crate::manifest::{self, MANIFEST_PATH};
use crate::naming::{self, NamingPolicy};
use crate::storage::{Storage, StorageError};
use crate::styles::{Style, StyleRegistry};
use serde::Serialize;
use std::collections::BTreeMap;

/// A source image found in the source root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceImage {
    /// Relative to the source root, `/`-separated.
    pub path: String,
    pub fingerprint: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Unmodified mirror copy of the source.
    Original,
    /// Output of the named style.
    Styled { name: String },
}

impl ArtifactKind {
    /// Short label for logs and CLI output.
    pub fn label(&self) -> &str {
        match self {
            ArtifactKind::Original => naming::ORIGINAL_DIR,
            ArtifactKind::Styled { name } => name,
        }
    }
}

/// One artifact that should exist after a successful sync.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedArtifact {
    pub source: SourceImage,
    pub kind: ArtifactKind,
    /// Set for [`ArtifactKind::Styled`], `None` for originals.
    pub style: Option<Style>,
    pub output_path: String,
    pub params_hash: String,
}

/// Expected artifacts keyed by output path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpectedSet {
    artifacts: BTreeMap<String, ExpectedArtifact>,
}

impl ExpectedSet {
    pub fn get(&self, output_path: &str) -> Option<&ExpectedArtifact> {
        self.artifacts.get(output_path)
    }

    pub fn contains(&self, output_path: &str) -> bool {
        self.artifacts.contains_key(output_path)
    }

    /// Artifacts in output path order.
    pub fn iter(&self) -> impl Iterator<Item = &ExpectedArtifact> {
        self.artifacts.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    fn insert(&mut self, artifact: ExpectedArtifact) -> Result<(), ConfigError> {
        if artifact.output_path == MANIFEST_PATH {
            return Err(ConfigError::ReservedPath(artifact.output_path));
        }
        if let Some(existing) = self.artifacts.get(&artifact.output_path) {
            return Err(ConfigError::Collision {
                path: artifact.output_path.clone(),
                first: describe(existing),
                second: describe(&artifact),
            });
        }
        self.artifacts.insert(artifact.output_path.clone(), artifact);
        Ok(())
    }
}

fn describe(artifact: &ExpectedArtifact) -> String {
    match &artifact.kind {
        ArtifactKind::Original => format!("original of {}", artifact.source.path),
        ArtifactKind::Styled { name } => format!("style '{}' of {}", name, artifact.source.path),
    }
}

/// List the source root and keep files with a supported extension.
///
/// A missing source root is an error rather than an empty listing, so a
/// mistyped path cannot make every artifact look orphaned.
pub fn discover_sources(
    source: &dyn Storage,
    extensions: &[String],
) -> Result<Vec<SourceImage>, StorageError> {
    if !source.exists("")? {
        return Err(StorageError::NotFound(source.describe()));
    }
    let mut sources: Vec<SourceImage> = source
        .list("")?
        .into_iter()
        .filter(|entry| has_extension(&entry.path, extensions))
        .map(|entry| SourceImage {
            path: entry.path,
            fingerprint: entry.fingerprint,
            size: entry.size,
        })
        .collect();
    sources.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(sources)
}

fn has_extension(path: &str, extensions: &[String]) -> bool {
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
        }
        _ => false,
    }
}

/// Compute the expected artifacts for `sources` under `registry`.
pub fn compute(
    sources: &[SourceImage],
    registry: &StyleRegistry,
    policy: NamingPolicy,
    mirror_originals: bool,
) -> Result<ExpectedSet, ConfigError> {
    registry.check_naming(policy)?;

    let original_hash = manifest::hash_original_params();
    let style_hashes: Vec<(&Style, String)> = registry
        .enabled()
        .map(|s| (s, manifest::hash_style_params(s)))
        .collect();

    let mut set = ExpectedSet::default();
    for source in sources {
        if mirror_originals {
            set.insert(ExpectedArtifact {
                source: source.clone(),
                kind: ArtifactKind::Original,
                style: None,
                output_path: naming::original_path(&source.path),
                params_hash: original_hash.clone(),
            })?;
        }
        for (style, params_hash) in &style_hashes {
            set.insert(ExpectedArtifact {
                source: source.clone(),
                kind: ArtifactKind::Styled {
                    name: style.name.clone(),
                },
                style: Some((*style).clone()),
                output_path: naming::styled_path(policy, &style.slug, &style.index, &source.path),
                params_hash: params_hash.clone(),
            })?;
        }
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::test_helpers::{registry, source};

    fn exts() -> Vec<String> {
        ["jpg", "jpeg", "png", "webp"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    // =========================================================================
    // discover_sources
    // =========================================================================

    #[test]
    fn discovers_images_only_sorted() {
        let storage = MemoryStorage::new();
        storage.insert("b.JPG", "b");
        storage.insert("trip/a.png", "a");
        storage.insert("notes.txt", "n");
        storage.insert("trip/.jpg", "hidden");
        storage.insert("a.webp", "w");

        let paths: Vec<String> = discover_sources(&storage, &exts())
            .unwrap()
            .into_iter()
            .map(|s| s.path)
            .collect();
        assert_eq!(paths, vec!["a.webp", "b.JPG", "trip/a.png"]);
    }

    #[test]
    fn discover_listing_failure_is_error() {
        let storage = MemoryStorage::new();
        storage.fail_listing();
        assert!(discover_sources(&storage, &exts()).is_err());
    }

    #[test]
    fn discover_missing_local_root_is_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let storage = crate::storage::LocalStorage::new(tmp.path().join("nope"));
        assert!(matches!(
            discover_sources(&storage, &exts()),
            Err(StorageError::NotFound(_))
        ));
    }

    // =========================================================================
    // compute
    // =========================================================================

    #[test]
    fn one_artifact_per_source_and_style_plus_originals() {
        let reg = registry(&[("anime", "01"), ("sketch", "02")]);
        let sources = vec![source("a.jpg", "fa"), source("b.jpg", "fb")];

        let set = compute(&sources, &reg, NamingPolicy::StyleFolder, true).unwrap();
        let paths: Vec<&str> = set.paths().collect();
        assert_eq!(
            paths,
            vec![
                "anime/a.jpg",
                "anime/b.jpg",
                "original/a.jpg",
                "original/b.jpg",
                "sketch/a.jpg",
                "sketch/b.jpg",
            ]
        );
        let a_anime = set.get("anime/a.jpg").unwrap();
        assert_eq!(a_anime.kind, ArtifactKind::Styled { name: "anime".into() });
        assert_eq!(a_anime.source.fingerprint, "fa");
        assert!(a_anime.style.is_some());
        assert!(set.get("original/a.jpg").unwrap().style.is_none());
    }

    #[test]
    fn no_mirror_skips_originals() {
        let reg = registry(&[("anime", "01")]);
        let set = compute(&[source("a.jpg", "f")], &reg, NamingPolicy::StyleFolder, false).unwrap();
        assert_eq!(set.paths().collect::<Vec<_>>(), vec!["anime/a.jpg"]);
    }

    #[test]
    fn compute_is_deterministic() {
        let reg = registry(&[("anime", "01"), ("sketch", "02")]);
        let sources = vec![source("x/a.jpg", "1"), source("b.png", "2")];
        let first = compute(&sources, &reg, NamingPolicy::IndexSuffix, true).unwrap();
        let second = compute(&sources, &reg, NamingPolicy::IndexSuffix, true).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn disabled_styles_produce_nothing() {
        let reg = registry(&[("anime", "01"), ("sketch", "02")])
            .select(&["anime".to_string()])
            .unwrap();
        let set = compute(&[source("a.jpg", "f")], &reg, NamingPolicy::StyleFolder, false).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains("anime/a.jpg"));
    }

    #[test]
    fn distinct_sources_never_share_index_suffix_outputs() {
        let reg = registry(&[("anime", "01")]);
        let sources = vec![source("a.jpg", "1"), source("a_01.jpg", "2"), source("a.JPG", "3")];
        let set = compute(&sources, &reg, NamingPolicy::IndexSuffix, false).unwrap();
        assert_eq!(
            set.paths().collect::<Vec<_>>(),
            vec!["a_01.JPG", "a_01.jpg", "a_01_01.jpg"]
        );
    }

    #[test]
    fn styled_path_landing_on_original_mirror_collides() {
        // original/x.jpg styled under index-suffix is original/x_01.jpg,
        // which is also the mirror of x_01.jpg.
        let reg = registry(&[("anime", "01")]);
        let sources = vec![source("original/x.jpg", "1"), source("x_01.jpg", "2")];
        let result = compute(&sources, &reg, NamingPolicy::IndexSuffix, true);
        assert!(matches!(
            result,
            Err(ConfigError::Collision { ref path, .. }) if path == "original/x_01.jpg"
        ));
    }

    #[test]
    fn manifest_path_is_reserved() {
        let reg = registry(&[("anime", "01")]);
        let sources = vec![source(".stylesync-manifest.json", "1")];
        let mut set = ExpectedSet::default();
        let err = set
            .insert(ExpectedArtifact {
                source: sources[0].clone(),
                kind: ArtifactKind::Original,
                style: None,
                output_path: MANIFEST_PATH.to_string(),
                params_hash: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::ReservedPath(_)));
        assert!(compute(&sources, &reg, NamingPolicy::StyleFolder, true).is_ok());
    }

    #[test]
    fn label_names_style_or_original() {
        assert_eq!(ArtifactKind::Original.label(), "original");
        assert_eq!(ArtifactKind::Styled { name: "anime".into() }.label(), "anime");
    }
}
