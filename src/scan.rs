//! Actual-state scanning.
//!
//! Lists the output root through the [`Storage`] port and sorts every entry
//! into one of three buckets, relative to the [`ExpectedSet`]:
//!
//! | Bucket | Condition |
//! |---|---|
//! | valid | expected, and the manifest says it was generated from the current source fingerprint and params |
//! | stale | expected, but the manifest disagrees or has no entry |
//! | orphan | not expected at all |
//!
//! Expected artifacts with no entry in the listing are **missing**.
//!
//! Orphan detection is an exact path match. Everything the output root holds
//! that is not an expected path is an orphan: outputs of deleted sources,
//! the whole folder of a removed or disabled style, stray temp files. The
//! only exemption is the sync manifest itself.
//!
//! A listing failure is returned as an error. Without a listing there is no
//! actual state to diff against, so the run cannot proceed.

use crate::expected::{ExpectedArtifact, ExpectedSet};
use crate::manifest::{MANIFEST_PATH, SyncManifest};
use crate::storage::{Storage, StorageEntry, StorageError};
use std::collections::HashSet;

/// Classified contents of the output root.
#[derive(Debug, Clone, Default)]
pub struct ActualState {
    /// Output paths of expected artifacts that are present and current.
    pub valid: Vec<String>,
    /// Output paths of expected artifacts that are present but outdated.
    pub stale: Vec<String>,
    /// Entries that no expected artifact accounts for.
    pub orphans: Vec<StorageEntry>,
    /// Output paths of expected artifacts that are absent.
    pub missing: Vec<String>,
}

/// Scan `output` against `expected`.
pub fn scan(
    output: &dyn Storage,
    expected: &ExpectedSet,
    manifest: &SyncManifest,
) -> Result<ActualState, StorageError> {
    let entries = output.list("")?;
    let mut state = ActualState::default();
    let mut present: HashSet<&str> = HashSet::new();

    for entry in &entries {
        if entry.path == MANIFEST_PATH {
            continue;
        }
        match expected.get(&entry.path) {
            Some(artifact) => {
                present.insert(artifact.output_path.as_str());
                if is_valid(artifact, manifest) {
                    state.valid.push(entry.path.clone());
                } else {
                    state.stale.push(entry.path.clone());
                }
            }
            None => state.orphans.push(entry.clone()),
        }
    }

    state.missing = expected
        .paths()
        .filter(|p| !present.contains(p))
        .map(str::to_string)
        .collect();

    Ok(state)
}

fn is_valid(artifact: &ExpectedArtifact, manifest: &SyncManifest) -> bool {
    manifest.is_current(
        &artifact.output_path,
        &artifact.source.fingerprint,
        &artifact.params_hash,
    )
}
