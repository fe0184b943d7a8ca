//! Shared test utilities for the stylesync test suite.
//!
//! Builders for styles, registries and seeded in-memory storage, plus lookup
//! helpers over run outcomes.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let source = seeded(&[("a.jpg", "A"), ("b.jpg", "B")]);
//! let reg = registry(&[("anime", "01"), ("sketch", "02")]);
//! // ... run a sync ...
//! let outcome = find_outcome(&result.outcomes, "anime/a.jpg");
//! assert_eq!(outcome.kind, OutcomeKind::Generated);
//! ```

use crate::expected::SourceImage;
use crate::naming;
use crate::report::{RunInfo, RunOutcome};
use crate::storage::MemoryStorage;
use crate::styles::{Style, StyleDefinition, StyleRegistry};

// =========================================================================
// Styles
// =========================================================================

/// A validated style with a predictable prompt and strength 0.5.
pub fn style(name: &str, index: &str) -> Style {
    Style {
        name: name.to_string(),
        slug: naming::slugify(name),
        index: index.to_string(),
        prompt: format!("{} prompt", name),
        strength: 0.5,
    }
}

/// Raw definition matching [`style`].
pub fn definition(name: &str, index: &str) -> StyleDefinition {
    StyleDefinition {
        name: name.to_string(),
        index: index.to_string(),
        prompt: format!("{} prompt", name),
        strength: 0.5,
        enabled: true,
    }
}

/// Registry of enabled styles, given as `(name, index)` pairs.
pub fn registry(styles: &[(&str, &str)]) -> StyleRegistry {
    let defs: Vec<StyleDefinition> = styles
        .iter()
        .map(|(name, index)| definition(name, index))
        .collect();
    StyleRegistry::from_definitions(&defs).unwrap()
}

// =========================================================================
// Sources and storage
// =========================================================================

pub fn source(path: &str, fingerprint: &str) -> SourceImage {
    SourceImage {
        path: path.to_string(),
        fingerprint: fingerprint.to_string(),
        size: 0,
    }
}

/// In-memory storage pre-filled with `(path, content)` pairs. Seeding does
/// not count towards [`MemoryStorage::writes`].
pub fn seeded(files: &[(&str, &str)]) -> MemoryStorage {
    let storage = MemoryStorage::new();
    for (path, content) in files {
        storage.insert(path, content.as_bytes());
    }
    storage
}

// =========================================================================
// Outcomes and summaries
// =========================================================================

/// Run metadata for summaries built outside a real run: one source, two
/// expected artifacts, started now.
pub fn run_info() -> RunInfo {
    RunInfo {
        source: "memory:source".to_string(),
        output: "memory:output".to_string(),
        started_at: chrono::Utc::now(),
        duration_ms: 0,
        sources_found: 1,
        expected: 2,
    }
}

// =========================================================================
// Outcome lookups
// =========================================================================

/// Find the outcome for an output path. Panics if absent.
pub fn find_outcome<'a>(outcomes: &'a [RunOutcome], path: &str) -> &'a RunOutcome {
    outcomes
        .iter()
        .find(|o| o.path == path)
        .unwrap_or_else(|| {
            let paths: Vec<&str> = outcomes.iter().map(|o| o.path.as_str()).collect();
            panic!("No outcome for '{}'. Available: {:?}", path, paths)
        })
}
