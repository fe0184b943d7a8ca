//! Output naming policy.
//!
//! Where an artifact lands is a pinned contract, not an implementation
//! detail: the scanner decides "expected or orphan" by exact path match, so
//! every run must derive the same path for the same (source, style) pair.
//!
//! ## Policies
//!
//! `style-folder` (default) gives every style its own folder:
//!
//! ```text
//! output/
//! ├── original/trip/a.jpg      # mirror of source trip/a.jpg
//! ├── anime/trip/a.jpg
//! └── sketch/trip/a.jpg
//! ```
//!
//! `index-suffix` keeps the source layout and appends the style index:
//!
//! ```text
//! output/
//! ├── original/trip/a.jpg
//! ├── trip/a_01.jpg            # style index 01
//! └── trip/a_02.jpg            # style index 02
//! ```
//!
//! ## Style Slugs
//!
//! A style's folder name is its name lower-cased with spaces turned into
//! underscores: `"Oil Painting"` → `oil_painting`. Slugs are restricted to
//! `[a-z0-9_-]` so they are safe on every backend.

use serde::{Deserialize, Serialize};

/// Folder holding the unmodified copy of every source image.
pub const ORIGINAL_DIR: &str = "original";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamingPolicy {
    #[default]
    StyleFolder,
    IndexSuffix,
}

/// Folder name for a style.
pub fn slugify(name: &str) -> String {
    name.trim().replace(' ', "_").to_lowercase()
}

/// Whether a slug is safe to use as a path segment.
pub fn is_safe_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('.')
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Output path of the mirror copy of `source_path`.
pub fn original_path(source_path: &str) -> String {
    format!("{}/{}", ORIGINAL_DIR, source_path)
}

/// Output path of the styled variant of `source_path`.
pub fn styled_path(policy: NamingPolicy, slug: &str, index: &str, source_path: &str) -> String {
    match policy {
        NamingPolicy::StyleFolder => format!("{}/{}", slug, source_path),
        NamingPolicy::IndexSuffix => {
            let (dir, file) = match source_path.rsplit_once('/') {
                Some((dir, file)) => (Some(dir), file),
                None => (None, source_path),
            };
            let renamed = match file.rsplit_once('.') {
                Some((stem, ext)) if !stem.is_empty() => format!("{}_{}.{}", stem, index, ext),
                _ => format!("{}_{}", file, index),
            };
            match dir {
                Some(dir) => format!("{}/{}", dir, renamed),
                None => renamed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_lowercases_and_replaces_spaces() {
        assert_eq!(slugify("Oil Painting"), "oil_painting");
        assert_eq!(slugify("  Anime "), "anime");
        assert_eq!(slugify("line-art"), "line-art");
    }

    #[test]
    fn safe_slugs() {
        assert!(is_safe_slug("anime"));
        assert!(is_safe_slug("oil_painting-2"));
        assert!(!is_safe_slug(""));
        assert!(!is_safe_slug(".hidden"));
        assert!(!is_safe_slug("a/b"));
        assert!(!is_safe_slug("caf\u{e9}"));
    }

    #[test]
    fn original_goes_to_mirror_folder() {
        assert_eq!(original_path("trip/a.jpg"), "original/trip/a.jpg");
    }

    #[test]
    fn style_folder_policy() {
        assert_eq!(
            styled_path(NamingPolicy::StyleFolder, "anime", "01", "a.jpg"),
            "anime/a.jpg"
        );
        assert_eq!(
            styled_path(NamingPolicy::StyleFolder, "anime", "01", "trip/a.jpg"),
            "anime/trip/a.jpg"
        );
    }

    #[test]
    fn index_suffix_policy() {
        assert_eq!(
            styled_path(NamingPolicy::IndexSuffix, "anime", "01", "a.jpg"),
            "a_01.jpg"
        );
        assert_eq!(
            styled_path(NamingPolicy::IndexSuffix, "anime", "02", "trip/a.b.png"),
            "trip/a.b_02.png"
        );
        assert_eq!(
            styled_path(NamingPolicy::IndexSuffix, "anime", "03", ".hidden"),
            ".hidden_03"
        );
    }

    #[test]
    fn policy_parses_from_kebab_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            naming: NamingPolicy,
        }
        let w: Wrapper = toml::from_str(r#"naming = "index-suffix""#).unwrap();
        assert_eq!(w.naming, NamingPolicy::IndexSuffix);
    }
}
