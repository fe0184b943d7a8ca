//! Style registry.
//!
//! Raw `[[styles]]` entries from the config file are [`StyleDefinition`]s:
//! loosely checked, straight from serde. [`StyleRegistry::from_definitions`]
//! runs the one validation pass that turns them into immutable [`Style`]
//! values. Nothing downstream ever sees an unvalidated style, so a bad entry
//! aborts the run before any storage or provider call.
//!
//! Rules enforced:
//! - at least one style is defined
//! - names are non-empty and unique; their slug is filesystem-safe and is not
//!   the reserved `original` folder
//! - indexes are one or more ASCII digits
//! - strength is a finite number in `0.0..=1.0`
//! - enabled styles have distinct slugs and distinct indexes

use crate::config::ConfigError;
use crate::naming::{self, NamingPolicy};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};

fn default_strength() -> f64 {
    0.5
}

fn default_enabled() -> bool {
    true
}

/// Accept `index = 1` as well as `index = "01"`; numbers are zero-padded to
/// two digits.
fn index_from_str_or_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u32),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => format!("{:02}", n),
    })
}

/// A style as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StyleDefinition {
    pub name: String,
    #[serde(deserialize_with = "index_from_str_or_int")]
    pub index: String,
    #[serde(alias = "prompt_text")]
    pub prompt: String,
    #[serde(default = "default_strength")]
    pub strength: f64,
    /// Disabled styles produce no artifacts; existing ones become orphans.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// A validated style.
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    pub name: String,
    /// Folder-safe form of the name, see [`naming::slugify`].
    pub slug: String,
    pub index: String,
    pub prompt: String,
    pub strength: f64,
}

#[derive(Debug, Clone)]
struct Entry {
    style: Style,
    enabled: bool,
}

/// Validated, ordered, read-only set of styles for one run.
///
/// Styles are ordered by numeric index, then by name.
#[derive(Debug, Clone)]
pub struct StyleRegistry {
    entries: Vec<Entry>,
}

impl StyleRegistry {
    /// Validate raw definitions into a registry.
    pub fn from_definitions(definitions: &[StyleDefinition]) -> Result<Self, ConfigError> {
        if definitions.is_empty() {
            return Err(ConfigError::Validation("no styles configured".into()));
        }

        let mut entries = Vec::with_capacity(definitions.len());
        let mut names: HashSet<&str> = HashSet::new();

        for def in definitions {
            let name = def.name.trim();
            if name.is_empty() {
                return Err(ConfigError::Validation("style name must not be empty".into()));
            }
            if !names.insert(name) {
                return Err(ConfigError::Validation(format!(
                    "style '{}' is defined more than once",
                    name
                )));
            }
            let slug = naming::slugify(name);
            if !naming::is_safe_slug(&slug) {
                return Err(ConfigError::Validation(format!(
                    "style name '{}' is not filesystem-safe (allowed: letters, digits, space, '_', '-')",
                    name
                )));
            }
            if slug == naming::ORIGINAL_DIR {
                return Err(ConfigError::Collision {
                    path: naming::ORIGINAL_DIR.to_string(),
                    first: "original mirror".into(),
                    second: format!("style '{}'", name),
                });
            }
            if def.index.is_empty() || !def.index.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::Validation(format!(
                    "style '{}': index '{}' must be digits only",
                    name, def.index
                )));
            }
            if !def.strength.is_finite() || !(0.0..=1.0).contains(&def.strength) {
                return Err(ConfigError::Validation(format!(
                    "style '{}': strength {} must be between 0.0 and 1.0",
                    name, def.strength
                )));
            }

            entries.push(Entry {
                style: Style {
                    name: name.to_string(),
                    slug,
                    index: def.index.clone(),
                    prompt: def.prompt.clone(),
                    strength: def.strength,
                },
                enabled: def.enabled,
            });
        }

        entries.sort_by(|a, b| {
            index_number(&a.style.index)
                .cmp(&index_number(&b.style.index))
                .then_with(|| a.style.name.cmp(&b.style.name))
        });

        let registry = Self { entries };
        registry.check_enabled_collisions()?;
        Ok(registry)
    }

    /// Two enabled styles must not share a folder or an index.
    fn check_enabled_collisions(&self) -> Result<(), ConfigError> {
        let mut slugs: HashMap<&str, &str> = HashMap::new();
        let mut indexes: HashMap<u64, &str> = HashMap::new();
        for style in self.enabled() {
            if let Some(first) = slugs.insert(&style.slug, &style.name) {
                return Err(ConfigError::Collision {
                    path: format!("{}/", style.slug),
                    first: format!("style '{}'", first),
                    second: format!("style '{}'", style.name),
                });
            }
            if let Some(first) = indexes.insert(index_number(&style.index), &style.name) {
                return Err(ConfigError::Collision {
                    path: format!("*_{}.*", style.index),
                    first: format!("style '{}'", first),
                    second: format!("style '{}'", style.name),
                });
            }
        }
        Ok(())
    }

    /// Check that styles map to distinct outputs under `policy`.
    ///
    /// Runs a sample path through [`naming::styled_path`] instead of trusting the
    /// slug and index checks done at construction.
    pub fn check_naming(&self, policy: NamingPolicy) -> Result<(), ConfigError> {
        let mut seen: HashMap<String, &str> = HashMap::new();
        for style in self.enabled() {
            let sample = naming::styled_path(policy, &style.slug, &style.index, "sample.img");
            if let Some(first) = seen.insert(sample.clone(), &style.name) {
                return Err(ConfigError::Collision {
                    path: sample,
                    first: format!("style '{}'", first),
                    second: format!("style '{}'", style.name),
                });
            }
        }
        Ok(())
    }

    /// Restrict the run to the named styles; all others count as disabled.
    ///
    /// This is the per-run style override. An unknown name is an error, so a
    /// typo cannot turn into "delete every other style's output".
    pub fn select(&self, names: &[String]) -> Result<Self, ConfigError> {
        for name in names {
            if !self.entries.iter().any(|e| e.style.name == *name) {
                return Err(ConfigError::UnknownStyle(name.clone()));
            }
        }
        let entries = self
            .entries
            .iter()
            .map(|e| Entry {
                style: e.style.clone(),
                enabled: e.enabled && names.contains(&e.style.name),
            })
            .collect();
        Ok(Self { entries })
    }

    /// Enabled styles, in registry order.
    pub fn enabled(&self) -> impl Iterator<Item = &Style> {
        self.entries.iter().filter(|e| e.enabled).map(|e| &e.style)
    }

    /// Every style, enabled or not, with its flag.
    pub fn all(&self) -> impl Iterator<Item = (&Style, bool)> {
        self.entries.iter().map(|e| (&e.style, e.enabled))
    }

    pub fn get(&self, name: &str) -> Option<&Style> {
        self.entries
            .iter()
            .find(|e| e.style.name == name)
            .map(|e| &e.style)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Numeric value of a validated index. Overlong indexes saturate.
fn index_number(index: &str) -> u64 {
    index.parse().unwrap_or(u64::MAX)
}
