//! # StyleSync
//!
//! Keeps a tree of AI-styled image variants in sync with a tree of source
//! images and a declarative list of styles. For every (source image, enabled
//! style) pair exactly one styled artifact exists in the output root: no
//! more, no fewer.
//!
//! # Architecture: Plan, Then Run
//!
//! ```text
//! 1. Expected   sources × styles  →  expected artifacts     (pure)
//! 2. Scan       output root       →  valid / stale / orphan (read-only)
//! 3. Plan       expected − actual →  generate / skip / delete
//! 4. Run        plan              →  outcomes → summary
//! ```
//!
//! Everything up to the plan is read-only, so `stylesync plan` shows exactly
//! what a sync would do. Running a plan is idempotent: a second sync with
//! unchanged inputs skips everything and writes nothing.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`storage`] | `Storage` trait and the local, in-memory, drive and blob adapters |
//! | [`styles`] | Validated, ordered style registry built from config entries |
//! | [`provider`] | `StyleProvider` trait and the external-command adapter |
//! | [`naming`] | Pinned output path policy (`style-folder`, `index-suffix`) |
//! | [`expected`] | Source discovery and expected-artifact computation |
//! | [`manifest`] | Persisted provenance record used for staleness checks |
//! | [`scan`] | Classifies the output root against the expected set |
//! | [`reconcile`] | Builds the plan and executes it on a bounded worker pool |
//! | [`report`] | Run outcomes and the aggregated summary |
//! | [`config`] | `stylesync.toml` loading, layering over defaults, validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Storage and Provider as Traits
//!
//! The engine only talks to [`storage::Storage`] and
//! [`provider::StyleProvider`]. Backends are chosen once at startup and
//! passed in by reference; the reconciler never inspects which one it got.
//! Tests run the full engine against [`storage::MemoryStorage`] and a
//! recording mock provider.
//!
//! ## Manifest-Based Staleness
//!
//! An existing artifact is only trusted if the manifest records that it was
//! built from the current source fingerprint with the current style
//! parameters. Anything else, including "no record at all", is stale and gets
//! regenerated. Regenerating too much costs provider calls; keeping a wrong
//! artifact silently breaks the sync guarantee.
//!
//! ## Fail Fast on Configuration
//!
//! Style validation and output-path collision checks run before any storage
//! write or provider call. A bad config never produces a half-synced tree.

pub mod config;
pub mod expected;
pub mod manifest;
pub mod naming;
pub mod output;
pub mod provider;
pub mod reconcile;
pub mod report;
pub mod scan;
pub mod storage;
pub mod styles;

#[cfg(test)]
pub(crate) mod test_helpers;
